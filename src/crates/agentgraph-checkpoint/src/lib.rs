//! # agentgraph-checkpoint - Session persistence for the graph runtime
//!
//! **Trait-based session store abstractions and backends** for persisting and
//! restoring per-session execution state. Checkpoints are what make a
//! conversation resumable: every state transition the runtime acknowledges is
//! captured as a [`StateSnapshot`] inside a bounded per-session ring, so a
//! turn can be replayed deterministically, a paused human-gate turn can be
//! resumed after a restart, and idle sessions age out on a TTL.
//!
//! ## Core concepts
//!
//! - **[`SessionStore`]** - the backend contract: `put`, `get_latest`,
//!   `get_at`, `close`, `sweep`, with per-session write serialization and
//!   cross-session independence.
//! - **[`SessionRecord`]** - one session's durable unit: snapshot ring,
//!   TTL bookkeeping, per-turn graph version pins, forward-compatible
//!   unknown-field preservation.
//! - **[`StateSnapshot`]** - a serialized state at a given step.
//! - **Backends** - [`InMemorySessionStore`] (tests, development) and
//!   [`FileSessionStore`] (single-host durability). Database or object-store
//!   backends implement [`SessionStore`] downstream.
//! - **[`SerializerProtocol`]** - pluggable encoding strategy (JSON,
//!   bincode).
//!
//! ## Quick start
//!
//! ```rust
//! use agentgraph_checkpoint::{InMemorySessionStore, SessionStore, StateSnapshot};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemorySessionStore::new(32, chrono::Duration::minutes(30));
//!
//!     store.put("session-1", StateSnapshot::new(0, "processing", json!({"step": 0}))).await?;
//!     store.put("session-1", StateSnapshot::new(1, "completed", json!({"step": 1}))).await?;
//!
//!     let latest = store.get_latest("session-1").await?;
//!     assert_eq!(latest.step, 1);
//!
//!     // Deterministic resume from an earlier step
//!     let earlier = store.get_at("session-1", 0).await?;
//!     assert_eq!(earlier.status, "processing");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod serializer;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
pub use record::{SessionRecord, StateSnapshot, DEFAULT_HISTORY_DEPTH, SCHEMA_VERSION};
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::{SessionStore, SessionStream};
