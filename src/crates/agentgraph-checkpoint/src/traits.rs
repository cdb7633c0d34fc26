//! Extensible session store trait for checkpoint backends
//!
//! This module defines **[`SessionStore`]** - the abstraction the graph
//! runtime persists through. Implementations map `session_id` to a
//! [`SessionRecord`] and must honor three guarantees regardless of backend:
//!
//! - **Per-session write serialization** - concurrent `put`s to one session
//!   observe a total order equal to the order acknowledged to callers.
//! - **Cross-session independence** - sessions never contend on each other's
//!   ordering.
//! - **Durability before return** - a `put` that returns `Ok` is at least
//!   once durable for the backend's durability class (memory, file, ...).
//!
//! Two backends ship in this crate: [`InMemorySessionStore`] for tests and
//! single-process development, and [`FileSessionStore`] for single-host
//! deployments that must survive a restart. Object-store or database
//! backends implement the same trait downstream.
//!
//! [`InMemorySessionStore`]: crate::memory::InMemorySessionStore
//! [`FileSessionStore`]: crate::file::FileSessionStore

use crate::error::Result;
use crate::record::{SessionRecord, StateSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Async stream of session records, used by [`SessionStore::list`]
pub type SessionStream = BoxStream<'static, Result<SessionRecord>>;

/// Storage backend contract for session checkpoints
///
/// All methods take `&self`; implementations are expected to be cheaply
/// cloneable handles over shared interior state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a snapshot to a session, creating the record on first write.
    ///
    /// Refreshes the record's TTL deadline. Returns the step of the stored
    /// snapshot once it is durable.
    async fn put(&self, session_id: &str, snapshot: StateSnapshot) -> Result<u64>;

    /// Latest snapshot for a session, or `SessionNotFound`.
    async fn get_latest(&self, session_id: &str) -> Result<StateSnapshot>;

    /// Snapshot taken at a specific step, for deterministic resume.
    ///
    /// Returns `SnapshotNotFound` when the step has been evicted from the
    /// ring or never existed.
    async fn get_at(&self, session_id: &str, step: u64) -> Result<StateSnapshot>;

    /// Full record for a session (metadata included), or `SessionNotFound`.
    async fn get_record(&self, session_id: &str) -> Result<SessionRecord>;

    /// Pin the graph version used by a turn into the session record.
    async fn pin_graph_version(&self, session_id: &str, trace_id: &str, version: u64)
        -> Result<()>;

    /// Remove a session. Idempotent: closing an unknown session is `Ok`.
    async fn close(&self, session_id: &str) -> Result<()>;

    /// Remove every session whose TTL deadline precedes `now`.
    ///
    /// Safe to run concurrently with live sessions; a session written after
    /// the sweep observed it is never removed. Returns the ids swept.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Stream all live records (diagnostics and tests).
    async fn list(&self) -> Result<SessionStream>;

    /// Number of live sessions.
    async fn session_count(&self) -> usize;
}
