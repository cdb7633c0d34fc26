//! # orchestrator - facade, event fan-out, and scaffold nodes
//!
//! The deployment-facing crate of the agentgraph workspace. It owns:
//!
//! - **[`Orchestrator`]** - the process-scoped facade: `start_turn`,
//!   `resume`, `cancel`, dynamic node registration, graph rebuilds, event
//!   subscriptions, and the session TTL sweeper.
//! - **[`broadcast`]** - the event broadcaster: bounded per-subscriber
//!   queues with drop-oldest and gap markers, per-session sequence
//!   assignment, history replay for late subscribers.
//! - **[`nodes`]** - the scaffold nodes the runtime contract depends on
//!   (intent, reasoning, supervisor, router, assemble, human gate).
//! - **[`agents`]** - built-in capability-bearing agents (summary, branch,
//!   anomaly, database, document writer, smalltalk) plus the capability
//!   interfaces real backends implement.
//! - **[`config`]** - every recognized option with its default, TOML
//!   loading, and `AGENTGRAPH_*` environment overrides.
//!
//! Transports (HTTP, WebSocket) sit on top of this crate: they call
//! [`Orchestrator::start_turn`] and forward
//! [`broadcast::SubscriptionHandle::recv`] frames to their clients.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use orchestrator::{Orchestrator, OrchestratorConfig};
//! use orchestrator::broadcast::EventFilter;
//! use agentgraph_core::TurnOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default())?;
//! let events = orchestrator.subscribe_events(EventFilter::all());
//!
//! let handle = orchestrator
//!     .start_turn(None, "Give me a full financial summary", TurnOptions::default())
//!     .await?;
//! println!("{}", handle.envelope.data.message);
//!
//! while let Some(event) = events.try_recv() {
//!     println!("{:?} seq={}", event.kind, event.sequence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod nodes;
#[allow(clippy::module_inception)]
mod orchestrator;

pub use broadcast::{EventBroadcaster, EventFilter, SubscriptionHandle};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use orchestrator::{default_graph_spec, init_tracing, Orchestrator};
