//! Error types for graph runtime operations
//!
//! The taxonomy separates three audiences:
//!
//! - **Caller errors** surface through [`RuntimeError`] from the facade
//!   (`SessionNotFound`, `ResumeTokenInvalid`, registry and build failures).
//! - **Turn-aborting conditions** (`RoutingAmbiguity`, `RoutingDeadEnd`,
//!   state contract violations, fatal node errors) are caught inside the
//!   loop, converted to a failed envelope with `meta.error` populated, and
//!   do not escape as `Err` - a failed turn is still a structured response.
//! - **Infrastructure failures** (checkpoint store, serialization) propagate
//!   as `Err` because no trustworthy envelope can be built without them.

use crate::manager::GraphManagerError;
use crate::node::NodeError;
use crate::registry::RegistryError;
use crate::state::StateError;
use thiserror::Error;

/// Convenience result type using [`RuntimeError`]
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the graph runtime and facade
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No session exists under this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Resume called with a token that does not match the paused turn
    #[error("Invalid resume token for session {0}")]
    ResumeTokenInvalid(String),

    /// Resume called on a session that is not awaiting a human decision
    #[error("Session {0} is not awaiting a human decision")]
    NotAwaitingHuman(String),

    /// A router produced more than one viable target
    #[error("Routing ambiguity after node '{node}': {targets:?}")]
    RoutingAmbiguity { node: String, targets: Vec<String> },

    /// A non-terminal node has nowhere to route
    #[error("Routing dead end after node '{0}'")]
    RoutingDeadEnd(String),

    /// Node invocation failure that escaped classification
    #[error("Node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: NodeError,
    },

    /// State contract violation (internal bug)
    #[error(transparent)]
    State(#[from] StateError),

    /// Registry operation failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Graph compilation or swap failure
    #[error(transparent)]
    GraphManager(#[from] GraphManagerError),

    /// Checkpoint store failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Create a node failure with context
    pub fn node(node: impl Into<String>, source: NodeError) -> Self {
        Self::Node {
            node: node.into(),
            source,
        }
    }
}
