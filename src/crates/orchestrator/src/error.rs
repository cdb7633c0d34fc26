//! Error types for the orchestrator facade

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the orchestrator facade
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Runtime, registry, or graph failure from the core engine
    #[error(transparent)]
    Runtime(#[from] agentgraph_core::RuntimeError),

    /// Graph compilation or swap failure
    #[error(transparent)]
    GraphManager(#[from] agentgraph_core::GraphManagerError),

    /// Registry operation failure
    #[error(transparent)]
    Registry(#[from] agentgraph_core::RegistryError),

    /// Session store failure
    #[error(transparent)]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No subscriber registered under this id
    #[error("Unknown subscriber: {0}")]
    UnknownSubscriber(String),
}
