//! Capability-bearing agent nodes for the default graph
//!
//! Each agent consumes only the capability handles its descriptor declares,
//! writes its structured result into `agent_results` under its own name,
//! and marks its pending task done. Business logic is intentionally thin -
//! these exist to exercise the node contract end to end; production agents
//! replace them behind the same descriptors.

pub mod anomaly;
pub mod branch;
pub mod capabilities;
pub mod database;
pub mod document;
pub mod smalltalk;
pub mod summary;

pub use anomaly::AnomalyAgent;
pub use branch::BranchAgent;
pub use capabilities::{
    AnomalyRecord, BranchMetrics, CapabilityError, DataRepository, DocumentStore,
    FinancialSummary, InMemoryDataRepository, InMemoryDocumentStore, InMemoryQueryExecutor,
    QueryExecutor, DATABASE, DATA_REPOSITORY, DOCUMENT_STORE,
};
pub use database::DatabaseAgent;
pub use document::DocumentAgent;
pub use smalltalk::SmalltalkAgent;
pub use summary::SummaryAgent;

use agentgraph_core::{GraphState, NodeError, StateField, StateMutator, TaskStatus};
use serde_json::json;

/// Mark this agent's pending task done (no-op when no task targets it)
pub(crate) fn complete_task(
    mutator: &StateMutator,
    state: &GraphState,
    agent: &str,
) -> Result<GraphState, NodeError> {
    if !state.pending_tasks.iter().any(|t| t.agent == agent) {
        return Ok(state.clone());
    }
    let tasks: Vec<_> = state
        .pending_tasks
        .iter()
        .cloned()
        .map(|mut task| {
            if task.agent == agent {
                task.status = TaskStatus::Done;
            }
            task
        })
        .collect();
    Ok(mutator.set(state, StateField::PendingTasks, json!(tasks))?)
}
