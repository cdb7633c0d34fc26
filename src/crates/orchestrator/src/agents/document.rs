//! Document writing agent - gate-guarded and side-effecting
//!
//! Writing over a document is the canonical irreversible action in this
//! system, so the agent acts as its own gate: on first invocation it raises
//! `awaiting_human` with reason "confirm overwrite"; the runtime re-invokes
//! it on resume with `response_metadata.human_decision` present. Only an
//! approval performs the write.

use crate::agents::capabilities::{DocumentStore, DOCUMENT_STORE};
use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const GATE_REASON: &str = "confirm overwrite";
const DOCUMENT_NAME: &str = "assistant-report.md";

/// Gate-guarded document writer
pub struct DocumentAgent;

impl DocumentAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocumentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for DocumentAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mutator = StateMutator::new();

        let Some(decision) = state.response_metadata.get("human_decision") else {
            ctx.emit_progress("requesting confirmation before writing", None);
            let mut next = mutator.set(state, StateField::Status, json!("awaiting_human"))?;
            next = mutator.set(&next, StateField::HumanGateReason, json!(GATE_REASON))?;
            return Ok(NodeOutput::new(next));
        };

        let approved = decision
            .get("approve")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let result = if approved {
            let store: Arc<dyn DocumentStore> = capabilities
                .get(DOCUMENT_STORE)
                .ok_or_else(|| NodeError::transient("document_store capability missing"))?;
            ctx.emit_progress(format!("writing {DOCUMENT_NAME}"), None);
            store
                .write(DOCUMENT_NAME, &state.user_message)
                .await
                .map_err(|e| NodeError::transient(e.to_string()))?;
            json!({
                "message": format!("Wrote {DOCUMENT_NAME}."),
                "metrics": {"documents_written": 1},
                "written": true,
                "document": DOCUMENT_NAME,
            })
        } else {
            ctx.emit_progress("write rejected by reviewer", None);
            json!({
                "message": "Document write cancelled on review.",
                "metrics": {"documents_written": 0},
                "written": false,
            })
        };

        let mut results = Map::new();
        results.insert("document_write".to_string(), result);
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "document_write")?;
        Ok(NodeOutput::new(next))
    }
}
