//! Standalone human gate node
//!
//! Pauses the turn until an external decision arrives. An upstream agent
//! requests the gate by writing `response_metadata.human_gate_request`
//! (a reason string); the gate raises `awaiting_human` with that reason. On
//! resume the runtime re-invokes the gate with
//! `response_metadata.human_decision` present, and the gate simply records
//! the resolution and lets routing continue - it performs no side effects of
//! its own.

use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const DEFAULT_REASON: &str = "human confirmation required";

/// Pause-and-resume gate
pub struct HumanGateNode;

impl HumanGateNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HumanGateNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for HumanGateNode {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mutator = StateMutator::new();

        if let Some(decision) = state.response_metadata.get("human_decision") {
            let approved = decision
                .get("approve")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            ctx.emit_progress(
                if approved { "decision: approved" } else { "decision: rejected" },
                None,
            );
            let mut meta = Map::new();
            meta.insert("human_gate_resolved".to_string(), json!({"approved": approved}));
            let next = mutator.merge_mapping(state, StateField::ResponseMetadata, meta)?;
            return Ok(NodeOutput::new(next));
        }

        let reason = state
            .response_metadata
            .get("human_gate_request")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REASON)
            .to_string();
        ctx.emit_progress(format!("waiting for human: {reason}"), None);

        let mut next = mutator.set(state, StateField::Status, json!("awaiting_human"))?;
        next = mutator.set(&next, StateField::HumanGateReason, json!(reason))?;
        Ok(NodeOutput::new(next))
    }
}
