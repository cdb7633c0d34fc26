//! Assemble node - folds agent results into the structured response
//!
//! Pure: reads `agent_results`, writes `response_metadata.result` with a
//! `message` (human-readable, newline-joined agent messages) and a `metrics`
//! object merged from every agent's `metrics`. Never touches I/O; downstream
//! consumers read numbers from `metrics`, never from prose.

use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Pure result folder
pub struct AssembleNode;

impl AssembleNode {
    pub fn new() -> Self {
        Self
    }

    /// Fold `agent_results` into `{message, metrics}`
    pub fn assemble(&self, state: &GraphState) -> Value {
        let mut messages: Vec<String> = Vec::new();
        let mut metrics = Map::new();

        for (agent, result) in &state.agent_results {
            if let Some(message) = result.get("message").and_then(Value::as_str) {
                if !message.is_empty() {
                    messages.push(message.to_string());
                }
            }
            if let Some(agent_metrics) = result.get("metrics").and_then(Value::as_object) {
                for (key, value) in agent_metrics {
                    metrics.insert(key.clone(), value.clone());
                }
            }
            tracing::trace!(agent = %agent, "assembled agent result");
        }

        let message = if messages.is_empty() {
            "I could not produce a result for that request.".to_string()
        } else {
            messages.join("\n")
        };

        json!({
            "message": message,
            "metrics": metrics,
        })
    }
}

impl Default for AssembleNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for AssembleNode {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let result = self.assemble(state);
        ctx.emit_progress("assembling response", None);

        let mut meta = Map::new();
        meta.insert("result".to_string(), result);
        let next = StateMutator::new().merge_mapping(state, StateField::ResponseMetadata, meta)?;
        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_merges_metrics_and_messages() {
        let node = AssembleNode::new();
        let mut state = GraphState::new("s1", "t1", "everything please");
        state.agent_results.insert(
            "summary".to_string(),
            json!({"message": "Total is 12500", "metrics": {"total": 12500.0}}),
        );
        state.agent_results.insert(
            "anomaly".to_string(),
            json!({"message": "2 anomalies found", "metrics": {"anomalies": 2}}),
        );

        let result = node.assemble(&state);
        assert_eq!(result["message"], json!("Total is 12500\n2 anomalies found"));
        assert_eq!(result["metrics"]["total"], json!(12500.0));
        assert_eq!(result["metrics"]["anomalies"], json!(2));
    }

    #[test]
    fn test_empty_results_yield_fallback_message() {
        let node = AssembleNode::new();
        let state = GraphState::new("s1", "t1", "hm");
        let result = node.assemble(&state);
        assert!(!result["message"].as_str().unwrap().is_empty());
        assert!(result["metrics"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_assemble_is_pure() {
        let node = AssembleNode::new();
        let mut state = GraphState::new("s1", "t1", "x");
        state
            .agent_results
            .insert("summary".to_string(), json!({"message": "m"}));
        assert_eq!(node.assemble(&state), node.assemble(&state));
    }
}
