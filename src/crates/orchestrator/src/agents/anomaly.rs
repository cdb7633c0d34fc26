//! Anomaly detection agent

use crate::agents::capabilities::{DataRepository, DATA_REPOSITORY};
use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;

/// Surfaces flagged records from the data repository
pub struct AnomalyAgent;

impl AnomalyAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnomalyAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for AnomalyAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let repository: Arc<dyn DataRepository> = capabilities
            .get(DATA_REPOSITORY)
            .ok_or_else(|| NodeError::transient("data_repository capability missing"))?;

        ctx.emit_progress("scanning for anomalies", None);
        let anomalies = repository
            .anomalies()
            .await
            .map_err(|e| NodeError::transient(e.to_string()))?;

        let mut results = Map::new();
        results.insert(
            "anomaly".to_string(),
            json!({
                "message": format!("Found {} anomalous record(s).", anomalies.len()),
                "metrics": {"anomalies": anomalies.len()},
                "records": anomalies,
            }),
        );

        let mutator = StateMutator::new();
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "anomaly")?;
        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::capabilities::InMemoryDataRepository;
    use agentgraph_core::Action;

    #[tokio::test]
    async fn test_anomalies_reported() {
        let agent = AnomalyAgent::new();
        let ctx = NodeContext::detached("anomaly", Action::AnomalyDetection);
        let mut caps = CapabilityMap::new();
        caps.insert(
            DATA_REPOSITORY,
            Arc::new(InMemoryDataRepository::new()) as Arc<dyn DataRepository>,
        );

        let state = GraphState::new("s1", "t1", "anything suspicious?");
        let output = agent.invoke(&state, &caps, &ctx).await.unwrap();

        let result = &output.state.agent_results["anomaly"];
        assert_eq!(result["metrics"]["anomalies"], json!(2));
        assert_eq!(result["records"].as_array().unwrap().len(), 2);
    }
}
