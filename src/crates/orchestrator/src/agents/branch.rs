//! Branch analysis agent

use crate::agents::capabilities::{DataRepository, DATA_REPOSITORY};
use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;

/// Per-branch performance breakdown
pub struct BranchAgent;

impl BranchAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BranchAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for BranchAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let repository: Arc<dyn DataRepository> = capabilities
            .get(DATA_REPOSITORY)
            .ok_or_else(|| NodeError::transient("data_repository capability missing"))?;

        ctx.emit_progress("breaking down branch performance", None);
        let branches = repository
            .branch_breakdown()
            .await
            .map_err(|e| NodeError::transient(e.to_string()))?;

        let top = branches
            .iter()
            .max_by(|a, b| a.total.total_cmp(&b.total))
            .map(|b| b.branch.clone())
            .unwrap_or_default();

        let mut results = Map::new();
        results.insert(
            "branch".to_string(),
            json!({
                "message": format!(
                    "Analyzed {} branches; '{}' leads the period.",
                    branches.len(),
                    top
                ),
                "metrics": {
                    "branches": branches.len(),
                    "top_branch_total": branches
                        .iter()
                        .map(|b| b.total)
                        .fold(f64::MIN, f64::max),
                },
                "breakdown": branches,
            }),
        );

        let mutator = StateMutator::new();
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "branch")?;
        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::capabilities::InMemoryDataRepository;
    use agentgraph_core::Action;

    #[tokio::test]
    async fn test_branch_breakdown() {
        let agent = BranchAgent::new();
        let ctx = NodeContext::detached("branch", Action::BranchAnalysis);
        let mut caps = CapabilityMap::new();
        caps.insert(
            DATA_REPOSITORY,
            Arc::new(InMemoryDataRepository::new()) as Arc<dyn DataRepository>,
        );

        let state = GraphState::new("s1", "t1", "branch performance");
        let output = agent.invoke(&state, &caps, &ctx).await.unwrap();

        let result = &output.state.agent_results["branch"];
        assert_eq!(result["metrics"]["branches"], json!(3));
        assert!(result["message"].as_str().unwrap().contains("north"));
    }
}
