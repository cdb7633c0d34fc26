//! Financial summary agent

use crate::agents::capabilities::{DataRepository, DATA_REPOSITORY};
use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;

/// Produces the aggregate financial picture via the data repository
pub struct SummaryAgent;

impl SummaryAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SummaryAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for SummaryAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let repository: Arc<dyn DataRepository> = capabilities
            .get(DATA_REPOSITORY)
            .ok_or_else(|| NodeError::transient("data_repository capability missing"))?;

        ctx.emit_progress("aggregating financial data", None);
        let summary = repository
            .financial_summary()
            .await
            .map_err(|e| NodeError::transient(e.to_string()))?;

        let mut results = Map::new();
        results.insert(
            "summary".to_string(),
            json!({
                "message": format!(
                    "Financial summary: total {:.2} ({} transactions, income {:.2}, expenses {:.2}).",
                    summary.total, summary.transactions, summary.income, summary.expenses
                ),
                "metrics": {
                    "total": summary.total,
                    "income": summary.income,
                    "expenses": summary.expenses,
                    "transactions": summary.transactions,
                },
            }),
        );

        let mutator = StateMutator::new();
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "summary")?;
        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::capabilities::InMemoryDataRepository;
    use agentgraph_core::Action;

    #[tokio::test]
    async fn test_summary_writes_metrics() {
        let agent = SummaryAgent::new();
        let ctx = NodeContext::detached("summary", Action::SummaryGeneration);
        let mut caps = CapabilityMap::new();
        caps.insert(
            DATA_REPOSITORY,
            Arc::new(InMemoryDataRepository::new()) as Arc<dyn DataRepository>,
        );

        let state = GraphState::new("s1", "t1", "summary please");
        let output = agent.invoke(&state, &caps, &ctx).await.unwrap();

        let result = &output.state.agent_results["summary"];
        assert!(result["metrics"]["total"].as_f64().unwrap() > 0.0);
        assert!(result["message"].as_str().unwrap().contains("Financial summary"));
    }

    #[tokio::test]
    async fn test_missing_repository_is_transient() {
        let agent = SummaryAgent::new();
        let ctx = NodeContext::detached("summary", Action::SummaryGeneration);
        let state = GraphState::new("s1", "t1", "summary please");

        let err = agent
            .invoke(&state, &CapabilityMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Transient(_)));
    }
}
