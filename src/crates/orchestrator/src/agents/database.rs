//! Database agent - side-effecting SQL execution

use crate::agents::capabilities::{QueryExecutor, DATABASE};
use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;

/// Plans and executes a statement through the `database` capability
pub struct DatabaseAgent;

impl DatabaseAgent {
    pub fn new() -> Self {
        Self
    }

    /// Statement planning is deliberately naive; a SQL-planner capability
    /// slots in behind the same interface
    fn plan_statement(&self, state: &GraphState) -> String {
        let wants_branches = state.user_message.to_lowercase().contains("branch");
        if wants_branches {
            "SELECT branch, SUM(amount) FROM transactions GROUP BY branch".to_string()
        } else {
            "SELECT COUNT(*) FROM transactions".to_string()
        }
    }
}

impl Default for DatabaseAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for DatabaseAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let executor: Arc<dyn QueryExecutor> = capabilities
            .get(DATABASE)
            .ok_or_else(|| NodeError::transient("database capability missing"))?;

        let statement = self.plan_statement(state);
        ctx.emit_progress(format!("executing: {statement}"), None);
        let rows = executor
            .execute(&statement)
            .await
            .map_err(|e| NodeError::transient(e.to_string()))?;

        let mut results = Map::new();
        results.insert(
            "database".to_string(),
            json!({
                "message": format!("Query returned {rows} row(s)."),
                "metrics": {"rows": rows},
                "statement": statement,
            }),
        );

        let mutator = StateMutator::new();
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "database")?;
        Ok(NodeOutput::new(next))
    }
}
