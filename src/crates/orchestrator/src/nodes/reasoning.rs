//! Reasoning node - turns an intent into an executable plan
//!
//! Produces the ordered `plan` and mirrors it into `pending_tasks`. Planning
//! is deliberately table-driven here; a model-backed planner satisfies the
//! same node contract.

use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, Intent, NodeContext, NodeError, NodeOutput, PlanStep,
    StateField, StateMutator, TaskItem, TaskStatus,
};
use async_trait::async_trait;
use serde_json::json;

/// Agent a given intent resolves to
pub fn agent_for_intent(intent: Intent) -> &'static str {
    match intent {
        Intent::Summary => "summary",
        Intent::Branch => "branch",
        Intent::Anomaly => "anomaly",
        Intent::Document => "document_write",
        Intent::Database => "database",
        Intent::News | Intent::Greeting | Intent::Smalltalk | Intent::Unknown => "smalltalk",
    }
}

/// Table-driven planner node
pub struct ReasoningNode;

impl ReasoningNode {
    pub fn new() -> Self {
        Self
    }

    fn plan_for(&self, state: &GraphState) -> Vec<PlanStep> {
        let agent = agent_for_intent(state.intent);
        let (title, expected_output) = match state.intent {
            Intent::Summary => ("Collect financial metrics", "totals and breakdowns"),
            Intent::Branch => ("Break down branch performance", "per-branch metrics"),
            Intent::Anomaly => ("Scan for anomalies", "flagged records"),
            Intent::Document => ("Write the requested document", "write confirmation"),
            Intent::Database => ("Run the database query", "row counts"),
            _ => ("Reply conversationally", "a short reply"),
        };
        vec![PlanStep {
            id: "step-1".to_string(),
            title: title.to_string(),
            description: format!("Handle '{}' via the {agent} agent", state.user_message),
            target_agent: agent.to_string(),
            expected_output: expected_output.to_string(),
        }]
    }
}

impl Default for ReasoningNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for ReasoningNode {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let plan = self.plan_for(state);
        ctx.emit_progress(format!("planned {} step(s)", plan.len()), None);

        let mutator = StateMutator::new();
        let mut next = state.clone();
        for step in &plan {
            next = mutator.append(&next, StateField::Plan, json!(step))?;
            next = mutator.append(
                &next,
                StateField::PendingTasks,
                json!(TaskItem {
                    id: format!("task-{}", step.id),
                    agent: step.target_agent.clone(),
                    payload: json!({"intent": state.intent.as_str()}),
                    status: TaskStatus::Pending,
                }),
            )?;
        }

        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_targets_follow_intent() {
        let node = ReasoningNode::new();
        let mut state = GraphState::new("s1", "t1", "totals please");
        state.intent = Intent::Summary;

        let plan = node.plan_for(&state);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].target_agent, "summary");

        state.intent = Intent::Anomaly;
        assert_eq!(node.plan_for(&state)[0].target_agent, "anomaly");

        state.intent = Intent::Unknown;
        assert_eq!(node.plan_for(&state)[0].target_agent, "smalltalk");
    }

    #[test]
    fn test_intent_to_agent_table() {
        assert_eq!(agent_for_intent(Intent::Document), "document_write");
        assert_eq!(agent_for_intent(Intent::Database), "database");
        assert_eq!(agent_for_intent(Intent::Greeting), "smalltalk");
    }
}
