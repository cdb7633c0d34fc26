//! Smalltalk agent - the conversational fallback
//!
//! Handles greetings, low-confidence turns, and anything no specialist
//! claims. Requires no capabilities, so it is also the safe rerouting
//! target when another agent is disabled.

use crate::agents::complete_task;
use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, Intent, NodeContext, NodeError, NodeOutput, StateField,
    StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};

/// Conversational fallback agent
pub struct SmalltalkAgent;

impl SmalltalkAgent {
    pub fn new() -> Self {
        Self
    }

    fn reply_for(&self, state: &GraphState) -> String {
        match state.intent {
            Intent::Greeting => "Hello! Ask me for a financial summary, branch breakdown, or anomaly scan.".to_string(),
            Intent::News => "News feeds are not connected here, but I can dig into your own numbers.".to_string(),
            _ => format!(
                "I was not sure what to do with \"{}\". Try asking for a summary, branches, or anomalies.",
                state.user_message.trim()
            ),
        }
    }
}

impl Default for SmalltalkAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for SmalltalkAgent {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let reply = self.reply_for(state);
        ctx.emit_progress("composing reply", None);

        let mut results = Map::new();
        results.insert(
            "smalltalk".to_string(),
            json!({"message": reply, "metrics": {}}),
        );

        let mutator = StateMutator::new();
        let mut next = mutator.merge_mapping(state, StateField::AgentResults, results)?;
        next = complete_task(&mutator, &next, "smalltalk")?;
        Ok(NodeOutput::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_core::Action;

    #[tokio::test]
    async fn test_greeting_reply() {
        let agent = SmalltalkAgent::new();
        let ctx = NodeContext::detached("smalltalk", Action::Other);
        let mut state = GraphState::new("s1", "t1", "hello there");
        state.intent = Intent::Greeting;

        let output = agent
            .invoke(&state, &CapabilityMap::new(), &ctx)
            .await
            .unwrap();
        let message = output.state.agent_results["smalltalk"]["message"]
            .as_str()
            .unwrap();
        assert!(message.starts_with("Hello"));
    }

    #[tokio::test]
    async fn test_fallback_reply_mentions_input() {
        let agent = SmalltalkAgent::new();
        let ctx = NodeContext::detached("smalltalk", Action::Other);
        let mut state = GraphState::new("s1", "t1", "asdf qwer");
        state.intent = Intent::Smalltalk;

        let output = agent
            .invoke(&state, &CapabilityMap::new(), &ctx)
            .await
            .unwrap();
        let message = output.state.agent_results["smalltalk"]["message"]
            .as_str()
            .unwrap();
        assert!(message.contains("asdf qwer"));
    }
}
