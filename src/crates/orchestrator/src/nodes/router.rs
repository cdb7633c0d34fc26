//! Router node - picks exactly one next agent, deterministically
//!
//! The router is a pure function of the snapshot: identical input produces
//! identical output. Resolution order:
//!
//! 1. `response_metadata.force_route` (caller override) wins outright.
//! 2. Confidence below the configured floor routes to smalltalk.
//! 3. The supervisor's `routing_agent` verdict, when present.
//! 4. The intent-to-agent table.
//!
//! The decision lands in `routing_decision` and
//! `response_metadata.target_agent`; the graph's conditional edge reads
//! `routing_decision` to pick the next node. More than one distinct
//! candidate surviving resolution is a programming error and fails the turn.

use crate::nodes::reasoning::agent_for_intent;
use agentgraph_core::{
    AgentNode, CapabilityMap, FatalKind, GraphState, NodeContext, NodeError, NodeOutput,
    StateField, StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const SMALLTALK: &str = "smalltalk";

/// Deterministic next-agent selector
pub struct RouterNode {
    confidence_floor: f64,
}

impl RouterNode {
    pub fn new(confidence_floor: f64) -> Self {
        Self { confidence_floor }
    }

    /// Pure routing decision for a snapshot
    pub fn decide(&self, state: &GraphState) -> Result<String, NodeError> {
        if let Some(forced) = state
            .response_metadata
            .get("force_route")
            .and_then(Value::as_str)
        {
            return Ok(forced.to_string());
        }

        if state.intent_confidence < self.confidence_floor {
            return Ok(SMALLTALK.to_string());
        }

        let from_intent = agent_for_intent(state.intent).to_string();
        let from_supervisor = state
            .response_metadata
            .get("routing_agent")
            .and_then(Value::as_str)
            .map(str::to_string);

        match from_supervisor {
            // The supervisor may only confirm the plan or downgrade to
            // smalltalk; anything else means two components disagree about
            // where this turn goes
            Some(agent) if agent == from_intent || agent == SMALLTALK => Ok(agent),
            Some(agent) => Err(NodeError::fatal(
                FatalKind::InvalidOutput,
                format!("routing ambiguity: supervisor chose '{agent}', intent maps to '{from_intent}'"),
            )),
            None => Ok(from_intent),
        }
    }
}

#[async_trait]
impl AgentNode for RouterNode {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let target = self.decide(state)?;
        ctx.emit_progress(format!("routing to {target}"), None);

        let mutator = StateMutator::new();
        let mut next = mutator.set(state, StateField::RoutingDecision, json!(target))?;
        let mut meta = Map::new();
        meta.insert("target_agent".to_string(), json!(target));
        next = mutator.merge_mapping(&next, StateField::ResponseMetadata, meta)?;
        Ok(NodeOutput::new(next))
    }
}
