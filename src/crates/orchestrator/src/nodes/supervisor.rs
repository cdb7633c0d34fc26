//! Supervisor node - context evaluation before routing
//!
//! Verifies the planned target agent is actually registered and enabled,
//! recording the outcome in `response_metadata.routing_agent`. When the plan
//! targets a node that is unavailable, the supervisor downgrades the route
//! to smalltalk rather than letting the router send the turn into a wall.

use agentgraph_core::{
    AgentNode, CapabilityMap, GraphState, NodeContext, NodeError, NodeOutput, NodeRegistry,
    StateField, StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;

/// Capability name under which the facade exposes the node catalog
pub const NODE_CATALOG: &str = "node_catalog";

/// Plan sanity-checker; consumes the `node_catalog` capability
pub struct SupervisorNode;

impl SupervisorNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SupervisorNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for SupervisorNode {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let catalog: Arc<NodeRegistry> = capabilities
            .get(NODE_CATALOG)
            .ok_or_else(|| NodeError::transient("node_catalog capability missing"))?;

        let planned = state
            .plan
            .first()
            .map(|step| step.target_agent.clone())
            .unwrap_or_else(|| "smalltalk".to_string());

        let routing_agent = if catalog.is_enabled(&planned) {
            planned
        } else {
            tracing::warn!(agent = %planned, "planned agent unavailable, downgrading");
            "smalltalk".to_string()
        };
        ctx.emit_progress(format!("evaluated context, target {routing_agent}"), None);

        let mut meta = Map::new();
        meta.insert("routing_agent".to_string(), json!(routing_agent));
        let next = StateMutator::new().merge_mapping(state, StateField::ResponseMetadata, meta)?;
        Ok(NodeOutput::new(next))
    }
}
