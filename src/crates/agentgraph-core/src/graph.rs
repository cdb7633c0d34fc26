//! Graph model: node descriptors, edges, conditional routing, validation
//!
//! A [`Graph`] is the compiled, versioned artifact the execution loop walks:
//! descriptors keyed by name, direct edges in spec order, conditional
//! routers, one entry node, and a terminal set. Graphs are built from a
//! [`GraphSpec`] plus the registry's current descriptors and are immutable
//! after compilation - the dynamic manager swaps whole `Arc<Graph>` values,
//! never patches one in place.
//!
//! # Structural invariants (checked at compile time)
//!
//! - the entry node exists,
//! - every edge endpoint exists (or is [`FINALIZE`]),
//! - every conditional is attached to an existing node,
//! - terminal nodes have no outgoing edges,
//! - no self-loops except edges explicitly flagged as retry edges.

use crate::node::AgentNode;
use crate::retry::RetryPolicy;
use crate::state::GraphState;
use crate::mutator::StateField;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Name of the implicit terminal node every turn ends on
pub const FINALIZE: &str = "finalize";

/// Errors from graph compilation
#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("Graph validation failed: {0}")]
    Validation(String),
}

/// Role of a node within the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Infrastructure node (intent, router, assemble, ...)
    System,
    /// Capability-bearing agent
    Agent,
    /// Pauses the turn for a human decision
    Gate,
}

/// Privilege tier required to register or invoke a node
///
/// Ordered: `Restricted < Standard < Elevated < Privileged < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Restricted,
    #[default]
    Standard,
    Elevated,
    Privileged,
    Admin,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Restricted => "restricted",
            Privilege::Standard => "standard",
            Privilege::Elevated => "elevated",
            Privilege::Privileged => "privileged",
            Privilege::Admin => "admin",
        }
    }
}

/// Complete description of a registered node
#[derive(Clone)]
pub struct NodeDescriptor {
    pub name: String,
    pub kind: NodeKind,
    pub required_privilege: Privilege,
    pub enabled: bool,
    /// Disables the anti-repetition cache for turns that executed this node
    pub side_effecting: bool,
    /// Capability names handed to the node at invocation
    pub required_capabilities: Vec<String>,
    /// State fields this node may write, enforced by the runtime after
    /// every invocation. Status and gate fields are always writable; an
    /// empty declaration disables the check.
    pub declared_outputs: Vec<StateField>,
    pub retry: RetryPolicy,
    /// Per-node deadline override in milliseconds
    pub timeout_ms: Option<u64>,
    pub implementation: Arc<dyn AgentNode>,
}

impl NodeDescriptor {
    /// Descriptor for a system node (no retries by default)
    pub fn system(name: impl Into<String>, implementation: Arc<dyn AgentNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::System,
            required_privilege: Privilege::Standard,
            enabled: true,
            side_effecting: false,
            required_capabilities: Vec::new(),
            declared_outputs: Vec::new(),
            retry: RetryPolicy::none(),
            timeout_ms: None,
            implementation,
        }
    }

    /// Descriptor for an agent node (default retry policy)
    pub fn agent(name: impl Into<String>, implementation: Arc<dyn AgentNode>) -> Self {
        Self {
            kind: NodeKind::Agent,
            retry: RetryPolicy::default(),
            ..Self::system(name, implementation)
        }
    }

    /// Descriptor for a gate node
    pub fn gate(name: impl Into<String>, implementation: Arc<dyn AgentNode>) -> Self {
        Self {
            kind: NodeKind::Gate,
            ..Self::system(name, implementation)
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.required_privilege = privilege;
        self
    }

    pub fn with_side_effecting(mut self, side_effecting: bool) -> Self {
        self.side_effecting = side_effecting;
        self
    }

    pub fn with_capabilities(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_capabilities = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs(mut self, fields: impl IntoIterator<Item = StateField>) -> Self {
        self.declared_outputs = fields.into_iter().collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required_privilege", &self.required_privilege)
            .field("enabled", &self.enabled)
            .field("side_effecting", &self.side_effecting)
            .field("implementation", &"<node>")
            .finish()
    }
}

/// Where a conditional router sends the turn next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Node(String),
    Finalize,
}

impl RouteTarget {
    pub fn name(&self) -> &str {
        match self {
            RouteTarget::Node(name) => name,
            RouteTarget::Finalize => FINALIZE,
        }
    }
}

/// Pure routing function evaluated on the post-node snapshot
pub type ConditionalRouter = Arc<dyn Fn(&GraphState) -> RouteTarget + Send + Sync>;

/// Declarative description of a graph's topology
///
/// Edge order is significant: when a node has several direct edges and no
/// conditional, the first edge in spec order is taken.
#[derive(Clone, Default)]
pub struct GraphSpec {
    entry: Option<String>,
    edges: Vec<(String, String)>,
    conditionals: HashMap<String, ConditionalRouter>,
    terminals: HashSet<String>,
    retry_edges: HashSet<(String, String)>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Self-loop edge used only by explicit retry routing
    pub fn add_retry_edge(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        self.retry_edges.insert((node.clone(), node.clone()));
        self.edges.push((node.clone(), node));
        self
    }

    pub fn add_conditional(mut self, from: impl Into<String>, router: ConditionalRouter) -> Self {
        self.conditionals.insert(from.into(), router);
        self
    }

    pub fn add_terminal(mut self, node: impl Into<String>) -> Self {
        self.terminals.insert(node.into());
        self
    }

    /// Compile against a set of descriptors, validating structure
    ///
    /// Only descriptors the spec references (entry, edge endpoints,
    /// conditional sources) are carried into the compiled graph; a node
    /// that is merely registered is not considered part of the topology.
    pub fn compile(
        &self,
        descriptors: HashMap<String, NodeDescriptor>,
        version: u64,
    ) -> Result<Graph, GraphBuildError> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| GraphBuildError::Validation("No entry node set".to_string()))?;
        if !descriptors.contains_key(&entry) {
            return Err(GraphBuildError::Validation(format!(
                "Entry node '{entry}' is not registered"
            )));
        }

        let mut terminals = self.terminals.clone();
        terminals.insert(FINALIZE.to_string());

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.edges {
            if !descriptors.contains_key(from) {
                return Err(GraphBuildError::Validation(format!(
                    "Edge source '{from}' is not registered"
                )));
            }
            if to != FINALIZE && !descriptors.contains_key(to) {
                return Err(GraphBuildError::Validation(format!(
                    "Edge target '{to}' is not registered"
                )));
            }
            if terminals.contains(from) {
                return Err(GraphBuildError::Validation(format!(
                    "Terminal node '{from}' may not have outgoing edges"
                )));
            }
            if from == to && !self.retry_edges.contains(&(from.clone(), to.clone())) {
                return Err(GraphBuildError::Validation(format!(
                    "Self-loop on '{from}' without a retry edge"
                )));
            }
            edges.entry(from.clone()).or_default().push(to.clone());
        }

        for node in self.conditionals.keys() {
            if !descriptors.contains_key(node) {
                return Err(GraphBuildError::Validation(format!(
                    "Conditional attached to unknown node '{node}'"
                )));
            }
        }

        let mut referenced: HashSet<String> = HashSet::new();
        referenced.insert(entry.clone());
        referenced.extend(self.conditionals.keys().cloned());
        for (from, to) in &self.edges {
            referenced.insert(from.clone());
            if to != FINALIZE {
                referenced.insert(to.clone());
            }
        }
        let nodes = descriptors
            .into_iter()
            .filter(|(name, _)| referenced.contains(name))
            .collect();

        Ok(Graph {
            version,
            nodes,
            edges,
            conditionals: self.conditionals.clone(),
            entry,
            terminals,
        })
    }
}

impl std::fmt::Debug for GraphSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSpec")
            .field("entry", &self.entry)
            .field("edges", &self.edges)
            .field("conditionals", &self.conditionals.keys().collect::<Vec<_>>())
            .field("terminals", &self.terminals)
            .finish()
    }
}

/// Compiled, immutable, versioned graph
#[derive(Clone)]
pub struct Graph {
    version: u64,
    nodes: HashMap<String, NodeDescriptor>,
    edges: HashMap<String, Vec<String>>,
    conditionals: HashMap<String, ConditionalRouter>,
    entry: String,
    terminals: HashSet<String>,
}

impl Graph {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn descriptor(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Resolve the node following `node` given the post-node snapshot
    ///
    /// Conditionals win over direct edges; among direct edges the first in
    /// spec order is taken. `None` means there is nowhere to go (a dead end
    /// for non-terminal nodes - the runtime surfaces that as an error).
    pub fn next_after(&self, node: &str, state: &GraphState) -> Option<RouteTarget> {
        if let Some(router) = self.conditionals.get(node) {
            return Some(router(state));
        }
        self.edges
            .get(node)
            .and_then(|targets| targets.first())
            .map(|t| {
                if t == FINALIZE {
                    RouteTarget::Finalize
                } else {
                    RouteTarget::Node(t.clone())
                }
            })
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("version", &self.version)
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FnNode, NodeOutput};

    fn noop() -> Arc<dyn AgentNode> {
        Arc::new(FnNode::new(|state, _caps, _ctx| {
            Box::pin(async move { Ok(NodeOutput::new(state)) })
        }))
    }

    fn descriptors(names: &[&str]) -> HashMap<String, NodeDescriptor> {
        names
            .iter()
            .map(|n| (n.to_string(), NodeDescriptor::system(*n, noop())))
            .collect()
    }

    #[test]
    fn test_compile_valid_graph() {
        let graph = GraphSpec::new()
            .set_entry("intent")
            .add_edge("intent", "router")
            .add_edge("router", FINALIZE)
            .compile(descriptors(&["intent", "router"]), 1)
            .unwrap();

        assert_eq!(graph.version(), 1);
        assert_eq!(graph.entry(), "intent");
        assert!(graph.is_terminal(FINALIZE));
    }

    #[test]
    fn test_missing_entry_rejected() {
        let err = GraphSpec::new()
            .set_entry("ghost")
            .compile(descriptors(&["intent"]), 1)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_edge_target_rejected() {
        let err = GraphSpec::new()
            .set_entry("intent")
            .add_edge("intent", "ghost")
            .compile(descriptors(&["intent"]), 1)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_self_loop_requires_retry_edge() {
        let err = GraphSpec::new()
            .set_entry("intent")
            .add_edge("intent", "intent")
            .compile(descriptors(&["intent"]), 1)
            .unwrap_err();
        assert!(err.to_string().contains("Self-loop"));

        // Flagged as retry edge, the same loop is allowed
        GraphSpec::new()
            .set_entry("intent")
            .add_retry_edge("intent")
            .compile(descriptors(&["intent"]), 1)
            .unwrap();
    }

    #[test]
    fn test_terminal_with_outgoing_edge_rejected() {
        let err = GraphSpec::new()
            .set_entry("intent")
            .add_terminal("sink")
            .add_edge("sink", "intent")
            .compile(descriptors(&["intent", "sink"]), 1)
            .unwrap_err();
        assert!(err.to_string().contains("Terminal"));
    }

    #[test]
    fn test_first_edge_in_spec_order_wins() {
        let graph = GraphSpec::new()
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("a", "c")
            .add_edge("b", FINALIZE)
            .add_edge("c", FINALIZE)
            .compile(descriptors(&["a", "b", "c"]), 1)
            .unwrap();

        let state = GraphState::new("s1", "t1", "hi");
        assert_eq!(
            graph.next_after("a", &state),
            Some(RouteTarget::Node("b".to_string()))
        );
    }

    #[test]
    fn test_conditional_wins_over_edges() {
        let graph = GraphSpec::new()
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("b", FINALIZE)
            .add_conditional("a", Arc::new(|_s| RouteTarget::Finalize))
            .compile(descriptors(&["a", "b"]), 1)
            .unwrap();

        let state = GraphState::new("s1", "t1", "hi");
        assert_eq!(graph.next_after("a", &state), Some(RouteTarget::Finalize));
    }

    #[test]
    fn test_dead_end_is_none() {
        let graph = GraphSpec::new()
            .set_entry("a")
            .compile(descriptors(&["a"]), 1)
            .unwrap();

        let state = GraphState::new("s1", "t1", "hi");
        assert_eq!(graph.next_after("a", &state), None);
    }

    #[test]
    fn test_privilege_ordering() {
        assert!(Privilege::Admin > Privilege::Elevated);
        assert!(Privilege::Standard > Privilege::Restricted);
        assert_eq!(Privilege::default(), Privilege::Standard);
    }
}
