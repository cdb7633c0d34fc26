//! The orchestrator facade - process-scoped entry point
//!
//! Owns every service a deployment needs exactly once: the node registry,
//! the dynamic graph manager, the session store, the event broadcaster, the
//! turn runtime, and the TTL sweeper task. What the original design kept in
//! module-level singletons lives here with explicit construction and
//! [`Orchestrator::shutdown`].
//!
//! The default graph wires the scaffold nodes and built-in agents:
//!
//! ```text
//! intent -> reasoning -> router -(routing_decision)-> summary
//!                                                  |-> branch
//!                                                  |-> anomaly
//!                                                  |-> database
//!                                                  |-> document_write
//!                                                  |-> human_gate
//!                                                  `-> smalltalk
//!                                 each agent -> assemble -> finalize
//! ```

use crate::agents::{
    AnomalyAgent, BranchAgent, DatabaseAgent, DocumentAgent, InMemoryDataRepository,
    InMemoryDocumentStore, InMemoryQueryExecutor, SmalltalkAgent, SummaryAgent,
    DataRepository, DocumentStore, QueryExecutor, DATABASE, DATA_REPOSITORY, DOCUMENT_STORE,
};
use crate::broadcast::{EventBroadcaster, EventFilter, SubscriptionHandle};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::nodes::{
    AssembleNode, HumanGateNode, IntentNode, ReasoningNode, RouterNode, SupervisorNode,
    NODE_CATALOG,
};
use agentgraph_core::{
    CapabilityMap, EventSink, GraphManager, GraphSpec, NodeDescriptor, NodeRegistry, Privilege,
    RetryPolicy, RouteTarget, StateField, TurnHandle, TurnOptions, TurnRuntime, FINALIZE,
};
use agentgraph_checkpoint::{InMemorySessionStore, SessionStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Agents wired into the default graph
const DEFAULT_AGENTS: &[&str] = &[
    "summary",
    "branch",
    "anomaly",
    "database",
    "document_write",
    "smalltalk",
];

/// Process-scoped orchestration service
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<NodeRegistry>,
    manager: Arc<GraphManager>,
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<EventBroadcaster>,
    runtime: Arc<TurnRuntime>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build with the in-memory session store
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let store = Arc::new(InMemorySessionStore::new(
            config.history_depth,
            config.session_ttl(),
        ));
        Self::with_store(config, store)
    }

    /// Build against an explicit session store backend
    pub fn with_store(
        config: OrchestratorConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(NodeRegistry::new());
        register_default_nodes(&registry, &config)?;

        let manager = Arc::new(GraphManager::new(registry.clone()));
        manager.rebuild(default_graph_spec())?;

        let broadcaster = Arc::new(EventBroadcaster::new(
            config.broadcast_buffer,
            config.broadcast_history,
        ));

        let mut capabilities = CapabilityMap::new();
        capabilities.insert(
            DATA_REPOSITORY,
            Arc::new(InMemoryDataRepository::new()) as Arc<dyn DataRepository>,
        );
        capabilities.insert(
            DOCUMENT_STORE,
            Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>,
        );
        capabilities.insert(
            DATABASE,
            Arc::new(InMemoryQueryExecutor::new()) as Arc<dyn QueryExecutor>,
        );
        capabilities.insert(NODE_CATALOG, registry.clone());

        let runtime = Arc::new(TurnRuntime::new(
            manager.clone(),
            store.clone(),
            broadcaster.clone() as Arc<dyn EventSink>,
            capabilities,
            config.runtime_config(),
        ));

        let orchestrator = Self {
            config,
            registry,
            manager,
            store,
            broadcaster,
            runtime,
            sweeper: Mutex::new(None),
        };
        orchestrator.spawn_sweeper();
        Ok(orchestrator)
    }

    /// Run one turn; a fresh session is created when `session_id` is `None`
    pub async fn start_turn(
        &self,
        session_id: Option<String>,
        user_message: &str,
        options: TurnOptions,
    ) -> Result<TurnHandle> {
        Ok(self
            .runtime
            .run_turn(session_id, user_message, options)
            .await?)
    }

    /// Complete a turn paused at a human gate
    pub async fn resume(
        &self,
        session_id: &str,
        resume_token: &str,
        decision: Value,
    ) -> Result<TurnHandle> {
        Ok(self.runtime.resume(session_id, resume_token, decision).await?)
    }

    /// Request cooperative cancellation of a running turn
    pub fn cancel(&self, trace_id: &str) -> bool {
        self.runtime.cancel(trace_id)
    }

    /// Register (or replace) a node at the configured default privilege and
    /// recompile the graph; returns the new graph version
    pub fn register_node(&self, descriptor: NodeDescriptor) -> Result<u64> {
        self.register_node_as(descriptor, self.config.default_privilege)
    }

    /// Register with an explicit caller privilege
    pub fn register_node_as(
        &self,
        descriptor: NodeDescriptor,
        caller: Privilege,
    ) -> Result<u64> {
        Ok(self.manager.register_node(descriptor, caller)?)
    }

    /// Unregister a node; supply a replacement when the active graph still
    /// references it
    pub fn unregister_node(
        &self,
        name: &str,
        replacement: Option<NodeDescriptor>,
    ) -> Result<()> {
        Ok(self
            .manager
            .unregister_node(name, replacement, self.config.default_privilege)?)
    }

    /// Live enable/disable toggle
    pub fn set_node_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        Ok(self.registry.set_enabled(name, enabled)?)
    }

    /// Compile and atomically install a new graph topology
    pub fn rebuild_graph(&self, spec: GraphSpec) -> Result<u64> {
        Ok(self.manager.rebuild(spec)?)
    }

    /// Attach an event subscriber
    pub fn subscribe_events(&self, filter: EventFilter) -> SubscriptionHandle {
        self.broadcaster.subscribe(filter)
    }

    /// Detach an event subscriber (idempotent)
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.broadcaster.unsubscribe(handle)
    }

    /// Close a session (idempotent)
    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        Ok(self.store.close(session_id).await?)
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Version of the currently active graph
    pub fn graph_version(&self) -> Result<u64> {
        Ok(self.manager.current()?.version())
    }

    /// Stop background work; further turns still run, but idle sessions are
    /// no longer swept
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            tracing::info!("sweeper stopped");
        }
    }

    fn spawn_sweeper(&self) {
        // Construction outside a tokio runtime (e.g. plain unit tests) just
        // skips background sweeping
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("no async runtime at construction; session sweeper disabled");
            return;
        }
        let store = self.store.clone();
        let interval = Duration::from_millis(self.config.sweep_interval_ms.max(100));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.sweep(chrono::Utc::now()).await {
                    Ok(swept) if !swept.is_empty() => {
                        tracing::info!(count = swept.len(), "swept idle sessions");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "session sweep failed"),
                }
            }
        });
        *self.sweeper.lock() = Some(handle);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Initialize tracing from `RUST_LOG` (safe to call repeatedly)
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn register_default_nodes(
    registry: &Arc<NodeRegistry>,
    config: &OrchestratorConfig,
) -> Result<()> {
    use StateField::*;

    let caller = Privilege::Admin;
    let nodes = vec![
        NodeDescriptor::system("intent", Arc::new(IntentNode::new()))
            .with_outputs([Intent, IntentConfidence, ResponseMetadata]),
        NodeDescriptor::system("reasoning", Arc::new(ReasoningNode::new()))
            .with_outputs([Plan, PendingTasks]),
        NodeDescriptor::system("supervisor", Arc::new(SupervisorNode::new()))
            .with_capabilities([NODE_CATALOG])
            .with_outputs([ResponseMetadata]),
        NodeDescriptor::system(
            "router",
            Arc::new(RouterNode::new(config.intent_confidence_floor)),
        )
        .with_outputs([RoutingDecision, ResponseMetadata]),
        NodeDescriptor::system("assemble", Arc::new(AssembleNode::new()))
            .with_outputs([ResponseMetadata]),
        NodeDescriptor::gate("human_gate", Arc::new(HumanGateNode::new()))
            .with_outputs([ResponseMetadata]),
        NodeDescriptor::agent("summary", Arc::new(SummaryAgent::new()))
            .with_capabilities([DATA_REPOSITORY])
            .with_outputs([AgentResults, PendingTasks]),
        NodeDescriptor::agent("branch", Arc::new(BranchAgent::new()))
            .with_capabilities([DATA_REPOSITORY])
            .with_outputs([AgentResults, PendingTasks]),
        NodeDescriptor::agent("anomaly", Arc::new(AnomalyAgent::new()))
            .with_capabilities([DATA_REPOSITORY])
            .with_outputs([AgentResults, PendingTasks]),
        NodeDescriptor::agent("smalltalk", Arc::new(SmalltalkAgent::new()))
            .with_retry(RetryPolicy::none())
            .with_outputs([AgentResults, PendingTasks]),
        NodeDescriptor::agent("document_write", Arc::new(DocumentAgent::new()))
            .with_capabilities([DOCUMENT_STORE])
            .with_side_effecting(true)
            .with_outputs([AgentResults, PendingTasks]),
        NodeDescriptor::agent("database", Arc::new(DatabaseAgent::new()))
            .with_capabilities([DATABASE])
            .with_side_effecting(true)
            .with_outputs([AgentResults, PendingTasks]),
    ];

    for descriptor in nodes {
        registry.register(descriptor, caller)?;
    }
    Ok(())
}

/// The default topology; see the [module docs](self) for the picture
pub fn default_graph_spec() -> GraphSpec {
    let mut spec = GraphSpec::new()
        .set_entry("intent")
        .add_edge("intent", "reasoning")
        .add_edge("reasoning", "router")
        .add_conditional(
            "router",
            Arc::new(|state: &agentgraph_core::GraphState| {
                match state.routing_decision.as_deref() {
                    Some(target) => RouteTarget::Node(target.to_string()),
                    None => RouteTarget::Node("smalltalk".to_string()),
                }
            }),
        );
    for agent in DEFAULT_AGENTS {
        spec = spec.add_edge(*agent, "assemble");
    }
    spec.add_edge("human_gate", "assemble")
        .add_edge("assemble", FINALIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_construction_and_shutdown() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default()).unwrap();
        assert!(orchestrator.graph_version().unwrap() >= 1);
        assert!(orchestrator.registry().contains("intent"));
        assert!(orchestrator.registry().contains("document_write"));
        orchestrator.shutdown();
        orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_rebuild_bumps_version() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default()).unwrap();
        let before = orchestrator.graph_version().unwrap();
        let after = orchestrator.rebuild_graph(default_graph_spec()).unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_register_requires_privilege() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default()).unwrap();
        let descriptor = NodeDescriptor::agent(
            "vault",
            Arc::new(SmalltalkAgent::new()),
        )
        .with_privilege(Privilege::Privileged);

        // Default caller privilege is standard
        assert!(orchestrator.register_node(descriptor.clone()).is_err());
        assert!(orchestrator
            .register_node_as(descriptor, Privilege::Admin)
            .is_ok());
    }
}
