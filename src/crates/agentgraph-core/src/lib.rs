//! # agentgraph-core - Graph execution engine for multi-agent orchestration
//!
//! This crate is the runtime that routes one user request through a directed
//! graph of cooperating nodes - intent classification, reasoning, routing,
//! capability agents, human gates, assembly - while broadcasting progress
//! events, checkpointing every state transition, and returning a structured
//! [`ResponseEnvelope`] downstream consumers never have to string-parse.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator facade
//!       |
//!       v
//! TurnRuntime (execution loop)
//!   |-- GraphManager ---- atomic Arc<Graph> swap, version pinning
//!   |     `-- NodeRegistry (living catalog, live enabled flags)
//!   |-- StateMutator ---- the only legal write path to GraphState
//!   |-- SessionStore ---- per-session snapshot ring (agentgraph-checkpoint)
//!   `-- EventSink ------- node_transition / agent_start / agent_end / state
//! ```
//!
//! ## Core pieces
//!
//! - [`state::GraphState`] - the immutable-by-convention execution record.
//! - [`mutator::StateMutator`] - `set` / `merge_mapping` / `append` /
//!   `advance`; every write validated against the closed field schema.
//! - [`graph`] - descriptors, edges, conditional routers, compile-time
//!   validation, the [`graph::FINALIZE`] terminal.
//! - [`registry::NodeRegistry`] / [`manager::GraphManager`] - dynamic node
//!   registration and atomic graph swaps that never drop in-flight turns.
//! - [`runtime::TurnRuntime`] - the loop: advance, persist, emit, invoke
//!   (with deadline, cooperative cancellation, retry), route, finalize.
//! - [`node`] - the node contract: `invoke(state, capabilities, context)`.
//! - [`event`] - the broadcast envelope and the non-blocking sink contract.
//! - [`envelope::ResponseEnvelope`] - the end-of-turn structured response.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentgraph_core::{
//!     CapabilityMap, FnNode, GraphManager, GraphSpec, NodeDescriptor, NodeOutput,
//!     NodeRegistry, NullEventSink, Privilege, RuntimeConfig, TurnOptions, TurnRuntime,
//!     FINALIZE,
//! };
//! use agentgraph_checkpoint::InMemorySessionStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(NodeRegistry::new());
//! registry.register(
//!     NodeDescriptor::system(
//!         "echo",
//!         Arc::new(FnNode::new(|state, _caps, _ctx| {
//!             Box::pin(async move { Ok(NodeOutput::new(state)) })
//!         })),
//!     ),
//!     Privilege::Standard,
//! )?;
//!
//! let manager = Arc::new(GraphManager::new(registry));
//! manager.rebuild(GraphSpec::new().set_entry("echo").add_edge("echo", FINALIZE))?;
//!
//! let runtime = TurnRuntime::new(
//!     manager,
//!     Arc::new(InMemorySessionStore::default()),
//!     Arc::new(NullEventSink),
//!     CapabilityMap::new(),
//!     RuntimeConfig::default(),
//! );
//!
//! let handle = runtime.run_turn(None, "hello", TurnOptions::default()).await?;
//! println!("{:?}", handle.envelope.status);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod envelope;
pub mod error;
pub mod event;
pub mod graph;
pub mod hash;
pub mod manager;
pub mod mutator;
pub mod node;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod state;

pub use action::Action;
pub use envelope::{
    EnvelopeData, EnvelopeError, EnvelopeMeta, EnvelopeStatus, HumanGateInfo, ResponseEnvelope,
};
pub use error::{Result, RuntimeError};
pub use event::{EventEnvelope, EventKind, EventMeta, EventSink, NullEventSink};
pub use graph::{
    ConditionalRouter, Graph, GraphBuildError, GraphSpec, NodeDescriptor, NodeKind, Privilege,
    RouteTarget, FINALIZE,
};
pub use manager::{GraphManager, GraphManagerError};
pub use mutator::{StateField, StateMutator};
pub use node::{
    AgentNode, CancelHandle, CancelSignal, CapabilityMap, FatalKind, FnNode, NodeContext,
    NodeError, NodeOutput,
};
pub use registry::{NodeRegistry, RegistryError};
pub use retry::RetryPolicy;
pub use runtime::{RuntimeConfig, TurnHandle, TurnOptions, TurnRuntime};
pub use state::{
    GraphState, Intent, PlanStep, StateError, StateHashes, TaskItem, TaskStatus, TurnStatus,
};
