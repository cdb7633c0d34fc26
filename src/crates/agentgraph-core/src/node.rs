//! The node invocation contract
//!
//! A node is any value implementing [`AgentNode`]:
//!
//! ```text
//! invoke(state, capabilities, context) -> NodeOutput { next_state, events }
//! ```
//!
//! - `state` is a read-only snapshot; the node returns a successor produced
//!   via the [`StateMutator`](crate::mutator::StateMutator), never an
//!   in-place mutation.
//! - `capabilities` is the map of opaque handles the node declared in its
//!   descriptor (data repository, file sandbox, ...). Nodes receive only
//!   what they declared - never a back-reference to the orchestrator.
//! - `context` carries the cancellation signal, the per-node deadline, the
//!   trace id, and a progress emitter; cancellation is cooperative and part
//!   of the contract, not ambient.
//!
//! Errors are classified at the boundary: [`NodeError::Transient`] is
//! retried per the node's policy, [`NodeError::Fatal`] aborts the turn, and
//! anything a node lets escape unclassified is treated as fatal with
//! `kind = unhandled`.

use crate::action::Action;
use crate::event::{EventEnvelope, EventKind, EventMeta, EventSink};
use crate::state::{GraphState, StateError};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Failure class of a fatal node error
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    Unhandled,
    Timeout,
    Cancelled,
    InvalidOutput,
    PrivilegeDenied,
}

impl FatalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalKind::Unhandled => "unhandled",
            FatalKind::Timeout => "timeout",
            FatalKind::Cancelled => "cancelled",
            FatalKind::InvalidOutput => "invalid_output",
            FatalKind::PrivilegeDenied => "privilege_denied",
        }
    }
}

/// Errors a node invocation can surface
#[derive(Debug, Error)]
pub enum NodeError {
    /// Retryable per the node's retry policy (network blip, contention)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Aborts the turn; the envelope reports `status = failed`
    #[error("Fatal node error ({}): {message}", kind.as_str())]
    Fatal { kind: FatalKind, message: String },

    /// State contract violation from inside the node
    #[error(transparent)]
    State(#[from] StateError),
}

impl NodeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }
}

/// Cooperative cancellation signal handed to nodes
///
/// Cloneable; all clones observe the same trigger.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            // Sender dropped without triggering: cancellation can no longer
            // happen, park forever rather than spin
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Trigger side of a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Capability handles keyed by name
///
/// Values are stored type-erased; retrieval downcasts back to the concrete
/// handle type (usually an `Arc<dyn SomeCapability>`).
#[derive(Clone, Default)]
pub struct CapabilityMap {
    inner: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability handle under a name
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.inner.insert(name.into(), Arc::new(value));
    }

    /// Fetch a capability by name, downcasting to the registered type
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.inner
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Subset containing only the named capabilities
    pub fn subset(&self, names: &[String]) -> Self {
        Self {
            inner: names
                .iter()
                .filter_map(|n| self.inner.get(n).map(|v| (n.clone(), v.clone())))
                .collect(),
        }
    }
}

impl std::fmt::Debug for CapabilityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityMap")
            .field("names", &self.inner.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-invocation context handed to a node
#[derive(Clone)]
pub struct NodeContext {
    pub session_id: String,
    pub trace_id: String,
    pub node: String,
    pub action: Action,
    /// Invocation attempt, starting at 1
    pub attempt: u32,
    deadline: Instant,
    cancel: CancelSignal,
    events: Arc<dyn EventSink>,
}

impl NodeContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: impl Into<String>,
        trace_id: impl Into<String>,
        node: impl Into<String>,
        action: Action,
        attempt: u32,
        deadline: Instant,
        cancel: CancelSignal,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            trace_id: trace_id.into(),
            node: node.into(),
            action,
            attempt,
            deadline,
            cancel,
            events,
        }
    }

    /// Standalone context for exercising a node outside the runtime
    /// (unit tests, REPL experiments): no-op event sink, far deadline,
    /// never-triggered cancellation
    pub fn detached(node: impl Into<String>, action: Action) -> Self {
        let (handle, signal) = CancelHandle::new();
        // Leak the trigger side so the signal stays quiet forever
        std::mem::forget(handle);
        Self {
            session_id: "detached-session".to_string(),
            trace_id: "detached-trace".to_string(),
            node: node.into(),
            action,
            attempt: 1,
            deadline: Instant::now() + std::time::Duration::from_secs(3600),
            cancel: signal,
            events: Arc::new(crate::event::NullEventSink),
        }
    }

    /// Deadline for this invocation; work past it will be abandoned
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The cooperative cancellation signal
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emit an `agent_progress` event
    pub fn emit_progress(&self, content: impl Into<String>, meta: Option<EventMeta>) {
        let mut meta = meta.unwrap_or_default();
        meta.content = Some(content.into());
        let event = EventEnvelope::new(
            EventKind::AgentProgress,
            self.session_id.clone(),
            self.trace_id.clone(),
        )
        .with_agent(self.node.clone())
        .with_action(self.action)
        .with_meta(meta);
        self.events.publish(event);
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("session_id", &self.session_id)
            .field("trace_id", &self.trace_id)
            .field("node", &self.node)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Result of a node invocation
#[derive(Debug)]
pub struct NodeOutput {
    /// Successor snapshot, produced via the mutator
    pub state: GraphState,
    /// Extra events to publish after the state is persisted
    pub events: Vec<EventEnvelope>,
}

impl NodeOutput {
    pub fn new(state: GraphState) -> Self {
        Self {
            state,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: EventEnvelope) -> Self {
        self.events.push(event);
        self
    }
}

impl From<GraphState> for NodeOutput {
    fn from(state: GraphState) -> Self {
        Self::new(state)
    }
}

/// The invocable unit of the graph
#[async_trait]
pub trait AgentNode: Send + Sync {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError>;
}

type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutput, NodeError>> + Send>>;
type NodeFn = dyn Fn(GraphState, CapabilityMap, NodeContext) -> NodeFuture + Send + Sync;

/// Closure-backed node for tests and lightweight wiring
pub struct FnNode {
    f: Arc<NodeFn>,
}

impl FnNode {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(GraphState, CapabilityMap, NodeContext) -> NodeFuture + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl AgentNode for FnNode {
    async fn invoke(
        &self,
        state: &GraphState,
        capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        (self.f)(state.clone(), capabilities.clone(), ctx.clone()).await
    }
}
