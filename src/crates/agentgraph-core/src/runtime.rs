//! The execution loop - drives one turn from entry node to finalize
//!
//! [`TurnRuntime`] owns everything a turn needs: the pinned graph snapshot,
//! the session store, the event sink, the capability map, and the
//! cancellation table. One call to [`TurnRuntime::run_turn`] takes a user
//! message through the graph and returns a [`ResponseEnvelope`]; a paused
//! human-gate turn is completed later through [`TurnRuntime::resume`].
//!
//! # Loop shape
//!
//! ```text
//! load/create session -> begin turn (trace refreshed, graph version pinned)
//!   -> anti-repetition check (may short-circuit straight to finalize)
//!   -> while current != finalize:
//!        advance (mutator) -> persist -> node_transition event
//!        resolve descriptor (enabled? privileged?) -> agent_start
//!        invoke with deadline + cancellation + retry -> agent_end
//!        persist result -> route (conditional first, else first spec edge)
//!   -> finalize: append "finalize", status completed, persist, state event
//! ```
//!
//! # Failure discipline
//!
//! Anything fatal inside the loop (timeout, cancellation, unhandled node
//! error, routing dead end) routes the turn to finalize with
//! `status = failed` and a populated `meta.error` - the caller always gets a
//! structured envelope. Only infrastructure failures (checkpoint store,
//! serialization) escape as `Err`.
//!
//! # Ordering guarantees
//!
//! Within one session: node invocations are totally ordered, checkpoint
//! writes are totally ordered, and `step` is monotonic. Distinct sessions
//! share nothing but the store and the broadcaster.

use crate::action::Action;
use crate::envelope::{EnvelopeError, ResponseEnvelope};
use crate::error::{Result, RuntimeError};
use crate::event::{EventEnvelope, EventKind, EventMeta, EventSink};
use crate::graph::{Graph, NodeDescriptor, NodeKind, Privilege, RouteTarget, FINALIZE};
use crate::hash;
use crate::manager::GraphManager;
use crate::mutator::{StateField, StateMutator};
use crate::node::{CancelHandle, CancelSignal, CapabilityMap, FatalKind, NodeContext, NodeError, NodeOutput};
use crate::state::{GraphState, TurnStatus};
use agentgraph_checkpoint::{CheckpointError, SessionStore, StateSnapshot};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Fallback node for disabled agent nodes
const SMALLTALK: &str = "smalltalk";

/// Runtime tuning knobs (a subset of the orchestrator configuration)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Max wall time for a single turn
    pub turn_timeout_ms: u64,
    /// Default per-node deadline
    pub node_timeout_ms: u64,
    /// Cooperative wind-down window after cancellation or deadline
    pub grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            turn_timeout_ms: 60_000,
            node_timeout_ms: 15_000,
            grace_ms: 2_000,
        }
    }
}

/// Per-turn options supplied by the caller
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Privilege of the caller, checked against node descriptors
    pub privilege: Privilege,
    /// Skip the anti-repetition cache for this turn
    pub bypass_cache: bool,
    /// Route to this agent regardless of intent confidence
    pub force_route: Option<String>,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            privilege: Privilege::Standard,
            bypass_cache: false,
            force_route: None,
        }
    }
}

/// Outcome of one turn: the envelope plus its trace id
#[derive(Debug, Clone)]
pub struct TurnHandle {
    pub trace_id: String,
    pub session_id: String,
    pub envelope: ResponseEnvelope,
}

enum Invocation {
    Completed(std::result::Result<NodeOutput, NodeError>),
    TimedOut,
    Cancelled,
}

enum NodeOutcome {
    State(GraphState),
    Failed { kind: FatalKind, message: String },
}

/// Drives turns through the active graph
pub struct TurnRuntime {
    manager: Arc<GraphManager>,
    store: Arc<dyn SessionStore>,
    events: Arc<dyn EventSink>,
    capabilities: CapabilityMap,
    config: RuntimeConfig,
    mutator: StateMutator,
    cancellations: DashMap<String, CancelHandle>,
}

impl TurnRuntime {
    pub fn new(
        manager: Arc<GraphManager>,
        store: Arc<dyn SessionStore>,
        events: Arc<dyn EventSink>,
        capabilities: CapabilityMap,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            manager,
            store,
            events,
            capabilities,
            config,
            mutator: StateMutator::new(),
            cancellations: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one turn to completion (or to a human-gate pause)
    #[tracing::instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn run_turn(
        &self,
        session_id: Option<String>,
        user_message: &str,
        options: TurnOptions,
    ) -> Result<TurnHandle> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::Span::current().record("session_id", session_id.as_str());
        let trace_id = Uuid::new_v4().to_string();
        let graph = self.manager.current()?;
        let started = Instant::now();

        let previous = self.load_latest(&session_id).await?;
        let mut state = match &previous {
            Some(prev) => prev.begin_turn(&trace_id, user_message, graph.version()),
            None => {
                let mut state = GraphState::new(&session_id, &trace_id, user_message);
                state.status = TurnStatus::Processing;
                state.graph_version = graph.version();
                state
            }
        };

        let query_hash = hash::query_hash(user_message);
        let mut hashes = Map::new();
        hashes.insert("query_hash".to_string(), json!(query_hash));
        state = self.mutator.merge_mapping(&state, StateField::Hashes, hashes)?;

        if let Some(target) = &options.force_route {
            let mut meta = Map::new();
            meta.insert("force_route".to_string(), json!(target));
            state = self
                .mutator
                .merge_mapping(&state, StateField::ResponseMetadata, meta)?;
        }

        self.persist(&state).await?;
        self.store
            .pin_graph_version(&session_id, &trace_id, graph.version())
            .await?;

        // Anti-repetition: identical normalized query against a completed
        // turn with a cached result and no side-effecting nodes executed
        if !options.bypass_cache {
            if let Some(prev) = previous.as_ref().filter(|prev| {
                prev.status == TurnStatus::Completed
                    && prev.hashes.query_hash.as_deref() == Some(query_hash.as_str())
                    && prev.response_metadata.contains_key("result")
                    && !turn_had_side_effects(&graph, prev)
            }) {
                tracing::debug!(session_id = %session_id, "serving cached turn result");
                let envelope = self.serve_cached(state, prev, started).await?;
                return Ok(TurnHandle {
                    trace_id,
                    session_id,
                    envelope,
                });
            }
        }

        let (handle, signal) = CancelHandle::new();
        self.cancellations.insert(trace_id.clone(), handle);
        let result = self
            .drive(&graph, state, signal, started, &options, false)
            .await;
        self.cancellations.remove(&trace_id);

        result.map(|envelope| TurnHandle {
            trace_id,
            session_id,
            envelope,
        })
    }

    /// Complete a turn paused at a human gate
    ///
    /// Validates the resume token, applies the decision into
    /// `response_metadata.human_decision`, clears the gate fields, and
    /// re-enters the loop at the gated node (which observes the decision and
    /// routes onward). Tokens are single-use.
    #[tracing::instrument(skip(self, resume_token, decision))]
    pub async fn resume(
        &self,
        session_id: &str,
        resume_token: &str,
        decision: Value,
    ) -> Result<TurnHandle> {
        let started = Instant::now();
        let snapshot = match self.store.get_latest(session_id).await {
            Ok(snapshot) => snapshot,
            Err(CheckpointError::SessionNotFound(_)) => {
                return Err(RuntimeError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let state = GraphState::from_payload(&snapshot.payload)?;

        if state.status != TurnStatus::AwaitingHuman {
            return Err(RuntimeError::NotAwaitingHuman(session_id.to_string()));
        }
        if state.resume_token.as_deref() != Some(resume_token) {
            return Err(RuntimeError::ResumeTokenInvalid(session_id.to_string()));
        }

        let trace_id = state.trace_id.clone();
        let graph = self.manager.current()?;

        let mut state = self
            .mutator
            .set(&state, StateField::Status, json!("processing"))?;
        let mut meta = Map::new();
        meta.insert("human_decision".to_string(), decision);
        state = self
            .mutator
            .merge_mapping(&state, StateField::ResponseMetadata, meta)?;
        state = self
            .mutator
            .set(&state, StateField::HumanGateReason, Value::Null)?;
        state = self.mutator.set(&state, StateField::ResumeToken, Value::Null)?;
        self.persist(&state).await?;

        let options = TurnOptions::default();
        let (handle, signal) = CancelHandle::new();
        self.cancellations.insert(trace_id.clone(), handle);
        let result = self
            .drive(&graph, state, signal, started, &options, true)
            .await;
        self.cancellations.remove(&trace_id);

        result.map(|envelope| TurnHandle {
            trace_id,
            session_id: session_id.to_string(),
            envelope,
        })
    }

    /// Request cooperative cancellation of a running turn
    ///
    /// Returns `true` when a running turn acknowledged the request; `false`
    /// when no turn with this trace is active.
    pub fn cancel(&self, trace_id: &str) -> bool {
        match self.cancellations.get(trace_id) {
            Some(handle) => {
                handle.trigger();
                true
            }
            None => false,
        }
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<GraphState>> {
        match self.store.get_latest(session_id).await {
            Ok(snapshot) => Ok(Some(GraphState::from_payload(&snapshot.payload)?)),
            Err(CheckpointError::SessionNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, state: &GraphState) -> Result<()> {
        let snapshot = StateSnapshot::new(
            state.step,
            state.status.as_str(),
            state.to_payload()?,
        );
        self.store.put(&state.session_id, snapshot).await?;
        Ok(())
    }

    /// Serve a repeated query from the previous turn's cached result
    async fn serve_cached(
        &self,
        state: GraphState,
        prev: &GraphState,
        started: Instant,
    ) -> Result<ResponseEnvelope> {
        let mut state = self
            .mutator
            .set(&state, StateField::Intent, json!(prev.intent))?;
        state = self.mutator.set(
            &state,
            StateField::IntentConfidence,
            json!(prev.intent_confidence),
        )?;
        let mut meta = Map::new();
        meta.insert(
            "result".to_string(),
            prev.response_metadata
                .get("result")
                .cloned()
                .unwrap_or(Value::Null),
        );
        meta.insert("cached".to_string(), json!(true));
        state = self
            .mutator
            .merge_mapping(&state, StateField::ResponseMetadata, meta)?;

        state = self.mutator.advance(&state, FINALIZE)?;
        self.persist(&state).await?;
        self.emit_transition(&state, FINALIZE);
        self.finalize_turn(state, started).await
    }

    /// The loop proper. `resume_mode` skips the initial advance so the gated
    /// node is re-invoked without being double-counted.
    async fn drive(
        &self,
        graph: &Arc<Graph>,
        mut state: GraphState,
        cancel: CancelSignal,
        started: Instant,
        options: &TurnOptions,
        resume_mode: bool,
    ) -> Result<ResponseEnvelope> {
        let turn_deadline = started + Duration::from_millis(self.config.turn_timeout_ms);
        let mut current = if resume_mode {
            match state.current_node.clone() {
                Some(node) => node,
                None => graph.entry().to_string(),
            }
        } else {
            graph.entry().to_string()
        };
        let mut skip_advance = resume_mode;

        loop {
            // Resolve the node before stepping into it: a disabled or
            // vanished node is rerouted without ever appearing in
            // completed_nodes
            let descriptor = if current == FINALIZE {
                None
            } else {
                match graph.descriptor(&current) {
                    None => {
                        tracing::error!(node = %current, "routing target vanished from pinned graph");
                        state = self
                            .fail_routing(state, &current, "node not present in pinned graph")
                            .await?;
                        current = FINALIZE.to_string();
                        continue;
                    }
                    Some(descriptor) => {
                        // Live visibility check against the registry, not
                        // the pinned copy
                        if !self.manager.registry().is_enabled(&current) {
                            let fallback = match descriptor.kind {
                                NodeKind::Agent
                                    if graph.contains(SMALLTALK) && current != SMALLTALK =>
                                {
                                    SMALLTALK.to_string()
                                }
                                _ => FINALIZE.to_string(),
                            };
                            tracing::warn!(
                                node = %current,
                                fallback = %fallback,
                                "node disabled, rerouting"
                            );
                            current = fallback;
                            continue;
                        }
                        Some(descriptor.clone())
                    }
                }
            };

            if skip_advance {
                skip_advance = false;
            } else {
                state = self.mutator.advance(&state, &current)?;
                self.persist(&state).await?;
            }
            self.emit_transition(&state, &current);

            if current == FINALIZE {
                break;
            }
            let descriptor = descriptor.expect("non-terminal node resolved above");

            if Instant::now() >= turn_deadline {
                state = self
                    .fail_turn(state, FatalKind::Timeout, "turn deadline exceeded", &current)
                    .await?;
                current = FINALIZE.to_string();
                continue;
            }

            if descriptor.required_privilege > options.privilege {
                let message = format!(
                    "node '{}' requires {} privilege",
                    current,
                    descriptor.required_privilege.as_str()
                );
                state = self
                    .fail_turn(state, FatalKind::PrivilegeDenied, &message, &current)
                    .await?;
                current = FINALIZE.to_string();
                continue;
            }

            match self
                .invoke_node(&descriptor, &state, &cancel, turn_deadline)
                .await?
            {
                NodeOutcome::State(next_state) => {
                    state = next_state;
                    self.persist(&state).await?;

                    if state.status == TurnStatus::AwaitingHuman {
                        return self.pause_for_human(state, started).await;
                    }

                    match graph.next_after(&current, &state) {
                        Some(RouteTarget::Finalize) => current = FINALIZE.to_string(),
                        Some(RouteTarget::Node(next)) => {
                            if graph.contains(&next) {
                                current = next;
                            } else {
                                tracing::error!(
                                    node = %current,
                                    target = %next,
                                    "conditional routed to unknown node"
                                );
                                state = self
                                    .fail_routing(
                                        state,
                                        &current,
                                        &format!("routed to unknown node '{next}'"),
                                    )
                                    .await?;
                                current = FINALIZE.to_string();
                            }
                        }
                        None => {
                            tracing::error!(node = %current, "routing dead end");
                            state = self
                                .fail_routing(state, &current, "no outgoing route")
                                .await?;
                            current = FINALIZE.to_string();
                        }
                    }
                }
                NodeOutcome::Failed { kind, message } => {
                    state = self.fail_turn(state, kind, &message, &current).await?;
                    current = FINALIZE.to_string();
                }
            }
        }

        self.finalize_turn(state, started).await
    }

    /// Invoke one node with deadline, cancellation, and retry handling
    ///
    /// Every attempt emits its own `agent_start`/`agent_end` pair with the
    /// attempt number in the meta.
    async fn invoke_node(
        &self,
        descriptor: &NodeDescriptor,
        state: &GraphState,
        cancel: &CancelSignal,
        turn_deadline: Instant,
    ) -> Result<NodeOutcome> {
        let capabilities = self.capabilities.subset(&descriptor.required_capabilities);
        let action = Action::for_node(&descriptor.name);
        let node_timeout = Duration::from_millis(
            descriptor.timeout_ms.unwrap_or(self.config.node_timeout_ms),
        );
        let grace = Duration::from_millis(self.config.grace_ms);
        let target_agent = state
            .response_metadata
            .get("target_agent")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut attempt: u32 = 1;
        loop {
            let deadline = (Instant::now() + node_timeout).min(turn_deadline);
            let (node_handle, node_signal) = CancelHandle::new();
            let ctx = NodeContext::new(
                state.session_id.clone(),
                state.trace_id.clone(),
                descriptor.name.clone(),
                action,
                attempt,
                deadline,
                node_signal,
                self.events.clone(),
            );

            self.emit_agent_event(
                state,
                EventKind::AgentStart,
                &descriptor.name,
                action,
                EventMeta {
                    target_agent: target_agent.clone(),
                    attempt: Some(attempt),
                    ..EventMeta::default()
                },
            );

            let attempt_started = Instant::now();
            let invocation = {
                let fut = descriptor.implementation.invoke(state, &capabilities, &ctx);
                tokio::pin!(fut);
                tokio::select! {
                    result = &mut fut => Invocation::Completed(result),
                    _ = tokio::time::sleep_until(deadline) => {
                        // Deadline hit: trip the node-local cancel, allow a
                        // cooperative wind-down, then abandon the future
                        node_handle.trigger();
                        let _ = tokio::time::timeout(grace, &mut fut).await;
                        Invocation::TimedOut
                    }
                    _ = cancel.cancelled() => {
                        node_handle.trigger();
                        let _ = tokio::time::timeout(grace, &mut fut).await;
                        Invocation::Cancelled
                    }
                }
            };
            let duration_ms = attempt_started.elapsed().as_millis() as u64;

            match invocation {
                Invocation::Completed(Ok(output)) => {
                    if let Err(violation) = validate_output(descriptor, state, &output.state) {
                        self.emit_agent_end(state, descriptor, attempt, duration_ms, "failed");
                        return Ok(NodeOutcome::Failed {
                            kind: FatalKind::InvalidOutput,
                            message: violation,
                        });
                    }
                    let status = match output.state.status {
                        TurnStatus::AwaitingHuman => "awaiting_human",
                        _ => "done",
                    };
                    self.emit_agent_end(state, descriptor, attempt, duration_ms, status);
                    for event in output.events {
                        self.events.publish(event);
                    }
                    return Ok(NodeOutcome::State(output.state));
                }
                Invocation::Completed(Err(NodeError::Transient(message)))
                    if descriptor.retry.should_retry(attempt) =>
                {
                    tracing::warn!(
                        node = %descriptor.name,
                        attempt,
                        error = %message,
                        "transient failure, retrying"
                    );
                    self.emit_agent_end(state, descriptor, attempt, duration_ms, "failed");
                    tokio::time::sleep(descriptor.retry.calculate_delay(attempt - 1)).await;
                    attempt += 1;
                }
                Invocation::Completed(Err(error)) => {
                    let (kind, message) = match error {
                        NodeError::Transient(message) => (
                            FatalKind::Unhandled,
                            format!("retries exhausted: {message}"),
                        ),
                        NodeError::Fatal { kind, message } => (kind, message),
                        NodeError::State(e) => (FatalKind::InvalidOutput, e.to_string()),
                    };
                    let status = match kind {
                        FatalKind::Cancelled => "cancelled",
                        _ => "failed",
                    };
                    self.emit_agent_end(state, descriptor, attempt, duration_ms, status);
                    return Ok(NodeOutcome::Failed { kind, message });
                }
                Invocation::TimedOut => {
                    self.emit_agent_end(state, descriptor, attempt, duration_ms, "cancelled");
                    return Ok(NodeOutcome::Failed {
                        kind: FatalKind::Timeout,
                        message: format!(
                            "node '{}' exceeded its {}ms deadline",
                            descriptor.name,
                            node_timeout.as_millis()
                        ),
                    });
                }
                Invocation::Cancelled => {
                    self.emit_agent_end(state, descriptor, attempt, duration_ms, "cancelled");
                    return Ok(NodeOutcome::Failed {
                        kind: FatalKind::Cancelled,
                        message: "turn cancelled".to_string(),
                    });
                }
            }
        }
    }

    /// Mark the turn failed and stash the safe error description
    async fn fail_turn(
        &self,
        state: GraphState,
        kind: FatalKind,
        message: &str,
        node: &str,
    ) -> Result<GraphState> {
        let mut state = self
            .mutator
            .set(&state, StateField::Status, json!("failed"))?;
        let mut meta = Map::new();
        meta.insert(
            "error".to_string(),
            serde_json::to_value(EnvelopeError {
                kind: kind.as_str().to_string(),
                message: message.to_string(),
                node: Some(node.to_string()),
            })?,
        );
        state = self
            .mutator
            .merge_mapping(&state, StateField::ResponseMetadata, meta)?;
        self.persist(&state).await?;
        Ok(state)
    }

    async fn fail_routing(
        &self,
        state: GraphState,
        node: &str,
        message: &str,
    ) -> Result<GraphState> {
        let mut state = self
            .mutator
            .set(&state, StateField::Status, json!("failed"))?;
        let mut meta = Map::new();
        meta.insert(
            "error".to_string(),
            serde_json::to_value(EnvelopeError {
                kind: "routing".to_string(),
                message: message.to_string(),
                node: Some(node.to_string()),
            })?,
        );
        state = self
            .mutator
            .merge_mapping(&state, StateField::ResponseMetadata, meta)?;
        self.persist(&state).await?;
        Ok(state)
    }

    /// Return control to the caller while awaiting a human decision
    async fn pause_for_human(
        &self,
        state: GraphState,
        started: Instant,
    ) -> Result<ResponseEnvelope> {
        let token = Uuid::new_v4().to_string();
        let state = self
            .mutator
            .set(&state, StateField::ResumeToken, json!(token))?;
        self.persist(&state).await?;
        self.emit_state_event(&state);
        tracing::info!(
            session_id = %state.session_id,
            reason = state.human_gate_reason.as_deref().unwrap_or(""),
            "turn paused for human decision"
        );
        Ok(ResponseEnvelope::from_state(
            &state,
            started.elapsed().as_millis() as u64,
        ))
    }

    /// Terminal bookkeeping: completed_nodes ends with "finalize", status
    /// settles, the summary hash is refreshed, the final snapshot persists,
    /// and the terminal state event is emitted.
    async fn finalize_turn(
        &self,
        state: GraphState,
        started: Instant,
    ) -> Result<ResponseEnvelope> {
        let mut state = self
            .mutator
            .append(&state, StateField::CompletedNodes, json!(FINALIZE))?;

        if state.status != TurnStatus::Failed {
            state = self
                .mutator
                .set(&state, StateField::Status, json!("completed"))?;
        }

        if let Some(message) = state
            .response_metadata
            .get("result")
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
        {
            let mut hashes = Map::new();
            hashes.insert(
                "last_summary_hash".to_string(),
                json!(hash::content_hash(message)),
            );
            state = self
                .mutator
                .merge_mapping(&state, StateField::Hashes, hashes)?;
        }

        self.persist(&state).await?;
        self.emit_state_event(&state);

        let envelope =
            ResponseEnvelope::from_state(&state, started.elapsed().as_millis() as u64);
        tracing::info!(
            session_id = %state.session_id,
            trace_id = %state.trace_id,
            status = %state.status,
            steps = state.step,
            "turn finished"
        );
        Ok(envelope)
    }

    fn emit_transition(&self, state: &GraphState, to_node: &str) {
        let event = EventEnvelope::new(
            EventKind::NodeTransition,
            state.session_id.clone(),
            state.trace_id.clone(),
        )
        .with_nodes(state.previous_node.clone(), to_node)
        .with_action(Action::for_node(to_node));
        self.events.publish(event);
    }

    fn emit_agent_event(
        &self,
        state: &GraphState,
        kind: EventKind,
        node: &str,
        action: Action,
        meta: EventMeta,
    ) {
        let event = EventEnvelope::new(kind, state.session_id.clone(), state.trace_id.clone())
            .with_agent(node)
            .with_action(action)
            .with_meta(meta);
        self.events.publish(event);
    }

    fn emit_agent_end(
        &self,
        state: &GraphState,
        descriptor: &NodeDescriptor,
        attempt: u32,
        duration_ms: u64,
        status: &str,
    ) {
        self.emit_agent_event(
            state,
            EventKind::AgentEnd,
            &descriptor.name,
            Action::AgentEnd,
            EventMeta {
                duration_ms: Some(duration_ms),
                attempt: Some(attempt),
                status: Some(status.to_string()),
                ..EventMeta::default()
            },
        );
    }

    fn emit_state_event(&self, state: &GraphState) {
        let event = EventEnvelope::new(
            EventKind::State,
            state.session_id.clone(),
            state.trace_id.clone(),
        )
        .with_action(Action::Finalize)
        .with_data(json!({
            "status": state.status.as_str(),
            "step": state.step,
            "completed_nodes": state.completed_nodes,
        }));
        self.events.publish(event);
    }
}

/// True when any node the previous turn completed is side-effecting
fn turn_had_side_effects(graph: &Graph, prev: &GraphState) -> bool {
    prev.completed_nodes
        .iter()
        .any(|n| graph.descriptor(n).is_some_and(|d| d.side_effecting))
}

/// Enforce the node's output contract
///
/// Identity and loop-owned fields may never change; when the descriptor
/// declares outputs, every other changed field must be declared. Status and
/// gate fields are always writable (that is how a node requests a pause).
/// An empty declaration means unrestricted writes.
fn validate_output(
    descriptor: &NodeDescriptor,
    before: &GraphState,
    after: &GraphState,
) -> std::result::Result<(), String> {
    if after.session_id != before.session_id
        || after.trace_id != before.trace_id
        || after.graph_version != before.graph_version
    {
        return Err("node altered state identity fields".to_string());
    }
    if after.step != before.step
        || after.current_node != before.current_node
        || after.previous_node != before.previous_node
        || after.completed_nodes != before.completed_nodes
    {
        return Err("node altered loop-owned progress fields".to_string());
    }
    if let Err(e) = after.validate() {
        return Err(e.to_string());
    }

    if descriptor.declared_outputs.is_empty() {
        return Ok(());
    }

    let declared = |field: StateField| descriptor.declared_outputs.contains(&field);
    let mut violations = Vec::new();
    if after.user_message != before.user_message && !declared(StateField::UserMessage) {
        violations.push(StateField::UserMessage);
    }
    if after.intent != before.intent && !declared(StateField::Intent) {
        violations.push(StateField::Intent);
    }
    if after.intent_confidence != before.intent_confidence
        && !declared(StateField::IntentConfidence)
    {
        violations.push(StateField::IntentConfidence);
    }
    if after.plan != before.plan && !declared(StateField::Plan) {
        violations.push(StateField::Plan);
    }
    if after.routing_decision != before.routing_decision && !declared(StateField::RoutingDecision)
    {
        violations.push(StateField::RoutingDecision);
    }
    if after.pending_tasks != before.pending_tasks && !declared(StateField::PendingTasks) {
        violations.push(StateField::PendingTasks);
    }
    if after.agent_results != before.agent_results && !declared(StateField::AgentResults) {
        violations.push(StateField::AgentResults);
    }
    if after.response_metadata != before.response_metadata
        && !declared(StateField::ResponseMetadata)
    {
        violations.push(StateField::ResponseMetadata);
    }
    if after.hashes != before.hashes && !declared(StateField::Hashes) {
        violations.push(StateField::Hashes);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "node wrote undeclared fields: {}",
            violations
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}
