//! Execution state carried through the graph
//!
//! [`GraphState`] is the immutable-by-convention record every node receives
//! and every node returns a successor of. Nodes never mutate a received
//! snapshot in place; all writes go through the
//! [`StateMutator`](crate::mutator::StateMutator), which validates the field
//! and the value shape and returns a fresh snapshot. That single write path
//! is what makes checkpointing and per-turn hashing auditable.
//!
//! # Overview
//!
//! One `GraphState` describes one *turn* of one *session*:
//!
//! - **Identity**: `session_id` (stable across turns), `trace_id` (unique per
//!   turn), `graph_version` (pinned at turn start).
//! - **Input**: `user_message`, classified into `intent` with
//!   `intent_confidence`.
//! - **Work**: `plan`, `pending_tasks`, `routing_decision`,
//!   `agent_results` (insertion-ordered), `response_metadata`.
//! - **Progress**: `current_node`, `previous_node`, `completed_nodes`,
//!   `step`, `status`.
//! - **Dedup**: `hashes.query_hash` / `hashes.last_summary_hash` suppress
//!   repeated work within a session.
//!
//! # Invariants
//!
//! - `step` never decreases within a session.
//! - `completed_nodes` grows monotonically within a turn and is cleared only
//!   when a new turn begins.
//! - `status == AwaitingHuman` requires a non-empty `human_gate_reason`
//!   (checked by [`GraphState::validate`]).
//!
//! # Serialization
//!
//! The struct round-trips through JSON byte-identically
//! (`serialize -> deserialize -> serialize`); mapping fields preserve
//! insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by state construction and mutation
#[derive(Debug, Error)]
pub enum StateError {
    /// Write targeted a field that is not part of the state schema
    #[error("Unknown state field: {0}")]
    InvalidField(String),

    /// Value did not match the declared shape of the field
    #[error("Type mismatch for field '{field}': expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    /// A structural invariant was violated
    #[error("State invariant violated: {0}")]
    InvariantViolated(String),
}

/// Classified purpose of a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Summary,
    Branch,
    Anomaly,
    Document,
    Database,
    News,
    Smalltalk,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Summary => "summary",
            Intent::Branch => "branch",
            Intent::Anomaly => "anomaly",
            Intent::Document => "document",
            Intent::Database => "database",
            Intent::News => "news",
            Intent::Smalltalk => "smalltalk",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    #[default]
    Initialized,
    Processing,
    AwaitingHuman,
    Completed,
    Failed,
    Paused,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Initialized => "initialized",
            TurnStatus::Processing => "processing",
            TurnStatus::AwaitingHuman => "awaiting_human",
            TurnStatus::Completed => "completed",
            TurnStatus::Failed => "failed",
            TurnStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a queued unit of agent work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

/// One step of the plan produced by the reasoning node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub target_agent: String,
    pub expected_output: String,
}

/// One queued unit of agent work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub agent: String,
    pub payload: Value,
    pub status: TaskStatus,
}

/// Dedup hashes scoped to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateHashes {
    /// Hash of the normalized user message of the current turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_hash: Option<String>,
    /// Hash of the last assembled summary message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_summary_hash: Option<String>,
}

/// The execution context carried through the graph
///
/// See the [module documentation](self) for field semantics and invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub session_id: String,
    pub trace_id: String,
    pub user_message: String,
    pub intent: Intent,
    pub intent_confidence: f64,
    pub plan: Vec<PlanStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_decision: Option<String>,
    pub pending_tasks: Vec<TaskItem>,
    pub agent_results: Map<String, Value>,
    pub response_metadata: Map<String, Value>,
    pub completed_nodes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_node: Option<String>,
    pub status: TurnStatus,
    pub step: u64,
    pub hashes: StateHashes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_gate_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    pub graph_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphState {
    /// Fresh state for a brand-new session
    pub fn new(
        session_id: impl Into<String>,
        trace_id: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            trace_id: trace_id.into(),
            user_message: user_message.into(),
            intent: Intent::Unknown,
            intent_confidence: 0.0,
            plan: Vec::new(),
            routing_decision: None,
            pending_tasks: Vec::new(),
            agent_results: Map::new(),
            response_metadata: Map::new(),
            completed_nodes: Vec::new(),
            current_node: None,
            previous_node: None,
            status: TurnStatus::Initialized,
            step: 0,
            hashes: StateHashes::default(),
            human_gate_reason: None,
            resume_token: None,
            graph_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Successor state for a new turn in an existing session
    ///
    /// Keeps the session identity, `step` counter, and dedup hashes of the
    /// previous state; resets everything that is per-turn (`completed_nodes`,
    /// plan, tasks, results, routing, gate fields).
    pub fn begin_turn(
        &self,
        trace_id: impl Into<String>,
        user_message: impl Into<String>,
        graph_version: u64,
    ) -> Self {
        let mut next = Self::new(self.session_id.clone(), trace_id, user_message);
        next.step = self.step;
        next.hashes = self.hashes.clone();
        next.created_at = self.created_at;
        next.status = TurnStatus::Processing;
        next.graph_version = graph_version;
        next
    }

    /// Check structural invariants after a node returned this state
    pub fn validate(&self) -> Result<(), StateError> {
        if self.status == TurnStatus::AwaitingHuman
            && self
                .human_gate_reason
                .as_deref()
                .map_or(true, |r| r.is_empty())
        {
            return Err(StateError::InvariantViolated(
                "awaiting_human requires a non-empty human_gate_reason".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.intent_confidence) {
            return Err(StateError::InvariantViolated(format!(
                "intent_confidence {} outside [0, 1]",
                self.intent_confidence
            )));
        }
        Ok(())
    }

    /// Serialize for checkpointing
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Restore from a checkpoint payload
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}
