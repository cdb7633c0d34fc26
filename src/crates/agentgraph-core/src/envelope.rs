//! The structured response returned at end-of-turn
//!
//! Downstream UIs consume the envelope without string parsing: numbers live
//! in `data.metrics` under stable keys, per-agent payloads in
//! `data.agent_results`, trace metadata in `meta`. A failed turn still
//! yields a well-formed envelope with `meta.error` populated - errors are
//! never silently swallowed into prose.

use crate::state::{GraphState, Intent, PlanStep, TurnStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of the turn as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Ok,
    Failed,
    AwaitingHuman,
}

/// Safe description of what aborted a failed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    /// Stable kind label ("timeout", "unhandled", "routing", ...)
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// Gate details on an `awaiting_human` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanGateInfo {
    pub reason: String,
    pub resume_token: String,
}

/// Structured result payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnvelopeData {
    /// Human-readable summary
    pub message: String,
    /// Structured numbers under stable keys
    pub metrics: Map<String, Value>,
    /// Plan the turn executed (may be empty)
    pub plan: Vec<PlanStep>,
    /// Per-agent structured results, insertion-ordered
    pub agent_results: Map<String, Value>,
}

/// Trace metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub completed_nodes: Vec<String>,
    pub duration_ms: u64,
    pub graph_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_gate: Option<HumanGateInfo>,
}

/// The end-of-turn response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub trace_id: String,
    pub session_id: String,
    pub status: EnvelopeStatus,
    pub intent: Intent,
    pub data: EnvelopeData,
    pub meta: EnvelopeMeta,
}

impl ResponseEnvelope {
    /// Build an envelope from a terminal state snapshot
    ///
    /// `data` is read from `response_metadata.result` (written by the
    /// assemble node): `message` and `metrics` come from there,
    /// `agent_results` and `plan` from the state itself.
    pub fn from_state(state: &GraphState, duration_ms: u64) -> Self {
        let result = state
            .response_metadata
            .get("result")
            .and_then(Value::as_object);

        let message = result
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metrics = result
            .and_then(|r| r.get("metrics"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let status = match state.status {
            TurnStatus::AwaitingHuman => EnvelopeStatus::AwaitingHuman,
            TurnStatus::Failed => EnvelopeStatus::Failed,
            _ => EnvelopeStatus::Ok,
        };

        let error = state
            .response_metadata
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok());

        let human_gate = match (&state.human_gate_reason, &state.resume_token) {
            (Some(reason), Some(token)) if state.status == TurnStatus::AwaitingHuman => {
                Some(HumanGateInfo {
                    reason: reason.clone(),
                    resume_token: token.clone(),
                })
            }
            _ => None,
        };

        Self {
            trace_id: state.trace_id.clone(),
            session_id: state.session_id.clone(),
            status,
            intent: state.intent,
            data: EnvelopeData {
                message,
                metrics,
                plan: state.plan.clone(),
                agent_results: state.agent_results.clone(),
            },
            meta: EnvelopeMeta {
                completed_nodes: state.completed_nodes.clone(),
                duration_ms,
                graph_version: state.graph_version,
                error,
                human_gate,
            },
        }
    }
}
