//! Event envelope and sink contract for real-time progress streaming
//!
//! Every observable step of a turn - node transitions, agent start/progress/
//! end, terminal state, errors - is an [`EventEnvelope`]. The runtime builds
//! envelopes and hands them to an [`EventSink`]; the broadcaster assigns the
//! per-session `sequence` and fans out to subscribers. Publishing is always
//! non-blocking for the producer.

use crate::action::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind discriminator for [`EventEnvelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First event a subscriber receives
    Connection,
    /// The loop moved from one node to another
    NodeTransition,
    /// A node invocation began (one per attempt)
    AgentStart,
    /// Free-form progress from inside a node
    AgentProgress,
    /// A node invocation finished (one per attempt)
    AgentEnd,
    /// Terminal state of a turn
    State,
    /// Replay of retained events on subscription
    History,
    /// Error or gap marker
    Error,
    /// Keep-alive reply
    Pong,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::NodeTransition => "node_transition",
            EventKind::AgentStart => "agent_start",
            EventKind::AgentProgress => "agent_progress",
            EventKind::AgentEnd => "agent_end",
            EventKind::State => "state",
            EventKind::History => "history",
            EventKind::Error => "error",
            EventKind::Pong => "pong",
        }
    }
}

/// Free-form enrichment fields; everything optional, omitted when absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventMeta {
    /// Short human-readable summary for UX surfaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Invocation attempt, starting at 1; present on retries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Delivery status carried on agent_end ("done", "failed", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Number of events dropped before this one (gap markers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<u64>,
}

/// One broadcast event
///
/// `sequence` is assigned by the broadcaster at publish time, per session,
/// starting at 0; producers leave it at the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub session_id: String,
    pub trace_id: String,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub meta: EventMeta,
}

impl EventEnvelope {
    /// New envelope with a fresh event id and timestamp
    pub fn new(kind: EventKind, session_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            trace_id: trace_id.into(),
            sequence: 0,
            kind,
            from_node: None,
            to_node: None,
            agent: None,
            action: Action::Other,
            timestamp: Utc::now(),
            data: Value::Null,
            meta: EventMeta::default(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_nodes(
        mut self,
        from_node: Option<impl Into<String>>,
        to_node: impl Into<String>,
    ) -> Self {
        self.from_node = from_node.map(Into::into);
        self.to_node = Some(to_node.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_meta(mut self, meta: EventMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Destination for runtime-produced events
///
/// Implementations must not block the caller; a slow consumer is the
/// implementation's problem (bounded queues, drop-oldest), never the
/// publisher's.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EventEnvelope);
}

/// Sink that discards everything (tests, headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: EventEnvelope) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serializes_as_type_field() {
        let event = EventEnvelope::new(EventKind::NodeTransition, "s1", "t1")
            .with_nodes(Some("intent"), "reasoning")
            .with_action(Action::ReasoningPlan);

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], json!("node_transition"));
        assert_eq!(wire["from_node"], json!("intent"));
        assert_eq!(wire["to_node"], json!("reasoning"));
        assert_eq!(wire["action"], json!("reasoning_plan"));
    }

    #[test]
    fn test_mandatory_fields_present() {
        let event = EventEnvelope::new(EventKind::AgentStart, "s1", "t1").with_agent("summary");
        let wire = serde_json::to_value(&event).unwrap();
        for field in ["event_id", "session_id", "sequence", "type", "timestamp"] {
            assert!(wire.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_empty_meta_serializes_empty() {
        let event = EventEnvelope::new(EventKind::Pong, "s1", "t1");
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["meta"], json!({}));
    }

    #[test]
    fn test_round_trip() {
        let mut event = EventEnvelope::new(EventKind::AgentEnd, "s1", "t1").with_agent("summary");
        event.meta.duration_ms = Some(12);
        event.meta.status = Some("done".to_string());

        let bytes = serde_json::to_vec(&event).unwrap();
        let restored: EventEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, restored);
    }
}
