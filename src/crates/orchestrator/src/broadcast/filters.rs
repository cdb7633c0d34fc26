//! Event filtering for selective subscription
//!
//! A subscriber either follows one session or subscribes globally, and may
//! additionally narrow by event kind. An empty filter matches everything.

use agentgraph_core::{EventEnvelope, EventKind};
use std::collections::HashSet;

/// Filter criteria attached to a subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events for this session (None = all sessions)
    pub session_id: Option<String>,
    /// Only these kinds (empty = all kinds)
    pub kinds: HashSet<EventKind>,
}

impl EventFilter {
    /// Matches every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches one session's events
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            kinds: HashSet::new(),
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Whether an event passes this filter
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        if let Some(session_id) = &self.session_id {
            if &event.session_id != session_id {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        true
    }
}
