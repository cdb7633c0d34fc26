//! Session record and snapshot types
//!
//! A [`SessionRecord`] is the durable unit of the store: one conversation
//! identity plus a bounded ring of [`StateSnapshot`]s, TTL bookkeeping, and
//! the graph versions pinned by each turn. Snapshots carry the serialized
//! execution state as an opaque JSON payload so the store stays agnostic of
//! the state schema that produced it.
//!
//! # Ring semantics
//!
//! The history ring keeps the most recent `capacity` snapshots (default 32).
//! Appending beyond capacity drops the oldest entry; `latest_index` always
//! points at the newest one. Steps are monotonically non-decreasing within a
//! session, so "latest" and "highest step" coincide.
//!
//! # Forward compatibility
//!
//! Unknown fields read from a persisted record are captured in `extra` and
//! written back untouched, so records written by a newer schema survive a
//! round-trip through an older binary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current serialized layout version for [`SessionRecord`]
pub const SCHEMA_VERSION: u32 = 1;

/// Default number of snapshots retained per session
pub const DEFAULT_HISTORY_DEPTH: usize = 32;

/// A single persisted state snapshot
///
/// The `payload` is the serialized execution state; `step` and `status` are
/// duplicated out of it so the store can answer history queries without
/// deserializing the full state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    /// Step counter of the state at capture time
    pub step: u64,
    /// Turn status label at capture time (e.g. "processing", "completed")
    pub status: String,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Serialized state
    pub payload: Value,
}

impl StateSnapshot {
    /// Create a snapshot from an already-serialized state payload
    pub fn new(step: u64, status: impl Into<String>, payload: Value) -> Self {
        Self {
            step,
            status: status.into(),
            taken_at: Utc::now(),
            payload,
        }
    }
}

/// Durable record of one session: snapshot ring plus lifecycle metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Stable conversation identity
    pub session_id: String,
    /// Layout version of this record
    pub schema_version: u32,
    /// Bounded ring of snapshots, oldest first
    pub history: Vec<StateSnapshot>,
    /// Index of the newest snapshot in `history`
    pub latest_index: usize,
    /// Maximum snapshots retained
    pub capacity: usize,
    /// When the session was first seen
    pub created_at: DateTime<Utc>,
    /// Last write time; refreshed on every `put`
    pub last_active_at: DateTime<Utc>,
    /// Idle expiry deadline; refreshed on every `put`
    pub ttl_expires_at: DateTime<Utc>,
    /// Graph version pinned per turn, keyed by trace id
    #[serde(default)]
    pub graph_version_pins: Map<String, Value>,
    /// Unknown fields preserved across read/write cycles
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    /// Create an empty record with the given ring capacity and TTL
    pub fn new(session_id: impl Into<String>, capacity: usize, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            schema_version: SCHEMA_VERSION,
            history: Vec::with_capacity(capacity.min(DEFAULT_HISTORY_DEPTH)),
            latest_index: 0,
            capacity: capacity.max(1),
            created_at: now,
            last_active_at: now,
            ttl_expires_at: now + ttl,
            graph_version_pins: Map::new(),
            extra: Map::new(),
        }
    }

    /// Append a snapshot, evicting the oldest entry when the ring is full,
    /// and refresh the TTL deadline
    pub fn push(&mut self, snapshot: StateSnapshot, ttl: Duration) {
        if self.history.len() >= self.capacity {
            self.history.remove(0);
        }
        self.history.push(snapshot);
        self.latest_index = self.history.len() - 1;
        let now = Utc::now();
        self.last_active_at = now;
        self.ttl_expires_at = now + ttl;
    }

    /// The newest snapshot, if any
    pub fn latest(&self) -> Option<&StateSnapshot> {
        self.history.get(self.latest_index)
    }

    /// The snapshot captured at a specific step, if still in the ring
    ///
    /// When a step was checkpointed more than once (e.g. advance then node
    /// result), the last write for that step wins.
    pub fn at_step(&self, step: u64) -> Option<&StateSnapshot> {
        self.history.iter().rev().find(|s| s.step == step)
    }

    /// Pin the graph version used by a turn
    pub fn pin_graph_version(&mut self, trace_id: &str, version: u64) {
        self.graph_version_pins
            .insert(trace_id.to_string(), Value::from(version));
    }

    /// True once the idle TTL has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.ttl_expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ttl() -> Duration {
        Duration::minutes(30)
    }

    #[test]
    fn test_ring_eviction_keeps_latest() {
        let mut record = SessionRecord::new("s1", 3, ttl());
        for step in 0..5u64 {
            record.push(
                StateSnapshot::new(step, "processing", json!({"step": step})),
                ttl(),
            );
        }

        assert_eq!(record.history.len(), 3);
        assert_eq!(record.latest().unwrap().step, 4);
        // Oldest two were evicted
        assert!(record.at_step(0).is_none());
        assert!(record.at_step(1).is_none());
        assert_eq!(record.at_step(2).unwrap().step, 2);
    }

    #[test]
    fn test_at_step_prefers_last_write() {
        let mut record = SessionRecord::new("s1", 8, ttl());
        record.push(StateSnapshot::new(3, "processing", json!({"v": 1})), ttl());
        record.push(StateSnapshot::new(3, "processing", json!({"v": 2})), ttl());

        assert_eq!(record.at_step(3).unwrap().payload, json!({"v": 2}));
    }

    #[test]
    fn test_push_refreshes_ttl() {
        let mut record = SessionRecord::new("s1", 4, Duration::milliseconds(1));
        let first_deadline = record.ttl_expires_at;
        record.push(
            StateSnapshot::new(0, "processing", json!({})),
            Duration::minutes(30),
        );
        assert!(record.ttl_expires_at > first_deadline);
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "session_id": "s1",
            "schema_version": 1,
            "history": [],
            "latest_index": 0,
            "capacity": 4,
            "created_at": "2026-01-01T00:00:00Z",
            "last_active_at": "2026-01-01T00:00:00Z",
            "ttl_expires_at": "2026-01-01T00:30:00Z",
            "graph_version_pins": {},
            "future_field": {"nested": true}
        });

        let record: SessionRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.extra.get("future_field"), Some(&json!({"nested": true})));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out.get("future_field"), Some(&json!({"nested": true})));
    }

    #[test]
    fn test_graph_version_pins() {
        let mut record = SessionRecord::new("s1", 4, ttl());
        record.pin_graph_version("trace-1", 7);
        assert_eq!(record.graph_version_pins.get("trace-1"), Some(&json!(7)));
    }
}
