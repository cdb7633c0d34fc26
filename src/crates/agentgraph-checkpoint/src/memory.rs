//! In-memory session store for development and testing
//!
//! Reference implementation of [`SessionStore`] backed by a [`DashMap`].
//! Per-session write serialization falls out of the map's per-entry locking:
//! a `put` mutates the record while holding its entry, so writes to one
//! session are totally ordered while distinct sessions proceed on separate
//! shards. Data is ephemeral - gone on process exit - which is exactly what
//! tests want and production does not.

use crate::error::{CheckpointError, Result};
use crate::record::{SessionRecord, StateSnapshot};
use crate::traits::{SessionStore, SessionStream};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::stream;
use std::sync::Arc;

/// Thread-safe in-memory session store
///
/// Cheap to clone; clones share the same underlying map.
///
/// # Example
///
/// ```rust
/// use agentgraph_checkpoint::{InMemorySessionStore, SessionStore, StateSnapshot};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemorySessionStore::new(32, chrono::Duration::minutes(30));
///     store.put("session-1", StateSnapshot::new(0, "processing", json!({}))).await?;
///     assert_eq!(store.get_latest("session-1").await?.step, 0);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, SessionRecord>>,
    capacity: usize,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a store retaining `capacity` snapshots per session with the
    /// given idle TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Total snapshots across all sessions (diagnostics)
    pub fn snapshot_count(&self) -> usize {
        self.sessions.iter().map(|e| e.value().history.len()).sum()
    }

    /// Drop everything (test isolation)
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(crate::record::DEFAULT_HISTORY_DEPTH, Duration::minutes(30))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session_id: &str, snapshot: StateSnapshot) -> Result<u64> {
        let step = snapshot.step;
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id, self.capacity, self.ttl));
        entry.push(snapshot, self.ttl);
        Ok(step)
    }

    async fn get_latest(&self, session_id: &str) -> Result<StateSnapshot> {
        self.sessions
            .get(session_id)
            .and_then(|r| r.latest().cloned())
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))
    }

    async fn get_at(&self, session_id: &str, step: u64) -> Result<StateSnapshot> {
        let record = self
            .sessions
            .get(session_id)
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;
        record
            .at_step(step)
            .cloned()
            .ok_or_else(|| CheckpointError::SnapshotNotFound {
                session_id: session_id.to_string(),
                step,
            })
    }

    async fn get_record(&self, session_id: &str) -> Result<SessionRecord> {
        self.sessions
            .get(session_id)
            .map(|r| r.clone())
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))
    }

    async fn pin_graph_version(
        &self,
        session_id: &str,
        trace_id: &str,
        version: u64,
    ) -> Result<()> {
        let mut record = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;
        record.pin_graph_version(trace_id, version);
        Ok(())
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        let mut swept = Vec::with_capacity(expired.len());
        for session_id in expired {
            // Re-check under the entry lock: a concurrent put may have
            // refreshed the TTL since the scan.
            if let Some(entry) = self.sessions.get(&session_id) {
                if !entry.value().is_expired(now) {
                    continue;
                }
            }
            if self.sessions.remove(&session_id).is_some() {
                tracing::debug!(session_id = %session_id, "swept expired session");
                swept.push(session_id);
            }
        }
        Ok(swept)
    }

    async fn list(&self) -> Result<SessionStream> {
        let records: Vec<Result<SessionRecord>> = self
            .sessions
            .iter()
            .map(|e| Ok(e.value().clone()))
            .collect();
        Ok(Box::pin(stream::iter(records)))
    }

    async fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(4, Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_put_and_get_latest() {
        let store = store();
        store
            .put("s1", StateSnapshot::new(0, "processing", json!({"n": 0})))
            .await
            .unwrap();
        store
            .put("s1", StateSnapshot::new(1, "processing", json!({"n": 1})))
            .await
            .unwrap();

        let latest = store.get_latest("s1").await.unwrap();
        assert_eq!(latest.step, 1);
        assert_eq!(latest.payload, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_get_at_step() {
        let store = store();
        for step in 0..3u64 {
            store
                .put("s1", StateSnapshot::new(step, "processing", json!({"n": step})))
                .await
                .unwrap();
        }

        assert_eq!(store.get_at("s1", 1).await.unwrap().payload, json!({"n": 1}));
        assert!(matches!(
            store.get_at("s1", 9).await,
            Err(CheckpointError::SnapshotNotFound { step: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = store();
        assert!(matches!(
            store.get_latest("nope").await,
            Err(CheckpointError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = store();
        store
            .put("s1", StateSnapshot::new(0, "processing", json!({})))
            .await
            .unwrap();
        store.close("s1").await.unwrap();
        store.close("s1").await.unwrap();
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = InMemorySessionStore::new(4, Duration::milliseconds(-1));
        store
            .put("stale", StateSnapshot::new(0, "completed", json!({})))
            .await
            .unwrap();

        let live_store = InMemorySessionStore {
            sessions: store.sessions.clone(),
            capacity: 4,
            ttl: Duration::minutes(30),
        };
        live_store
            .put("live", StateSnapshot::new(0, "processing", json!({})))
            .await
            .unwrap();

        let swept = store.sweep(Utc::now()).await.unwrap();
        assert_eq!(swept, vec!["stale".to_string()]);
        assert!(store.get_latest("live").await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = store();
        store
            .put("a", StateSnapshot::new(0, "processing", json!({"s": "a"})))
            .await
            .unwrap();
        store
            .put("b", StateSnapshot::new(5, "processing", json!({"s": "b"})))
            .await
            .unwrap();

        assert_eq!(store.get_latest("a").await.unwrap().step, 0);
        assert_eq!(store.get_latest("b").await.unwrap().step, 5);
    }

    #[tokio::test]
    async fn test_concurrent_writes_total_order() {
        let store = InMemorySessionStore::new(64, Duration::minutes(30));
        let mut handles = Vec::new();
        for step in 0..32u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put("s1", StateSnapshot::new(step, "processing", json!({"n": step})))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get_record("s1").await.unwrap();
        assert_eq!(record.history.len(), 32);
        // Latest index always points at the last acknowledged write
        assert_eq!(record.latest_index, record.history.len() - 1);
    }

    #[tokio::test]
    async fn test_list_streams_all_records() {
        let store = store();
        store
            .put("a", StateSnapshot::new(0, "processing", json!({})))
            .await
            .unwrap();
        store
            .put("b", StateSnapshot::new(0, "processing", json!({})))
            .await
            .unwrap();

        let records: Vec<_> = store.list().await.unwrap().collect().await;
        assert_eq!(records.len(), 2);
    }
}
