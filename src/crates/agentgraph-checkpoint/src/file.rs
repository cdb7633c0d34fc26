//! File-backed session store for single-host deployments
//!
//! Persists one JSON record per session under a base directory, surviving
//! process restarts. Writes go to a temporary sibling file first and are
//! renamed into place, so a crash mid-write never leaves a truncated record
//! behind. Read-modify-write cycles for one session serialize on a
//! per-session async mutex; distinct sessions only share the directory.
//!
//! JSON is the only on-disk encoding: snapshot payloads are free-form JSON
//! values, which a non-self-describing format could not round-trip.

use crate::error::{CheckpointError, Result};
use crate::record::{SessionRecord, StateSnapshot};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::{SessionStore, SessionStream};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const RECORD_EXTENSION: &str = "json";

/// Session store persisting each record to its own file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_dir: PathBuf,
    capacity: usize,
    ttl: Duration,
    /// Per-session write locks; entries are created lazily and never removed
    /// while the store lives (session ids are bounded by the sweep cycle)
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FileSessionStore {
    /// Open (creating if needed) a store rooted at `base_dir`
    pub async fn open(
        base_dir: impl AsRef<Path>,
        capacity: usize,
        ttl: Duration,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            capacity,
            ttl,
            locks: Arc::new(DashMap::new()),
        })
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Map a session id to a filesystem-safe file name. Characters outside
    /// `[A-Za-z0-9._-]` are replaced; ids that differ only in such
    /// characters must not be mixed within one store.
    fn path_for(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.base_dir.join(format!("{safe}.{RECORD_EXTENSION}"))
    }

    async fn read_record(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.path_for(session_id);
        match tokio::fs::read(&path).await {
            Ok(data) => JsonSerializer::new().loads(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckpointError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: temp file in the same directory, then rename
    async fn write_record(&self, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(&record.session_id);
        let tmp = path.with_extension("tmp");
        let data = JsonSerializer::new().dumps(record)?;
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let suffix = format!(".{RECORD_EXTENSION}");
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
            {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn put(&self, session_id: &str, snapshot: StateSnapshot) -> Result<u64> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let step = snapshot.step;
        let mut record = match self.read_record(session_id).await {
            Ok(record) => record,
            Err(CheckpointError::SessionNotFound(_)) => {
                SessionRecord::new(session_id, self.capacity, self.ttl)
            }
            Err(e) => return Err(e),
        };
        record.push(snapshot, self.ttl);
        self.write_record(&record).await?;
        Ok(step)
    }

    async fn get_latest(&self, session_id: &str) -> Result<StateSnapshot> {
        let record = self.read_record(session_id).await?;
        record
            .latest()
            .cloned()
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))
    }

    async fn get_at(&self, session_id: &str, step: u64) -> Result<StateSnapshot> {
        let record = self.read_record(session_id).await?;
        record
            .at_step(step)
            .cloned()
            .ok_or_else(|| CheckpointError::SnapshotNotFound {
                session_id: session_id.to_string(),
                step,
            })
    }

    async fn get_record(&self, session_id: &str) -> Result<SessionRecord> {
        self.read_record(session_id).await
    }

    async fn pin_graph_version(
        &self,
        session_id: &str,
        trace_id: &str,
        version: u64,
    ) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut record = self.read_record(session_id).await?;
        record.pin_graph_version(trace_id, version);
        self.write_record(&record).await
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut swept = Vec::new();
        for path in self.record_paths().await? {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                // Removed or replaced since the directory scan
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let record: SessionRecord = JsonSerializer::new().loads(&data)?;
            if !record.is_expired(now) {
                continue;
            }
            let lock = self.lock_for(&record.session_id);
            let _guard = lock.lock().await;
            // Re-read under the lock: a concurrent put may have refreshed
            // the TTL since the scan.
            match self.read_record(&record.session_id).await {
                Ok(current) if current.is_expired(now) => {
                    tokio::fs::remove_file(&path).await.ok();
                    tracing::debug!(session_id = %record.session_id, "swept expired session");
                    swept.push(record.session_id);
                }
                _ => {}
            }
        }
        Ok(swept)
    }

    async fn list(&self) -> Result<SessionStream> {
        let mut records = Vec::new();
        for path in self.record_paths().await? {
            match tokio::fs::read(&path).await {
                Ok(data) => records.push(JsonSerializer::new().loads(&data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Box::pin(stream::iter(records)))
    }

    async fn session_count(&self) -> usize {
        self.record_paths().await.map(|p| p.len()).unwrap_or(0)
    }
}
