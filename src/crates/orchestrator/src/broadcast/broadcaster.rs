//! Event broadcaster - multiplexes runtime events to subscribers
//!
//! Guarantees, in order of importance:
//!
//! - **Publishers never block.** Enqueueing to a subscriber is a short lock
//!   on that subscriber's queue; a full queue drops its oldest entry.
//! - **Per-session ordering.** `sequence` is assigned under a per-session
//!   lock, so every subscriber observes a session's events in strictly
//!   increasing sequence order, modulo explicit gap markers.
//! - **Bounded memory.** Subscriber queues are capped at `buffer` entries
//!   (drop-oldest, `dropped_count` incremented, a single gap marker emitted
//!   on the next non-dropping enqueue); per-session history is capped at
//!   `history_depth` events for replay.
//!
//! New subscribers receive one `connection` event, then one `history` event
//! carrying the retained events matching their filter, then the live stream.

use crate::broadcast::filters::EventFilter;
use agentgraph_core::{Action, EventEnvelope, EventKind, EventSink};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Queue state guarded by one lock per subscriber
struct QueueState {
    items: VecDeque<EventEnvelope>,
    /// Events dropped since the last gap marker was enqueued
    gap: u64,
}

struct Subscriber {
    filter: EventFilter,
    queue: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

/// Receiving side of a subscription
///
/// Dropping the handle does not unsubscribe; call
/// [`EventBroadcaster::unsubscribe`] (idempotent).
pub struct SubscriptionHandle {
    id: String,
    queue: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event, waiting if the queue is empty.
    ///
    /// Returns `None` once the subscription is closed and drained.
    pub async fn recv(&self) -> Option<EventEnvelope> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Next event if one is queued
    pub fn try_recv(&self) -> Option<EventEnvelope> {
        self.queue.lock().items.pop_front()
    }

    /// Number of currently queued events
    pub fn queue_len(&self) -> usize {
        self.queue.lock().items.len()
    }

    /// Total events dropped on this subscription
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("queue_len", &self.queue_len())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

/// Fan-out hub implementing [`EventSink`]
pub struct EventBroadcaster {
    subscribers: DashMap<String, Subscriber>,
    session_seq: DashMap<String, Arc<Mutex<u64>>>,
    history: DashMap<String, Arc<Mutex<VecDeque<EventEnvelope>>>>,
    buffer: usize,
    history_depth: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given subscriber queue capacity and
    /// per-session history depth
    pub fn new(buffer: usize, history_depth: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            session_seq: DashMap::new(),
            history: DashMap::new(),
            buffer: buffer.max(1),
            history_depth,
        }
    }

    /// Register a subscriber; delivers `connection` then `history`, then the
    /// live stream
    pub fn subscribe(&self, filter: EventFilter) -> SubscriptionHandle {
        let id = Uuid::new_v4().to_string();
        let subscriber = Subscriber {
            filter: filter.clone(),
            queue: Arc::new(Mutex::new(QueueState {
                items: VecDeque::with_capacity(self.buffer.min(64)),
                gap: 0,
            })),
            notify: Arc::new(Notify::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let handle = SubscriptionHandle {
            id: id.clone(),
            queue: subscriber.queue.clone(),
            notify: subscriber.notify.clone(),
            dropped: subscriber.dropped.clone(),
            closed: subscriber.closed.clone(),
        };

        let session_label = filter.session_id.clone().unwrap_or_default();
        let connection = EventEnvelope::new(EventKind::Connection, session_label.clone(), "")
            .with_data(json!({"subscriber_id": id}));
        let replay = self.replay_for(&filter);
        let history = EventEnvelope::new(EventKind::History, session_label, "")
            .with_data(json!({ "events": replay }));

        {
            let mut queue = subscriber.queue.lock();
            queue.items.push_back(connection);
            queue.items.push_back(history);
        }
        subscriber.notify.notify_waiters();

        tracing::debug!(subscriber_id = %id, "subscriber attached");
        self.subscribers.insert(id, subscriber);
        handle
    }

    /// Remove a subscriber and drain its queue. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some((_, subscriber)) = self.subscribers.remove(&handle.id) {
            subscriber.closed.store(true, Ordering::Release);
            subscriber.queue.lock().items.clear();
            subscriber.notify.notify_waiters();
            tracing::debug!(subscriber_id = %handle.id, "subscriber detached");
        }
    }

    /// Answer a keep-alive ping on one subscription
    pub fn pong(&self, handle: &SubscriptionHandle) {
        if let Some(subscriber) = self.subscribers.get(&handle.id) {
            let event = EventEnvelope::new(EventKind::Pong, "", "");
            enqueue(&subscriber, event, self.buffer);
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Retained events matching a filter, oldest first
    fn replay_for(&self, filter: &EventFilter) -> Vec<EventEnvelope> {
        match &filter.session_id {
            Some(session_id) => self
                .history
                .get(session_id)
                .map(|ring| {
                    ring.lock()
                        .iter()
                        .filter(|e| filter.matches(e))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => {
                let mut events: Vec<EventEnvelope> = self
                    .history
                    .iter()
                    .flat_map(|ring| {
                        ring.value()
                            .lock()
                            .iter()
                            .filter(|e| filter.matches(e))
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .collect();
                events.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then(a.sequence.cmp(&b.sequence))
                });
                events
            }
        }
    }
}

impl EventSink for EventBroadcaster {
    fn publish(&self, mut event: EventEnvelope) {
        // Sequence assignment and history append happen under the session
        // lock so replay order always matches live order
        {
            let seq = self
                .session_seq
                .entry(event.session_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(0)))
                .clone();
            let mut seq = seq.lock();
            event.sequence = *seq;
            *seq += 1;

            if self.history_depth > 0 {
                let ring = self
                    .history
                    .entry(event.session_id.clone())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(VecDeque::with_capacity(self.history_depth)))
                    })
                    .clone();
                let mut ring = ring.lock();
                if ring.len() >= self.history_depth {
                    ring.pop_front();
                }
                ring.push_back(event.clone());
            }
        }

        for subscriber in self.subscribers.iter() {
            if !subscriber.filter.matches(&event) {
                continue;
            }
            enqueue(&subscriber, event.clone(), self.buffer);
        }
    }
}

/// Enqueue with drop-oldest and deferred gap marking
fn enqueue(subscriber: &Subscriber, event: EventEnvelope, capacity: usize) {
    if subscriber.closed.load(Ordering::Acquire) {
        return;
    }
    {
        let mut queue = subscriber.queue.lock();
        if queue.items.len() >= capacity {
            queue.items.pop_front();
            queue.gap += 1;
            subscriber.dropped.fetch_add(1, Ordering::Relaxed);
        } else if queue.gap > 0 && queue.items.len() + 1 < capacity {
            // First non-dropping enqueue after a gap: tell the subscriber
            // how much it missed
            let marker = EventEnvelope::new(
                EventKind::Error,
                event.session_id.clone(),
                event.trace_id.clone(),
            )
            .with_action(Action::Other)
            .with_data(json!({"reason": "subscriber_lagging"}))
            .with_meta(agentgraph_core::EventMeta {
                dropped: Some(queue.gap),
                content: Some(format!("{} events dropped", queue.gap)),
                ..Default::default()
            });
            queue.gap = 0;
            queue.items.push_back(marker);
        }
        queue.items.push_back(event);
    }
    subscriber.notify.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(session: &str, kind: EventKind) -> EventEnvelope {
        EventEnvelope::new(kind, session, "t1")
    }

    #[test]
    fn test_connection_then_history_on_subscribe() {
        let broadcaster = EventBroadcaster::new(16, 100);
        broadcaster.publish(event("s1", EventKind::State));

        let handle = broadcaster.subscribe(EventFilter::session("s1"));
        let first = handle.try_recv().unwrap();
        assert_eq!(first.kind, EventKind::Connection);
        let second = handle.try_recv().unwrap();
        assert_eq!(second.kind, EventKind::History);
        let replayed = second.data["events"].as_array().unwrap();
        assert_eq!(replayed.len(), 1);
    }

    #[test]
    fn test_per_session_sequence_strictly_increases() {
        let broadcaster = EventBroadcaster::new(1024, 0);
        let handle = broadcaster.subscribe(EventFilter::session("s1"));
        // Skip connection + history
        handle.try_recv();
        handle.try_recv();

        for _ in 0..50 {
            broadcaster.publish(event("s1", EventKind::AgentProgress));
            broadcaster.publish(event("s2", EventKind::AgentProgress));
        }

        let mut last = None;
        while let Some(e) = handle.try_recv() {
            assert_eq!(e.session_id, "s1");
            if let Some(prev) = last {
                assert!(e.sequence > prev, "sequence regressed: {} -> {}", prev, e.sequence);
            }
            last = Some(e.sequence);
        }
        assert_eq!(last, Some(49));
    }

    #[test]
    fn test_drop_oldest_keeps_latest() {
        let broadcaster = EventBroadcaster::new(256, 0);
        let slow = broadcaster.subscribe(EventFilter::session("s1"));
        slow.try_recv();
        slow.try_recv();
        let fast = broadcaster.subscribe(EventFilter::session("s1"));
        fast.try_recv();
        fast.try_recv();

        for _ in 0..1000 {
            broadcaster.publish(event("s1", EventKind::AgentProgress));
            // Fast subscriber keeps up
            fast.try_recv().unwrap();
        }

        // Slow subscriber retains exactly the newest 256
        assert_eq!(slow.queue_len(), 256);
        assert!(slow.dropped_count() >= 744);
        let mut sequences = Vec::new();
        while let Some(e) = slow.try_recv() {
            sequences.push(e.sequence);
        }
        assert_eq!(*sequences.last().unwrap(), 999);
        assert_eq!(sequences.len(), 256);
        assert!(sequences.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_gap_marker_after_drops() {
        let broadcaster = EventBroadcaster::new(4, 0);
        let handle = broadcaster.subscribe(EventFilter::session("s1"));
        handle.try_recv();
        handle.try_recv();

        // Overflow the queue
        for _ in 0..8 {
            broadcaster.publish(event("s1", EventKind::AgentProgress));
        }
        assert!(handle.dropped_count() >= 1);

        // Drain, then receive again: the next enqueue carries the marker
        while handle.try_recv().is_some() {}
        broadcaster.publish(event("s1", EventKind::AgentProgress));

        let marker = handle.try_recv().unwrap();
        assert_eq!(marker.kind, EventKind::Error);
        assert!(marker.meta.dropped.unwrap() >= 1);
        let live = handle.try_recv().unwrap();
        assert_eq!(live.kind, EventKind::AgentProgress);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_drains() {
        let broadcaster = EventBroadcaster::new(16, 0);
        let handle = broadcaster.subscribe(EventFilter::all());
        broadcaster.publish(event("s1", EventKind::State));

        broadcaster.unsubscribe(&handle);
        broadcaster.unsubscribe(&handle);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(handle.is_closed());
        assert_eq!(handle.queue_len(), 0);

        // Publishing after unsubscribe reaches nobody and does not panic
        broadcaster.publish(event("s1", EventKind::State));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let broadcaster = Arc::new(EventBroadcaster::new(16, 0));
        let handle = broadcaster.subscribe(EventFilter::session("s1"));
        handle.try_recv();
        handle.try_recv();

        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                broadcaster.publish(event("s1", EventKind::State));
            })
        };

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), handle.recv())
            .await
            .expect("recv should wake")
            .unwrap();
        assert_eq!(received.kind, EventKind::State);
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_close() {
        let broadcaster = Arc::new(EventBroadcaster::new(16, 0));
        let handle = broadcaster.subscribe(EventFilter::all());
        handle.try_recv();
        handle.try_recv();

        let waiter = {
            let broadcaster = broadcaster.clone();
            let id = handle.id().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                // Rebuild a handle-alike to unsubscribe by id
                if let Some((_, s)) = broadcaster.subscribers.remove(&id) {
                    s.closed.store(true, Ordering::Release);
                    s.queue.lock().items.clear();
                    s.notify.notify_waiters();
                }
            })
        };

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), handle.recv())
            .await
            .expect("recv should resolve");
        assert!(received.is_none());
        waiter.await.unwrap();
    }

    #[test]
    fn test_history_capped_at_depth() {
        let broadcaster = EventBroadcaster::new(16, 5);
        for _ in 0..20 {
            broadcaster.publish(event("s1", EventKind::AgentProgress));
        }

        let handle = broadcaster.subscribe(EventFilter::session("s1"));
        handle.try_recv();
        let history = handle.try_recv().unwrap();
        let replayed = history.data["events"].as_array().unwrap();
        assert_eq!(replayed.len(), 5);
        // Replay holds the newest events
        assert_eq!(replayed.last().unwrap()["sequence"], 19);
    }

    #[test]
    fn test_global_subscriber_sees_all_sessions() {
        let broadcaster = EventBroadcaster::new(64, 0);
        let handle = broadcaster.subscribe(EventFilter::all());
        handle.try_recv();
        handle.try_recv();

        broadcaster.publish(event("a", EventKind::State));
        broadcaster.publish(event("b", EventKind::State));

        let sessions: Vec<String> = std::iter::from_fn(|| handle.try_recv())
            .map(|e| e.session_id)
            .collect();
        assert_eq!(sessions, vec!["a".to_string(), "b".to_string()]);
    }
}
