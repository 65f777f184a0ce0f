//! Per-session event bus
//!
//! Each session owns an append-only history and a registry of live subscriber
//! queues. Publishing and subscribing lock the same session entry, so a new
//! subscriber sees every event exactly once: either in its replay snapshot or
//! on its live queue, never both.
//!
//! - `emit` never blocks: a full subscriber queue drops the event for that
//!   subscriber only
//! - a terminal event detaches every live sender after delivery, so a
//!   subscriber that missed it on a full queue still drains and ends
//! - `close` drops every live sender; subscribers drain what is queued and end
//! - history survives `close` and is only discarded by `clear`

use crate::event::{Event, EventType};
use crate::subscription::Subscription;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default bound of each subscriber queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub(crate) struct LiveSubscriber {
    id: u64,
    sender: mpsc::Sender<Arc<Event>>,
}

#[derive(Default)]
pub(crate) struct SessionChannel {
    history: Vec<Arc<Event>>,
    subscribers: Vec<LiveSubscriber>,
    closed: bool,
}

pub(crate) struct BusInner {
    sessions: DashMap<String, SessionChannel>,
    capacity: usize,
    next_subscriber: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl BusInner {
    pub(crate) fn deregister(&self, session_id: &str, subscriber: u64) {
        if let Some(mut channel) = self.sessions.get_mut(session_id) {
            channel.subscribers.retain(|live| live.id != subscriber);
        }
    }
}

/// Event bus statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusStats {
    /// Sessions with history or subscribers
    pub sessions: usize,
    /// Registered live subscribers across all sessions
    pub subscribers: usize,
    /// Events emitted since creation
    pub events_emitted: u64,
    /// Per-subscriber deliveries dropped on full queues
    pub events_dropped: u64,
}

/// Shared handle to the bus; clones refer to the same sessions
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with the default queue capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus whose subscriber queues hold at most `capacity` events
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                sessions: DashMap::new(),
                capacity: capacity.max(1),
                next_subscriber: AtomicU64::new(1),
                emitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Per-subscriber queue bound
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Record an event and offer it to every live subscriber of the session
    ///
    /// A terminal event also detaches the live subscribers, ending their
    /// streams once their queues drain.
    pub fn emit(
        &self,
        session_id: &str,
        event_type: EventType,
        payload: Value,
        message: impl Into<String>,
    ) -> Arc<Event> {
        let mut channel = self
            .inner
            .sessions
            .entry(session_id.to_string())
            .or_default();

        let sequence = channel.history.len() as u64 + 1;
        let event = Arc::new(Event::new(
            sequence, event_type, session_id, payload, message,
        ));
        channel.history.push(Arc::clone(&event));

        let mut dropped = 0_u64;
        channel
            .subscribers
            .retain(|live| match live.sender.try_send(Arc::clone(&event)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::warn!(
                        "{}: subscriber {} queue full, dropped {} #{}",
                        session_id,
                        live.id,
                        event_type,
                        sequence
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        let detached = if event_type.is_terminal() {
            std::mem::take(&mut channel.subscribers).len()
        } else {
            0
        };
        drop(channel);

        self.inner.emitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("incident_events_emitted_total").increment(1);
        if dropped > 0 {
            self.inner.dropped.fetch_add(dropped, Ordering::Relaxed);
            metrics::counter!("incident_events_dropped_total").increment(dropped);
        }
        tracing::debug!("{}: emitted {} #{}", session_id, event_type, sequence);
        if detached > 0 {
            tracing::debug!("{}: terminal event detached {} subscribers", session_id, detached);
        }
        event
    }

    /// Replay the session's history, then follow live events
    ///
    /// The stream ends after a terminal event or when the session is closed.
    /// A closed or already-terminated session yields its history and ends.
    #[must_use]
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let mut channel = self
            .inner
            .sessions
            .entry(session_id.to_string())
            .or_default();

        let replay: VecDeque<Arc<Event>> = channel.history.iter().cloned().collect();
        let ended = channel.closed || replay.iter().any(|event| event.is_terminal());
        let receiver = if ended {
            None
        } else {
            let (sender, receiver) = mpsc::channel(self.inner.capacity);
            channel.subscribers.push(LiveSubscriber { id, sender });
            Some(receiver)
        };
        drop(channel);

        tracing::debug!(
            "{}: subscriber {} attached (replaying {})",
            session_id,
            id,
            replay.len()
        );
        Subscription::new(
            Arc::clone(&self.inner),
            session_id.to_string(),
            id,
            replay,
            receiver,
        )
    }

    /// Close the session's stream
    ///
    /// Live subscribers drain their queues and end; later subscribers only get
    /// the retained history. Unknown or cleared sessions are left untouched.
    pub fn close(&self, session_id: &str) {
        let Some(mut channel) = self.inner.sessions.get_mut(session_id) else {
            return;
        };
        if channel.closed {
            return;
        }
        channel.closed = true;
        let detached = std::mem::take(&mut channel.subscribers).len();
        drop(channel);
        tracing::debug!("{}: closed ({} live subscribers)", session_id, detached);
    }

    /// Whether `close` was called for the session
    #[must_use]
    pub fn is_closed(&self, session_id: &str) -> bool {
        self.inner
            .sessions
            .get(session_id)
            .is_some_and(|channel| channel.closed)
    }

    /// Snapshot of the session's history in emission order
    #[must_use]
    pub fn history(&self, session_id: &str) -> Vec<Arc<Event>> {
        self.inner
            .sessions
            .get(session_id)
            .map(|channel| channel.history.clone())
            .unwrap_or_default()
    }

    /// Number of live subscribers for the session
    #[must_use]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.inner
            .sessions
            .get(session_id)
            .map_or(0, |channel| channel.subscribers.len())
    }

    /// Forget the session entirely: history and subscribers
    pub fn clear(&self, session_id: &str) {
        if self.inner.sessions.remove(session_id).is_some() {
            tracing::debug!("{}: cleared", session_id);
        }
    }

    /// Bus-wide counters
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        let subscribers = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.subscribers.len())
            .sum();
        EventBusStats {
            sessions: self.inner.sessions.len(),
            subscribers,
            events_emitted: self.inner.emitted.load(Ordering::Relaxed),
            events_dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}
