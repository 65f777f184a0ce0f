//! Subscriber side of the event bus

use crate::bus::BusInner;
use crate::event::Event;
use futures::stream::{FusedStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Ordered stream of one session's events
///
/// Yields the replayed history first, then live events. Ends after the first
/// terminal event or once the session is closed and the queue drained.
/// Dropping the subscription deregisters its queue.
pub struct Subscription {
    bus: Arc<BusInner>,
    session_id: String,
    id: u64,
    replay: VecDeque<Arc<Event>>,
    receiver: Option<mpsc::Receiver<Arc<Event>>>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        bus: Arc<BusInner>,
        session_id: String,
        id: u64,
        replay: VecDeque<Arc<Event>>,
        receiver: Option<mpsc::Receiver<Arc<Event>>>,
    ) -> Self {
        Self {
            bus,
            session_id,
            id,
            replay,
            receiver,
            finished: false,
        }
    }

    /// Session this subscription follows
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.next().await
    }

    /// Drain the stream to its end
    pub async fn collect_all(mut self) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }

    fn observe(&mut self, event: Arc<Event>) -> Arc<Event> {
        if event.is_terminal() {
            self.finish();
        }
        event
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.replay.clear();
        self.receiver = None;
        self.bus.deregister(&self.session_id, self.id);
    }
}

impl Stream for Subscription {
    type Item = Arc<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(event) = this.replay.pop_front() {
            return Poll::Ready(Some(this.observe(event)));
        }
        let Some(receiver) = this.receiver.as_mut() else {
            this.finish();
            return Poll::Ready(None);
        };
        match receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(this.observe(event))),
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for Subscription {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.finished {
            self.bus.deregister(&self.session_id, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .field("id", &self.id)
            .field("pending_replay", &self.replay.len())
            .field("finished", &self.finished)
            .finish()
    }
}
