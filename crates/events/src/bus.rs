//! Broadcast bus carrying cycle lifecycle events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::types::{Event, EventEnvelope};

const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle; all clones publish into the same channel.
///
/// Publishing never blocks. Slow subscribers lose the oldest events
/// rather than holding up the orchestrator.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    published: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many subscribers got the envelope; 0 when nobody listens.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    pub fn emit(&self, event: Event) -> usize {
        self.publish(EventEnvelope::new(event))
    }

    /// Raw receiver. Only events published after this call arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Every event, with lag handled for the caller.
    pub fn subscription(&self) -> Subscription {
        Subscription {
            receiver: self.subscribe(),
            cycle_id: None,
            missed: 0,
        }
    }

    /// Events of one cycle only. Run-level events without a cycle id are
    /// skipped.
    pub fn subscribe_cycle(&self, cycle_id: Uuid) -> Subscription {
        Subscription {
            receiver: self.subscribe(),
            cycle_id: Some(cycle_id),
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published through any clone.
    pub fn event_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
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
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.event_count())
            .finish()
    }
}

/// Receiver that skips over lagged events instead of failing.
pub struct Subscription {
    receiver: broadcast::Receiver<EventEnvelope>,
    cycle_id: Option<Uuid>,
    missed: u64,
}

impl Subscription {
    /// Next matching event, or `None` once every bus handle is dropped.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.matches(&envelope) => return Some(envelope),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => self.missed += skipped,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Events dropped because this subscriber fell behind.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn matches(&self, envelope: &EventEnvelope) -> bool {
        match self.cycle_id {
            Some(id) => envelope.event.cycle_id() == Some(id),
            None => true,
        }
    }
}
