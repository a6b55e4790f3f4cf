use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use super::types::{DomainEvent, EventKind};

/// Publish/subscribe keyed by event type.
///
/// Each subscriber gets its own unbounded queue, so events of one type from
/// one publisher arrive in publish order. Subscribers whose receiver has been
/// dropped are pruned on the next publish of that type.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<EventKind, Vec<mpsc::UnboundedSender<DomainEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<DomainEvent> {
        self.subscribe_many(&[kind])
    }

    /// One receiver for several types; ordering holds within each type
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<DomainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in kinds {
            self.subscribers.entry(*kind).or_default().push(tx.clone());
        }
        rx
    }

    /// Deliver to every live subscriber of the event's type; returns how many received it
    pub fn publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind;
        let Some(mut senders) = self.subscribers.get_mut(&kind) else {
            trace!(kind = %kind, "no subscribers");
            return 0;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        senders.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .get(&kind)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}
