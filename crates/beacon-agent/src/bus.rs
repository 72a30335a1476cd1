//! Event bus

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{AgentEvent, AgentEventKind};

/// Broadcasts [`AgentEvent`]s to any number of subscribers
///
/// Events emitted while nobody is subscribed are dropped. Subscribers that
/// fall more than `capacity` events behind skip the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AgentEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn emit(&self, event: AgentEvent) {
        tracing::trace!("Agent event: {}", event.name());

        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Receive every future event
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    /// Receive future events of one kind
    pub fn subscribe_to(&self, kind: AgentEventKind) -> EventSubscription {
        EventSubscription {
            kind,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Subscription filtered to one [`AgentEventKind`]
pub struct EventSubscription {
    kind: AgentEventKind,
    receiver: broadcast::Receiver<AgentEvent>,
}

impl EventSubscription {
    pub fn kind(&self) -> AgentEventKind {
        self.kind
    }

    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.kind() == self.kind => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(kind = self.kind.name(), skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.kind() == self.kind => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
