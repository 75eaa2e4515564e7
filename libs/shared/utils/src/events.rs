use tokio::sync::broadcast;
use tracing::debug;

use shared_models::DomainEvent;

/// Fire-and-forget publication of domain events to external subscribers.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

pub struct BroadcastEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: DomainEvent) {
        let name = event.name;
        match self.sender.send(event) {
            Ok(receivers) => debug!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => debug!("Published {} with no subscribers", name),
        }
    }
}
