//! Event bus: tokio broadcast channel carrying `PanelEvent`s.
//!
//! The supervisor publishes status transitions and output chunks here; the
//! HTTP layer (or any other presentation consumer) subscribes and forwards.

use tokio::sync::broadcast;

use deck_types::event::PanelEvent;

const BUS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PanelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Subscribe to receive future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    /// Silently drops the event if there are no subscribers.
    pub fn send(&self, event: PanelEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_types::gateway::GatewayStatus;

    #[test]
    fn send_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.send(PanelEvent::GatewayLog { chunk: "x".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_new_events() {
        let bus = EventBus::new();
        bus.send(PanelEvent::GatewayLog { chunk: "early".into() });
        let mut rx = bus.subscribe();
        bus.send(PanelEvent::GatewayStatus { status: GatewayStatus::Running });
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::GatewayStatus { status: GatewayStatus::Running }
        );
    }
}
