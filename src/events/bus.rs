//! Broadcast wrapper over [`SchedulerEvent`], adapted from the corpus's
//! `CrawlEventBus` down to the subset the scheduler needs: publish and
//! subscribe, with lagged/no-subscriber conditions surfaced as typed errors
//! rather than silently dropped.

use tokio::sync::broadcast;

use crate::events::errors::EventBusError;
use crate::events::types::SchedulerEvent;

#[derive(Debug)]
pub struct SchedulerEventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: SchedulerEvent) -> Result<usize, EventBusError> {
        self.sender
            .send(event)
            .map_err(|_| EventBusError::NoSubscribers)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }
}

impl Default for SchedulerEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_reported() {
        let bus = SchedulerEventBus::new(8);
        let err = bus.publish(SchedulerEvent::aborting()).unwrap_err();
        assert!(matches!(err, EventBusError::NoSubscribers));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = SchedulerEventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(SchedulerEvent::migrating()).unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SchedulerEvent::Migrating { .. }));
    }
}
