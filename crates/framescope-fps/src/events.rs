//! In-process event bus for collector lifecycle and transitions.

use framescope_types::events::{EventPayload, FrameEvent};
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Broadcast bus; publishing never blocks and is dropped when nobody listens.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FrameEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, payload: EventPayload) {
        let _ = self.tx.send(FrameEvent::new(payload));
    }

    /// Lagging subscribers silently skip the events they missed.
    pub fn subscribe(&self) -> BoxStream<'static, FrameEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framescope_types::telemetry::FramePair;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut stream = bus.subscribe();
        bus.publish(EventPayload::Stopped {
            pair: FramePair::new(30, 2),
        });
        let event = stream.next().await.expect("event");
        assert_eq!(
            event.payload,
            EventPayload::Stopped {
                pair: FramePair::new(30, 2)
            }
        );
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventBus::new(1).publish(EventPayload::Stopped {
            pair: FramePair::default(),
        });
    }
}
