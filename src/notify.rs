use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, SpaceId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for LISTEN/NOTIFY per space.
pub struct NotifyHub {
    channels: DashMap<SpaceId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a space. Creates the channel if needed.
    pub fn subscribe(&self, space_id: SpaceId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(space_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, space_id: SpaceId, event: &Event) {
        if let Some(sender) = self.channels.get(&space_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel.
    #[allow(dead_code)]
    pub fn remove(&self, space_id: &SpaceId) {
        self.channels.remove(space_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(1);

        let event = Event::SpaceCreated {
            id: 1,
            owner_id: 7,
            name: "Loft".into(),
            description: String::new(),
            price_per_night: 5000,
        };
        hub.send(1, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.send(
            99,
            &Event::BookingCancelled {
                id: ulid::Ulid::new(),
                space_id: 99,
            },
        );
    }

    #[tokio::test]
    async fn channels_are_per_space() {
        let hub = NotifyHub::new();
        let mut rx_one = hub.subscribe(1);
        let _rx_two = hub.subscribe(2);

        let event = Event::BookingConfirmed {
            id: ulid::Ulid::new(),
            space_id: 1,
        };
        hub.send(1, &event);

        assert_eq!(rx_one.recv().await.unwrap(), event);
        // Space 2's channel saw nothing.
        assert!(hub.subscribe(2).try_recv().is_err());
    }
}
