//! Object-creation event fan-out with history replay.
//!
//! [`EventBus`] carries `FileCreated` notifications to `GET /events`
//! subscribers. Live fan-out rides a [`tokio::sync::broadcast`] channel; a
//! bounded history buffer is replayed to each new subscriber so late joiners
//! see what they missed. Publishing and subscribing synchronize on the
//! history lock, so a subscriber's replay plus its live stream together
//! contain every event exactly once.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Default live-channel capacity and history depth.
const DEFAULT_CAPACITY: usize = 256;

/// A notification that an object was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEvent {
    /// Event kind; currently always `FileCreated`.
    pub event: &'static str,
    /// The id of the created object.
    pub id: String,
}

impl ObjectEvent {
    /// A `FileCreated` notification for `id`.
    #[must_use]
    pub fn file_created(id: impl Into<String>) -> Self {
        Self {
            event: "FileCreated",
            id: id.into(),
        }
    }

    /// Render this event as a server-sent-event wire frame.
    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        let json = serde_json::to_string(self).expect("event payload serialization cannot fail");
        Bytes::from(format!("data: {json}\n\n"))
    }
}

/// Broadcast bus for object events, with bounded replayable history.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ObjectEvent>,
    history: Mutex<VecDeque<ObjectEvent>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus whose live channel and history buffer both hold up to
    /// `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event to all current subscribers and append it to the
    /// replay history, evicting the oldest entry once the buffer is full.
    pub fn publish(&self, event: ObjectEvent) {
        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
        // A send error only means nobody is subscribed right now.
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(receivers, "published object event");
    }

    /// Subscribe: returns the buffered history to replay plus a live
    /// receiver positioned immediately after it.
    #[must_use]
    pub fn subscribe(&self) -> (Vec<ObjectEvent>, broadcast::Receiver<ObjectEvent>) {
        let history = self.history.lock();
        let rx = self.tx.subscribe();
        (history.iter().cloned().collect(), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_sse_frame() {
        let frame = ObjectEvent::file_created("abc").to_frame();
        assert_eq!(
            frame.as_ref(),
            b"data: {\"event\":\"FileCreated\",\"id\":\"abc\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_should_replay_history_to_late_subscriber() {
        let bus = EventBus::new(8);
        bus.publish(ObjectEvent::file_created("one"));
        bus.publish(ObjectEvent::file_created("two"));

        let (history, mut rx) = bus.subscribe();
        assert_eq!(
            history,
            vec![
                ObjectEvent::file_created("one"),
                ObjectEvent::file_created("two"),
            ]
        );

        bus.publish(ObjectEvent::file_created("three"));
        assert_eq!(rx.recv().await.unwrap(), ObjectEvent::file_created("three"));
    }

    #[test]
    fn test_should_evict_oldest_history_entry_at_capacity() {
        let bus = EventBus::new(2);
        bus.publish(ObjectEvent::file_created("one"));
        bus.publish(ObjectEvent::file_created("two"));
        bus.publish(ObjectEvent::file_created("three"));

        let (history, _rx) = bus.subscribe();
        assert_eq!(
            history,
            vec![
                ObjectEvent::file_created("two"),
                ObjectEvent::file_created("three"),
            ]
        );
    }
}
