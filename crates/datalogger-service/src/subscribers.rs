//! Registry of connected push-channel subscribers.
//!
//! Each subscriber owns a bounded queue. Broadcasts use `try_send`, so a
//! slow or vanished subscriber never delays delivery to the others: a full
//! queue drops that one event for that subscriber, a closed queue removes
//! the subscriber from the registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::ServerEvent;

/// Identifier of a connected subscriber.
pub type SubscriberId = Uuid;

/// Receiving end of a subscriber's queue.
pub type EventReceiver = mpsc::Receiver<Arc<ServerEvent>>;

/// Public information about a subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub peer: Option<SocketAddr>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
}

struct Entry {
    info: SubscriberInfo,
    tx: mpsc::Sender<Arc<ServerEvent>>,
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers the event was queued for.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers removed because their queue was closed.
    pub removed: usize,
}

/// Set of active subscribers.
pub struct SubscriberRegistry {
    buffer: usize,
    entries: Mutex<HashMap<SubscriberId, Entry>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("buffer", &self.buffer)
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create a registry whose subscribers queue up to `buffer` events each.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber and return its id and event queue.
    pub fn register(&self, peer: Option<SocketAddr>) -> (SubscriberId, EventReceiver) {
        self.insert(peer, None)
    }

    /// Add a subscriber whose queue starts with `greeting`.
    ///
    /// The greeting is queued before the subscriber becomes visible to
    /// [`broadcast`](Self::broadcast), so it is always the first event received.
    pub fn register_with(
        &self,
        peer: Option<SocketAddr>,
        greeting: ServerEvent,
    ) -> (SubscriberId, EventReceiver) {
        self.insert(peer, Some(greeting))
    }

    fn insert(
        &self,
        peer: Option<SocketAddr>,
        greeting: Option<ServerEvent>,
    ) -> (SubscriberId, EventReceiver) {
        let (tx, rx) = mpsc::channel(self.buffer);
        if let Some(event) = greeting {
            // Fresh queue with capacity >= 1, cannot be full.
            let _ = tx.try_send(Arc::new(event));
        }
        let id = Uuid::new_v4();
        let info = SubscriberInfo {
            id,
            peer,
            connected_at: OffsetDateTime::now_utc(),
        };
        self.lock().insert(id, Entry { info, tx });
        debug!("Registered subscriber {}", id);
        (id, rx)
    }

    /// Remove a subscriber, returning what was known about it.
    pub fn unregister(&self, id: &SubscriberId) -> Option<SubscriberInfo> {
        self.lock().remove(id).map(|entry| entry.info)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Information about every current subscriber.
    pub fn list(&self) -> Vec<SubscriberInfo> {
        self.lock().values().map(|entry| entry.info.clone()).collect()
    }

    /// Queue `event` for every current subscriber.
    pub fn broadcast(&self, event: ServerEvent) -> Delivery {
        let event = Arc::new(event);
        let mut delivery = Delivery::default();
        let mut entries = self.lock();
        let mut closed = Vec::new();

        for (id, entry) in entries.iter() {
            match entry.tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    delivery.dropped += 1;
                    warn!("Subscriber {} is lagging, dropped {} event", id, event.name());
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            entries.remove(&id);
            delivery.removed += 1;
            debug!("Removed closed subscriber {}", id);
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_broadcast() {
        let registry = SubscriberRegistry::new(8);
        let (_a, mut rx_a) = registry.register(None);
        let (_b, mut rx_b) = registry.register(Some("127.0.0.1:40000".parse().unwrap()));
        assert_eq!(registry.len(), 2);

        let delivery = registry.broadcast(ServerEvent::status_report("tick", 1));
        assert_eq!(delivery.delivered, 2);

        assert_eq!(rx_a.recv().await.unwrap().name(), "status_report");
        assert_eq!(rx_b.recv().await.unwrap().name(), "status_report");
    }

    #[tokio::test]
    async fn test_greeting_goes_to_one_subscriber() {
        let registry = SubscriberRegistry::new(8);
        let (_a, mut rx_a) = registry.register(None);
        let (_b, mut rx_b) = registry.register_with(None, ServerEvent::status_report("Connected", 0));

        let event = rx_b.recv().await.unwrap();
        assert_eq!(*event, ServerEvent::status_report("Connected", 0));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_greeting_comes_before_broadcasts() {
        let registry = SubscriberRegistry::new(8);
        let (_id, mut rx) = registry.register_with(None, ServerEvent::status_report("Connected", 0));
        registry.broadcast(ServerEvent::status_report("tick", 7));

        assert_eq!(*rx.recv().await.unwrap(), ServerEvent::status_report("Connected", 0));
        assert_eq!(*rx.recv().await.unwrap(), ServerEvent::status_report("tick", 7));
    }

    #[tokio::test]
    async fn test_full_queue_only_affects_that_subscriber() {
        let registry = SubscriberRegistry::new(1);
        let (_slow, _rx_slow) = registry.register(None);
        let (_fast, mut rx_fast) = registry.register(None);

        let first = registry.broadcast(ServerEvent::status_report("tick", 1));
        assert_eq!(first.delivered, 2);
        rx_fast.recv().await.unwrap();

        let second = registry.broadcast(ServerEvent::status_report("tick", 2));
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);
        assert_eq!(rx_fast.recv().await.unwrap().name(), "status_report");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_closed_subscriber_is_removed() {
        let registry = SubscriberRegistry::new(4);
        let (_gone, rx_gone) = registry.register(None);
        let (_kept, _rx_kept) = registry.register(None);
        drop(rx_gone);

        let delivery = registry.broadcast(ServerEvent::status_report("tick", 1));
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.removed, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = SubscriberRegistry::new(4);
        let peer: SocketAddr = "10.0.0.2:5555".parse().unwrap();
        let (id, _rx) = registry.register(Some(peer));

        let info = registry.unregister(&id).unwrap();
        assert_eq!(info.peer, Some(peer));
        assert!(registry.is_empty());
        assert!(registry.unregister(&id).is_none());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let registry = SubscriberRegistry::new(4);
        let delivery = registry.broadcast(ServerEvent::status_report("tick", 1));
        assert_eq!(delivery, Delivery::default());
    }
}
