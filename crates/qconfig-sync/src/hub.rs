//! # Subscription Hub
//!
//! In-process registry of listeners per item name, plus the current value of
//! every item the engine has applied.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  notify("a.properties", body)                                          │
//! │       │                                                                 │
//! │       │  lock ─► body == current?  ── yes ──► dropped (not a change)    │
//! │       │                │                                                │
//! │       │                no                                               │
//! │       │                ▼                                                │
//! │       │        current = body                                           │
//! │       │        push to every listener queue (registration order)        │
//! │       │  unlock                                                         │
//! │       ▼                                                                 │
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────┐             │
//! │  │ queue #1      │   │ queue #2      │   │ queue #3      │             │
//! │  │  └─► task #1  │   │  └─► task #2  │   │  └─► task #3  │             │
//! │  │     callback  │   │     callback  │   │     callback  │             │
//! │  └───────────────┘   └───────────────┘   └───────────────┘             │
//! │                                                                         │
//! │  subscribe() takes the same lock, so a late subscriber gets exactly    │
//! │  one replay of the current value before any later change.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `seed` is the cache-load variant of `notify`: it only fills a topic that
//! holds no value yet, so a stale disk read can never replace a newer value.
//!
//! Every listener has its own unbounded queue and drain task. A slow
//! callback delays only its own later deliveries. Subscribing spawns a task,
//! so it must happen inside a Tokio runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Handle returned by [`SubscriptionHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct ListenerSlot {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Topic {
    current: Option<String>,
    listeners: Vec<ListenerSlot>,
}

/// Name → listeners registry with replay of the current value.
#[derive(Default)]
pub struct SubscriptionHub {
    topics: Mutex<HashMap<String, Topic>>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `name`.
    ///
    /// If a value is already known the listener receives it once, before any
    /// later change.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let topic_name = name.to_string();
        tokio::spawn(async move {
            while let Some(body) = rx.recv().await {
                trace!(name = %topic_name, subscription = %id, "Delivering config change");
                listener(&topic_name, &body);
            }
        });

        let mut topics = self.topics.lock();
        let topic = topics.entry(name.to_string()).or_default();
        if let Some(current) = &topic.current {
            // receiver is alive until tx is dropped
            let _ = tx.send(current.clone());
        }
        topic.listeners.push(ListenerSlot { id, tx });

        debug!(%name, subscription = %id, listeners = topic.listeners.len(), "Listener subscribed");
        id
    }

    /// Removes a listener. Returns false if the id is unknown.
    ///
    /// Changes already queued for the listener are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut topics = self.topics.lock();
        for (name, topic) in topics.iter_mut() {
            if let Some(pos) = topic.listeners.iter().position(|slot| slot.id == id) {
                topic.listeners.remove(pos);
                debug!(%name, subscription = %id, "Listener unsubscribed");
                return true;
            }
        }
        false
    }

    /// Applies a new value for `name` and queues it for every listener.
    ///
    /// Returns false, delivering nothing, when `body` equals the current
    /// value.
    pub fn notify(&self, name: &str, body: &str) -> bool {
        let mut topics = self.topics.lock();
        let topic = topics.entry(name.to_string()).or_default();

        if topic.current.as_deref() == Some(body) {
            trace!(%name, "Unchanged value, no notification");
            return false;
        }
        topic.current = Some(body.to_string());

        // Drop listeners whose drain task is gone
        topic
            .listeners
            .retain(|slot| slot.tx.send(body.to_string()).is_ok());

        debug!(%name, listeners = topic.listeners.len(), "Config change published");
        true
    }

    /// Loads a cached value for `name` unless one is already held.
    ///
    /// Returns the value the hub holds afterwards. A cache read that loses
    /// the race with a newer `notify` never overwrites it.
    pub fn seed(&self, name: &str, body: &str) -> String {
        let mut topics = self.topics.lock();
        let topic = topics.entry(name.to_string()).or_default();

        if let Some(current) = &topic.current {
            trace!(%name, "Value already held, cached copy ignored");
            return current.clone();
        }
        topic.current = Some(body.to_string());
        topic
            .listeners
            .retain(|slot| slot.tx.send(body.to_string()).is_ok());

        debug!(%name, listeners = topic.listeners.len(), "Config loaded from cache");
        body.to_string()
    }

    /// Returns the current value of `name`.
    pub fn current(&self, name: &str) -> Option<String> {
        self.topics
            .lock()
            .get(name)
            .and_then(|topic| topic.current.clone())
    }

    /// Returns the number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.topics
            .lock()
            .get(name)
            .map(|topic| topic.listeners.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    /// Collects every delivery of a listener.
    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str, &str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |_: &str, body: &str| sink.lock().push(body.to_string()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_delivery_in_publish_order() {
        let hub = SubscriptionHub::new();
        let (seen, listener) = recorder();
        hub.subscribe("a.properties", listener);

        hub.notify("a.properties", "v=1");
        hub.notify("a.properties", "v=2");
        hub.notify("a.properties", "v=3");
        settle().await;

        assert_eq!(*seen.lock(), vec!["v=1", "v=2", "v=3"]);
    }

    #[tokio::test]
    async fn test_identical_value_is_not_a_change() {
        let hub = SubscriptionHub::new();
        let (seen, listener) = recorder();
        hub.subscribe("a.properties", listener);

        assert!(hub.notify("a.properties", "v=1"));
        assert!(!hub.notify("a.properties", "v=1"));
        settle().await;

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_current_value_once() {
        let hub = SubscriptionHub::new();
        hub.notify("a.properties", "v=1");

        let (seen, listener) = recorder();
        hub.subscribe("a.properties", listener);
        settle().await;
        assert_eq!(*seen.lock(), vec!["v=1"]);

        hub.notify("a.properties", "v=2");
        settle().await;
        assert_eq!(*seen.lock(), vec!["v=1", "v=2"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = SubscriptionHub::new();
        let (seen, listener) = recorder();
        let id = hub.subscribe("a.properties", listener);
        assert_eq!(hub.listener_count("a.properties"), 1);

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.listener_count("a.properties"), 0);

        hub.notify("a.properties", "v=1");
        settle().await;
        assert!(seen.lock().is_empty());
        assert_eq!(hub.current("a.properties").as_deref(), Some("v=1"));
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let hub = SubscriptionHub::new();
        let (seen_a, listener_a) = recorder();
        let (seen_b, listener_b) = recorder();
        hub.subscribe("a.properties", listener_a);
        hub.subscribe("b.json", listener_b);

        hub.notify("b.json", "{}");
        settle().await;

        assert!(seen_a.lock().is_empty());
        assert_eq!(*seen_b.lock(), vec!["{}"]);
        assert!(hub.current("a.properties").is_none());
    }

    #[tokio::test]
    async fn test_seed_never_overrides_newer_value() {
        let hub = SubscriptionHub::new();
        let (seen, listener) = recorder();
        hub.subscribe("a.properties", listener);

        hub.notify("a.properties", "v=2");
        assert_eq!(hub.seed("a.properties", "v=1"), "v=2");
        settle().await;

        assert_eq!(hub.current("a.properties").as_deref(), Some("v=2"));
        assert_eq!(*seen.lock(), vec!["v=2"]);
    }

    #[tokio::test]
    async fn test_seed_fills_empty_topic() {
        let hub = SubscriptionHub::new();
        let (seen, listener) = recorder();
        hub.subscribe("a.properties", listener);

        assert_eq!(hub.seed("a.properties", "v=1"), "v=1");
        assert_eq!(hub.seed("a.properties", "v=0"), "v=1");
        settle().await;

        assert_eq!(*seen.lock(), vec!["v=1"]);
    }
}
