//! Publish/subscribe notifications for the action runtime.
//!
//! Subscribers register per event name. Sync and async subscribers live in
//! independent registries: [`EventBus::publish`] reaches only sync
//! subscribers, [`EventBus::publish_async`] only async ones.
//!
//! A failing subscriber (an `Err` or a panic) is logged and skipped. It never
//! stops later subscribers and never reaches the publisher.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dcc_mcp_core::ContextMap;
use dcc_mcp_core::action::panic_error;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Error returned by a subscriber.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a subscriber.
pub type SubscriberResult = Result<(), SubscriberError>;

type SyncHandler = Arc<dyn Fn(&Event) -> SubscriberResult + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, SubscriberResult> + Send + Sync>;

/// A published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub data: ContextMap,
}

impl Event {
    pub fn new(name: impl Into<String>, data: ContextMap) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event(name={}, data={})",
            self.name,
            serde_json::Value::Object(self.data.clone())
        )
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Event name to subscriber list, kept in registration order.
struct Registry<H> {
    subscribers: DashMap<String, Vec<(SubscriptionId, H)>>,
}

impl<H: Clone> Registry<H> {
    fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    fn add(&self, event: &str, handler: H) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let removed = match self.subscribers.get_mut(event) {
            Some(mut handlers) => {
                let before = handlers.len();
                handlers.retain(|(existing, _)| *existing != id);
                handlers.len() != before
            }
            None => false,
        };
        self.subscribers
            .remove_if(event, |_, handlers| handlers.is_empty());
        removed
    }

    /// Copy of the current handlers; the map lock is released before any
    /// handler runs so handlers may (un)subscribe.
    fn snapshot(&self, event: &str) -> Vec<H> {
        self.subscribers
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    fn count(&self, event: &str) -> usize {
        self.subscribers.get(event).map_or(0, |h| h.len())
    }

    fn clear(&self) {
        self.subscribers.clear();
    }
}

/// Pub/sub hub with independent sync and async registries.
pub struct EventBus {
    sync_subscribers: Registry<SyncHandler>,
    async_subscribers: Registry<AsyncHandler>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("sync_events", &self.sync_subscribers.subscribers.len())
            .field("async_events", &self.async_subscribers.subscribers.len())
            .finish()
    }
}

static GLOBAL_EVENT_BUS: OnceLock<Arc<EventBus>> = OnceLock::new();

impl EventBus {
    pub fn new() -> Self {
        Self {
            sync_subscribers: Registry::new(),
            async_subscribers: Registry::new(),
        }
    }

    /// Process-wide bus shared by managers that are not given their own.
    pub fn global() -> Arc<EventBus> {
        Arc::clone(GLOBAL_EVENT_BUS.get_or_init(|| Arc::new(EventBus::new())))
    }

    /// Register a sync subscriber for `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> SubscriberResult + Send + Sync + 'static,
    {
        let id = self.sync_subscribers.add(event, Arc::new(handler));
        debug!(event = %event, subscription = %id, "Subscribed");
        id
    }

    /// Register an async subscriber for `event`.
    pub fn subscribe_async<F, Fut>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SubscriberResult> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |event| handler(event).boxed());
        let id = self.async_subscribers.add(event, handler);
        debug!(event = %event, subscription = %id, "Subscribed async");
        id
    }

    /// Remove a sync subscriber. Unknown events or ids are a no-op.
    ///
    /// Returns true when a subscriber was removed.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        self.sync_subscribers.remove(event, id)
    }

    /// Remove an async subscriber. Unknown events or ids are a no-op.
    pub fn unsubscribe_async(&self, event: &str, id: SubscriptionId) -> bool {
        self.async_subscribers.remove(event, id)
    }

    /// Invoke sync subscribers of `event` in registration order.
    ///
    /// Returns the number of subscribers that completed without error.
    pub fn publish(&self, event: &str, data: ContextMap) -> usize {
        let handlers = self.sync_subscribers.snapshot(event);
        if handlers.is_empty() {
            return 0;
        }
        let event = Event::new(event, data);
        let mut delivered = 0;
        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)))
                .unwrap_or_else(|payload| Err(SubscriberError::from(panic_error(payload))));
            match outcome {
                Ok(()) => delivered += 1,
                Err(err) => warn!(event = %event.name, error = %err, "Event subscriber failed"),
            }
        }
        delivered
    }

    /// Await async subscribers of `event` one after another.
    ///
    /// Returns the number of subscribers that completed without error.
    pub async fn publish_async(&self, event: &str, data: ContextMap) -> usize {
        let handlers = self.async_subscribers.snapshot(event);
        if handlers.is_empty() {
            return 0;
        }
        let event = Event::new(event, data);
        let mut delivered = 0;
        for handler in handlers {
            let outcome = match catch_unwind(AssertUnwindSafe(|| handler(event.clone()))) {
                Ok(future) => AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(SubscriberError::from(panic_error(payload)))),
                Err(payload) => Err(SubscriberError::from(panic_error(payload))),
            };
            match outcome {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(event = %event.name, error = %err, "Async event subscriber failed")
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.sync_subscribers.count(event)
    }

    pub fn async_subscriber_count(&self, event: &str) -> usize {
        self.async_subscribers.count(event)
    }

    /// Drop every subscriber in both registries.
    pub fn clear(&self) {
        self.sync_subscribers.clear();
        self.async_subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn data(value: serde_json::Value) -> ContextMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_event_display() {
        let event = Event::new("test_event", data(json!({"param1": "value1"})));
        assert_eq!(
            event.to_string(),
            r#"Event(name=test_event, data={"param1":"value1"})"#
        );
    }

    #[test]
    fn test_publish_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe("scene.saved", move |event| {
                seen.lock().unwrap().push((label, event.data["path"].clone()));
                Ok(())
            });
        }

        let delivered = bus.publish("scene.saved", data(json!({"path": "a.ma"})));
        assert_eq!(delivered, 3);
        let seen = seen.lock().unwrap();
        let labels: Vec<_> = seen.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
        assert_eq!(seen[0].1, json!("a.ma"));
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(0));

        bus.subscribe("evt", |_| Err("subscriber exploded".into()));
        bus.subscribe("evt", |_| panic!("subscriber panicked"));
        let counter = Arc::clone(&reached);
        bus.subscribe("evt", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(bus.publish("evt", ContextMap::new()), 1);
        assert_eq!(*reached.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_empty_event() {
        let bus = EventBus::new();
        let id = bus.subscribe("evt", |_| Ok(()));
        assert_eq!(bus.subscriber_count("evt"), 1);

        assert!(bus.unsubscribe("evt", id));
        assert_eq!(bus.subscriber_count("evt"), 0);
        assert!(!bus.sync_subscribers.subscribers.contains_key("evt"));

        // unknown event and unknown id are no-ops
        assert!(!bus.unsubscribe("evt", id));
        assert!(!bus.unsubscribe("never", id));
    }

    #[test]
    fn test_registries_are_independent() {
        let bus = EventBus::new();
        bus.subscribe_async("evt", |_| async { Ok::<_, SubscriberError>(()) });
        assert_eq!(bus.subscriber_count("evt"), 0);
        assert_eq!(bus.async_subscriber_count("evt"), 1);
        assert_eq!(bus.publish("evt", ContextMap::new()), 0);
    }

    #[tokio::test]
    async fn test_publish_async_sequential_and_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        bus.subscribe_async("evt", move |_| {
            let first = Arc::clone(&first);
            async move {
                tokio::task::yield_now().await;
                first.lock().unwrap().push("first");
                Ok::<_, SubscriberError>(())
            }
        });
        bus.subscribe_async("evt", |_| async { Err::<(), _>(SubscriberError::from("boom")) });
        let second = Arc::clone(&seen);
        bus.subscribe_async("evt", move |event| {
            let second = Arc::clone(&second);
            async move {
                assert_eq!(event.name, "evt");
                second.lock().unwrap().push("second");
                Ok::<_, SubscriberError>(())
            }
        });

        assert_eq!(bus.publish_async("evt", ContextMap::new()).await, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        let id = Arc::new(Mutex::new(None));
        let own_id = Arc::clone(&id);
        let subscription = bus.subscribe("once", move |_| {
            if let Some(id) = *own_id.lock().unwrap() {
                inner.unsubscribe("once", id);
            }
            Ok(())
        });
        *id.lock().unwrap() = Some(subscription);

        assert_eq!(bus.publish("once", ContextMap::new()), 1);
        assert_eq!(bus.publish("once", ContextMap::new()), 0);
    }
}
