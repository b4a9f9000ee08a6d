//! Recorders for events and middleware traversal.

use dcc_mcp_actions::{Event, EventBus, Middleware, SubscriberError, SubscriptionId};
use dcc_mcp_core::{ActionInstance, ActionResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Collects every event it is subscribed to.
#[derive(Debug, Clone, Default)]
pub struct RecordingSubscriber {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event` on the sync path.
    pub fn attach(&self, bus: &EventBus, event: &str) -> SubscriptionId {
        let events = Arc::clone(&self.events);
        bus.subscribe(event, move |event| {
            lock(&events).push(event.clone());
            Ok(())
        })
    }

    /// Subscribe to `event` on the async path.
    pub fn attach_async(&self, bus: &EventBus, event: &str) -> SubscriptionId {
        let events = Arc::clone(&self.events);
        bus.subscribe_async(event, move |event| {
            let events = Arc::clone(&events);
            async move {
                lock(&events).push(event);
                Ok::<_, SubscriberError>(())
            }
        })
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Event names in the order they were received.
    pub fn names(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.name.clone()).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        lock(&self.events).iter().filter(|e| e.name == event).count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

/// Middleware that logs `<label>:before` and `<label>:after` around the
/// rest of the pipeline into a shared log.
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingMiddleware {
    pub fn new(label: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }

    /// Factory for `MiddlewareChain::add` / `ActionManager::add_middleware`.
    pub fn factory(
        label: impl Into<String>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> impl Fn() -> RecordingMiddleware + Send + Sync + 'static {
        let label = label.into();
        let log = Arc::clone(log);
        move || RecordingMiddleware::new(label.clone(), Arc::clone(&log))
    }

    fn record(&self, phase: &str) {
        lock(&self.log).push(format!("{}:{}", self.label, phase));
    }
}

impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    fn before(&self, _action: &mut ActionInstance) {
        self.record("before");
    }

    fn after(&self, _action: &ActionInstance, _result: &mut ActionResult) {
        self.record("after");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc_mcp_core::ContextMap;

    #[test]
    fn test_subscriber_records_in_order() {
        let bus = EventBus::new();
        let recorder = RecordingSubscriber::new();
        recorder.attach(&bus, "a");
        recorder.attach(&bus, "b");

        bus.publish("a", ContextMap::new());
        bus.publish("b", ContextMap::new());
        bus.publish("a", ContextMap::new());

        assert_eq!(recorder.names(), vec!["a", "b", "a"]);
        assert_eq!(recorder.count("a"), 2);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_async_attach_only_sees_async_publish() {
        let bus = EventBus::new();
        let recorder = RecordingSubscriber::new();
        recorder.attach_async(&bus, "a");

        bus.publish("a", ContextMap::new());
        assert_eq!(recorder.count("a"), 0);
        bus.publish_async("a", ContextMap::new()).await;
        assert_eq!(recorder.count("a"), 1);
    }
}
