//! Synchronous event bus for distribution events

use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use super::event::{DistributionEvent, DistributionEventType};

/// Callback receiving distribution events
pub type EventHandler = Arc<dyn Fn(&DistributionEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: Option<DistributionEventType>,
    handler: EventHandler,
}

/// Delivers events to subscribers in registration order on the emitting task
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event
    pub fn subscribe(&self, handler: EventHandler) -> SubscriptionId {
        self.add(None, handler)
    }

    /// Receive events of one type only
    pub fn subscribe_to(
        &self,
        event_type: DistributionEventType,
        handler: EventHandler,
    ) -> SubscriptionId {
        self.add(Some(event_type), handler)
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Deliver an event
    ///
    /// Handlers run after the subscriber list lock is released, so a handler
    /// may subscribe or unsubscribe.
    pub fn emit(&self, event: &DistributionEvent) {
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.filter.is_none_or(|t| t == event.event_type))
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add(&self, filter: Option<DistributionEventType>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                filter,
                handler,
            });
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;

    fn recorder() -> (EventHandler, Arc<Mutex<Vec<DistributionEventType>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |event: &DistributionEvent| {
            sink.lock().unwrap().push(event.event_type);
        });
        (handler, seen)
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        bus.subscribe(handler);

        let run = Uuid::new_v4();
        bus.emit(&DistributionEvent::started(run, 2));
        bus.emit(&DistributionEvent::complete(run, 2, 0, 10));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![DistributionEventType::Started, DistributionEventType::Complete]
        );
    }

    #[test]
    fn test_filtered_subscription() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        bus.subscribe_to(DistributionEventType::Warning, handler);

        let run = Uuid::new_v4();
        bus.emit(&DistributionEvent::started(run, 1));
        bus.emit(&DistributionEvent::warning(run, "unassigned", Some("a")));

        assert_eq!(*seen.lock().unwrap(), vec![DistributionEventType::Warning]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        let id = bus.subscribe(handler);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&DistributionEvent::started(Uuid::new_v4(), 1));
        assert!(seen.lock().unwrap().is_empty());
        assert!(bus.is_empty());
    }
}
