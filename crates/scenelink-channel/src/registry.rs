//! Typed event subscription registry.
//!
//! Keyed by event-type string and held independently of any connection, so
//! reconnects never drop handlers. Dispatch runs handlers synchronously in
//! registration order under the registry lock; `unsubscribe` takes the
//! write side of that lock, so once it returns the handler will not run
//! again. Handlers must not subscribe or unsubscribe from within
//! themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use scenelink_core::events::PushEvent;

type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

/// Registry of push-event handlers keyed by event type.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`. The returned [`Subscription`]
    /// is the only way to remove it.
    #[must_use]
    pub fn subscribe<F>(self: &Arc<Self>, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .entry(event_type.to_owned())
            .or_default()
            .push(Entry {
                id,
                handler: Arc::new(handler),
            });
        Subscription {
            registry: Arc::downgrade(self),
            event_type: event_type.to_owned(),
            id,
        }
    }

    /// Invoke every handler registered for this event's type, in
    /// registration order.
    pub fn dispatch(&self, event: &PushEvent) {
        let entries = self.entries.read();
        if let Some(list) = entries.get(event.event_type()) {
            for entry in list {
                (entry.handler)(event);
            }
        }
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.entries
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    fn remove(&self, event_type: &str, id: u64) {
        let mut entries = self.entries.write();
        if let Some(list) = entries.get_mut(event_type) {
            list.retain(|e| e.id != id);
            if list.is_empty() {
                let _ = entries.remove(event_type);
            }
        }
    }
}

/// Handle to a registered handler.
#[must_use = "dropping a Subscription without calling unsubscribe leaves the handler registered"]
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    event_type: String,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Synchronous: after this returns the handler is
    /// not invoked again, even for an event already in flight.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use scenelink_core::ids::RequestId;

    fn ended(id: &str) -> PushEvent {
        PushEvent::SessionEnded {
            request_id: RequestId::from(id),
        }
    }

    #[test]
    fn dispatch_reaches_only_matching_type() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();

        let seen_a = Arc::clone(&seen);
        let _sub_a = registry.subscribe("chat.session.ended", move |e| {
            seen_a.lock().push(e.event_type().to_owned());
        });
        let seen_b = Arc::clone(&seen);
        let _sub_b = registry.subscribe("scene.ended", move |e| {
            seen_b.lock().push(format!("wrong: {}", e.event_type()));
        });

        registry.dispatch(&ended("r1"));
        assert_eq!(&*seen.lock(), &["chat.session.ended".to_owned()]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let order: Arc<Mutex<Vec<u8>>> = Arc::default();

        let o1 = Arc::clone(&order);
        let _s1 = registry.subscribe("chat.session.ended", move |_| o1.lock().push(1));
        let o2 = Arc::clone(&order);
        let _s2 = registry.subscribe("chat.session.ended", move |_| o2.lock().push(2));
        let o3 = Arc::clone(&order);
        let _s3 = registry.subscribe("chat.session.ended", move |_| o3.lock().push(3));

        registry.dispatch(&ended("r1"));
        assert_eq!(&*order.lock(), &[1, 2, 3]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let count: Arc<Mutex<u32>> = Arc::default();

        let c = Arc::clone(&count);
        let sub = registry.subscribe("chat.session.ended", move |_| *c.lock() += 1);

        registry.dispatch(&ended("r1"));
        sub.unsubscribe();
        registry.dispatch(&ended("r2"));

        assert_eq!(*count.lock(), 1);
        assert_eq!(registry.handler_count("chat.session.ended"), 0);
    }

    #[test]
    fn unsubscribing_one_handler_leaves_the_others() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let count: Arc<Mutex<u32>> = Arc::default();

        let c1 = Arc::clone(&count);
        let sub1 = registry.subscribe("chat.session.ended", move |_| *c1.lock() += 1);
        let c2 = Arc::clone(&count);
        let _sub2 = registry.subscribe("chat.session.ended", move |_| *c2.lock() += 10);

        sub1.unsubscribe();
        registry.dispatch(&ended("r1"));
        assert_eq!(*count.lock(), 10);
    }

    #[test]
    fn unsubscribe_after_registry_drop_is_harmless() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let sub = registry.subscribe("scene.ended", |_| {});
        drop(registry);
        sub.unsubscribe();
    }

    #[test]
    fn dispatch_with_no_handlers_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        registry.dispatch(&ended("r1"));
    }
}
