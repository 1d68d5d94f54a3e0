// Notification event bus
// Typed subscriptions per notification kind with unsubscribe-on-drop

use super::{NotificationEvent, NotificationKind};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type Handler = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

type HandlerTable = DashMap<NotificationKind, Vec<(u64, Handler)>>;

/// Fan-out of notification events to any number of subscribers
#[derive(Default)]
pub struct EventBus {
    handlers: Arc<HandlerTable>,
    next_id: AtomicU64,
}

/// Live registration on an [`EventBus`]; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: u64,
    kind: NotificationKind,
    handlers: Weak<HandlerTable>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: NotificationKind, handler: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            kind,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Deliver `event` to every subscriber of its kind; returns how many ran
    pub fn publish(&self, event: &NotificationEvent) -> usize {
        // Clone the handlers out so callbacks may subscribe or unsubscribe freely
        let handlers: Vec<Handler> = self
            .handlers
            .get(&event.kind)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, kind: NotificationKind) -> usize {
        self.handlers.get(&kind).map_or(0, |list| list.len())
    }
}

impl Subscription {
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    /// Stop receiving events
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            if let Some(mut list) = handlers.get_mut(&self.kind) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
