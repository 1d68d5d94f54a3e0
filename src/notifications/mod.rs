// Notification Routing Module
// Push token registration, notification classification, dispatch and navigation

pub mod bus;
pub mod kind;

pub use bus::{EventBus, Subscription};
pub use kind::{NotificationAction, NotificationKind};

use crate::api::TokenRegistrar;
use crate::storage::SessionStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Screen navigation, provided by the host application
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Source of the device's push-delivery token, provided by the host platform
#[async_trait]
pub trait PushTokenProvider: Send + Sync {
    /// `None` when permission is denied or the platform has no token
    async fn push_token(&self) -> Option<String>;
}

/// Navigator that only records the requested route in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: &str) {
        info!(route = %route, "Navigation requested");
    }
}

/// Token provider with a fixed token
#[derive(Debug, Default, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl PushTokenProvider for StaticTokenProvider {
    async fn push_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Incoming push or local notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Structured payload; a string `kind` field takes precedence over the title
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Notification {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Structured tag first, legacy title table second
    pub fn classify(&self) -> Option<NotificationKind> {
        self.data
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .and_then(NotificationKind::from_tag)
            .or_else(|| self.title.as_deref().and_then(NotificationKind::from_legacy_title))
    }

    fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(serde_json::Value::as_str)
    }
}

/// How the notification reached the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Delivered while the app was running
    Received,
    /// Opened by the user
    Tapped,
}

/// Event published to subscribers
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub trigger: Trigger,
    pub notification: Notification,
}

/// Process-wide notification service; construct once at startup
pub struct NotificationRouter {
    bus: EventBus,
    navigator: Arc<dyn Navigator>,
    token_provider: Arc<dyn PushTokenProvider>,
    registrar: Arc<dyn TokenRegistrar>,
    session: SessionStore,
    initialized: AtomicBool,
    token_registered: AtomicBool,
    should_refresh: AtomicBool,
}

impl NotificationRouter {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        token_provider: Arc<dyn PushTokenProvider>,
        registrar: Arc<dyn TokenRegistrar>,
        session: SessionStore,
    ) -> Self {
        Self {
            bus: EventBus::new(),
            navigator,
            token_provider,
            registrar,
            session,
            initialized: AtomicBool::new(false),
            token_registered: AtomicBool::new(false),
            should_refresh: AtomicBool::new(false),
        }
    }

    /// Acquire and forward the push token. Runs once per process; later calls return `false`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Notification router already initialized");
            return false;
        }

        info!("Initializing notification router");

        match self.token_provider.push_token().await {
            Some(token) => self.register_token(&token).await,
            None => warn!("No push token available, remote notifications disabled"),
        }

        true
    }

    /// Forward `token` unless it is the one already on record
    async fn register_token(&self, token: &str) {
        match self.session.last_sent_push_token().await {
            Ok(Some(last)) if last == token => {
                debug!("Push token unchanged since last registration");
                self.token_registered.store(true, Ordering::SeqCst);
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read last sent push token"),
        }

        let auth_token = match self.session.auth_token().await {
            Ok(Some(auth_token)) => auth_token,
            Ok(None) => {
                warn!("Not signed in, push token registration skipped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read auth token, push token registration skipped");
                return;
            }
        };

        match self.registrar.register_push_token(token, &auth_token).await {
            Ok(()) => {
                self.token_registered.store(true, Ordering::SeqCst);
                if let Err(e) = self.session.record_push_token(token, Utc::now()).await {
                    warn!(error = %e, "Push token registered but not recorded");
                }
            }
            Err(e) => warn!(error = %e, "Push token registration failed"),
        }
    }

    /// Listen for notifications of `kind` until the subscription is dropped
    pub fn subscribe<F>(&self, kind: NotificationKind, handler: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    /// Entry point for notifications delivered while the app runs
    pub async fn on_notification_received(&self, notification: Notification) -> Option<NotificationKind> {
        self.route(notification, Trigger::Received).await
    }

    /// Entry point for notifications the user opened
    pub async fn on_notification_tapped(&self, notification: Notification) -> Option<NotificationKind> {
        self.route(notification, Trigger::Tapped).await
    }

    #[instrument(skip(self, notification), fields(title = ?notification.title))]
    async fn route(&self, notification: Notification, trigger: Trigger) -> Option<NotificationKind> {
        self.should_refresh.store(true, Ordering::SeqCst);

        let Some(kind) = notification.classify() else {
            info!(trigger = ?trigger, "Unhandled notification");
            return None;
        };

        self.track_ride(kind, &notification).await;

        let action = kind.action();
        let event = NotificationEvent {
            kind,
            trigger,
            notification,
        };

        if action.notify {
            let delivered = self.bus.publish(&event);
            debug!(kind = %kind, delivered, "Notification dispatched");
        }

        if trigger == Trigger::Tapped {
            if let Some(route) = action.route {
                self.navigator.navigate(route);
            }
        }

        Some(kind)
    }

    /// Keep the accepted ride id in step with ride notifications
    async fn track_ride(&self, kind: NotificationKind, notification: &Notification) {
        let result = match kind {
            NotificationKind::RideAccepted => match notification.data_str("ride_id") {
                Some(ride_id) => self.session.set_accepted_ride_id(ride_id).await,
                None => Ok(()),
            },
            NotificationKind::RideCancelled => self.session.clear_accepted_ride().await,
            _ => Ok(()),
        };

        if let Err(e) = result {
            warn!(kind = %kind, error = %e, "Failed to update accepted ride");
        }
    }

    /// True once any notification arrived since the last `clear_refresh`
    pub fn should_refresh(&self) -> bool {
        self.should_refresh.load(Ordering::SeqCst)
    }

    pub fn clear_refresh(&self) {
        self.should_refresh.store(false, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether the current push token is known to the backend
    pub fn token_registered(&self) -> bool {
        self.token_registered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResult};
    use crate::storage::{KeyValueStore, MemoryStore, StorageKeys};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingNavigator {
        routes: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: &str) {
            self.routes.lock().push(route.to_string());
        }
    }

    #[derive(Default)]
    struct CountingRegistrar {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl TokenRegistrar for CountingRegistrar {
        async fn register_push_token(&self, _push_token: &str, _auth_token: &str) -> ApiResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(ApiError::Rejected {
                    status: 400,
                    reason: "Invalid token".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        navigator: Arc<RecordingNavigator>,
        registrar: Arc<CountingRegistrar>,
        router: NotificationRouter,
    }

    fn fixture(token: Option<&str>, registrar: CountingRegistrar) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let registrar = Arc::new(registrar);
        let router = NotificationRouter::new(
            navigator.clone(),
            Arc::new(StaticTokenProvider::new(token.map(str::to_string))),
            registrar.clone(),
            SessionStore::new(store.clone()),
        );
        Fixture {
            store,
            navigator,
            registrar,
            router,
        }
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let f = fixture(Some("push-1"), CountingRegistrar::default());
        f.store.set(StorageKeys::AUTH_TOKEN, "session").await.unwrap();

        assert!(f.router.initialize().await);
        assert!(!f.router.initialize().await);
        assert_eq!(f.registrar.calls.load(Ordering::SeqCst), 1);
        assert!(f.router.token_registered());
        assert_eq!(f.store.peek(StorageKeys::LAST_SENT_PUSH_TOKEN).as_deref(), Some("push-1"));
    }

    #[tokio::test]
    async fn test_unchanged_token_not_resent() {
        let f = fixture(Some("push-1"), CountingRegistrar::default());
        f.store.set(StorageKeys::AUTH_TOKEN, "session").await.unwrap();
        f.store.set(StorageKeys::LAST_SENT_PUSH_TOKEN, "push-1").await.unwrap();

        f.router.initialize().await;
        assert_eq!(f.registrar.calls.load(Ordering::SeqCst), 0);
        assert!(f.router.token_registered());
    }

    #[tokio::test]
    async fn test_rejected_token_is_best_effort() {
        let f = fixture(
            Some("push-1"),
            CountingRegistrar {
                reject: true,
                ..CountingRegistrar::default()
            },
        );
        f.store.set(StorageKeys::AUTH_TOKEN, "session").await.unwrap();

        assert!(f.router.initialize().await);
        assert!(!f.router.token_registered());
        assert!(f.store.peek(StorageKeys::LAST_SENT_PUSH_TOKEN).is_none());
    }

    #[tokio::test]
    async fn test_signed_out_skips_registration() {
        let f = fixture(Some("push-1"), CountingRegistrar::default());

        f.router.initialize().await;
        assert_eq!(f.registrar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tap_navigates() {
        let f = fixture(None, CountingRegistrar::default());

        f.router.on_notification_received(Notification::titled("New Order Available")).await;
        assert!(f.navigator.routes.lock().is_empty());

        f.router.on_notification_tapped(Notification::titled("New Order Available")).await;
        assert_eq!(*f.navigator.routes.lock(), vec!["/seller/orders".to_string()]);
    }

    #[tokio::test]
    async fn test_structured_kind_wins_over_title() {
        let f = fixture(None, CountingRegistrar::default());
        let notification = Notification::titled("Something new")
            .with_data(serde_json::json!({ "kind": "new_message" }));

        assert_eq!(
            f.router.on_notification_received(notification).await,
            Some(NotificationKind::NewMessage)
        );
    }

    #[tokio::test]
    async fn test_unmatched_title_sets_refresh_only() {
        let f = fixture(None, CountingRegistrar::default());
        assert!(!f.router.should_refresh());

        assert_eq!(f.router.on_notification_tapped(Notification::titled("Promo")).await, None);
        assert!(f.router.should_refresh());
        assert!(f.navigator.routes.lock().is_empty());

        f.router.clear_refresh();
        assert!(!f.router.should_refresh());
    }

    #[tokio::test]
    async fn test_ride_notifications_track_ride_id() {
        let f = fixture(None, CountingRegistrar::default());

        let accepted = Notification::titled("Ride Accepted")
            .with_data(serde_json::json!({ "ride_id": "ride-9" }));
        f.router.on_notification_received(accepted).await;
        assert_eq!(f.store.peek(StorageKeys::ACCEPTED_RIDE_ID).as_deref(), Some("ride-9"));

        f.router
            .on_notification_received(Notification::titled("Ride has been canceled by sender"))
            .await;
        assert!(f.store.peek(StorageKeys::ACCEPTED_RIDE_ID).is_none());
    }
}
