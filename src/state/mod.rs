// Application services container
// Builds the store, managers and notification router once and hands them out by Arc

use crate::api::{ApiClient, TokenRegistrar};
use crate::cart::CartManager;
use crate::config::MovbayConfig;
use crate::favorites::FavoritesManager;
use crate::notifications::{LoggingNavigator, Navigator, NotificationRouter, PushTokenProvider, StaticTokenProvider};
use crate::socket::{ChatSocket, Connector, SocketHandlers, TungsteniteConnector};
use crate::storage::{FileStore, KeyValueStore, SessionStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators the core is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub navigator: Arc<dyn Navigator>,
    pub token_provider: Arc<dyn PushTokenProvider>,
    pub registrar: Arc<dyn TokenRegistrar>,
    pub connector: Arc<dyn Connector>,
}

impl Collaborators {
    /// Production wiring: file store, REST API, tungstenite sockets.
    /// The push token is taken from `MOVBAY_PUSH_TOKEN` when set.
    pub fn from_config(config: &MovbayConfig) -> Result<Self> {
        let store = FileStore::new(&config.storage.data_dir).with_context(|| {
            format!("Failed to open data directory {}", config.storage.data_dir.display())
        })?;
        let api = ApiClient::new(&config.api).context("Failed to create API client")?;

        Ok(Self {
            store: Arc::new(store),
            navigator: Arc::new(LoggingNavigator),
            token_provider: Arc::new(StaticTokenProvider::new(std::env::var("MOVBAY_PUSH_TOKEN").ok())),
            registrar: Arc::new(api),
            connector: Arc::new(TungsteniteConnector),
        })
    }
}

/// Single-instance services shared across the application
#[derive(Clone)]
pub struct AppServices {
    config: MovbayConfig,
    store: Arc<dyn KeyValueStore>,
    connector: Arc<dyn Connector>,
    cart: Arc<CartManager>,
    favorites: Arc<FavoritesManager>,
    session: SessionStore,
    notifications: Arc<NotificationRouter>,
}

impl AppServices {
    /// Construct every service and load persisted state.
    /// Storage read failures leave the affected collection empty.
    pub async fn bootstrap(config: MovbayConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            navigator,
            token_provider,
            registrar,
            connector,
        } = collaborators;

        let cart = Arc::new(CartManager::new(store.clone()));
        let favorites = Arc::new(FavoritesManager::new(store.clone()));
        let session = SessionStore::new(store.clone());
        let notifications = Arc::new(NotificationRouter::new(
            navigator,
            token_provider,
            registrar,
            session.clone(),
        ));

        if let Err(e) = cart.load().await {
            warn!(error = %e, "Cart could not be loaded, starting empty");
        }
        if let Err(e) = favorites.load().await {
            warn!(error = %e, "Favorites could not be loaded, starting empty");
        }

        info!(
            cart_items = cart.items().len(),
            favorites = favorites.count(),
            "Application services ready"
        );

        Self {
            config,
            store,
            connector,
            cart,
            favorites,
            session,
            notifications,
        }
    }

    pub fn config(&self) -> &MovbayConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn cart(&self) -> Arc<CartManager> {
        self.cart.clone()
    }

    pub fn favorites(&self) -> Arc<FavoritesManager> {
        self.favorites.clone()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn notifications(&self) -> Arc<NotificationRouter> {
        self.notifications.clone()
    }

    /// New chat client; each chat screen owns its own
    pub fn chat_socket(&self, handlers: SocketHandlers) -> ChatSocket {
        ChatSocket::new(self.config.socket.clone(), self.connector.clone(), handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::cart::CartProduct;
    use crate::socket::{SocketError, SocketState, Transport};
    use crate::storage::{MemoryStore, StorageKeys};
    use async_trait::async_trait;

    struct NoopRegistrar;

    #[async_trait]
    impl TokenRegistrar for NoopRegistrar {
        async fn register_push_token(&self, _push_token: &str, _auth_token: &str) -> ApiResult<()> {
            Ok(())
        }
    }

    struct Offline;

    #[async_trait]
    impl Connector for Offline {
        async fn connect(&self, _url: &str) -> Result<Transport, SocketError> {
            Err(SocketError::Connect("offline".to_string()))
        }
    }

    fn collaborators(store: Arc<MemoryStore>) -> Collaborators {
        Collaborators {
            store,
            navigator: Arc::new(LoggingNavigator),
            token_provider: Arc::new(StaticTokenProvider::default()),
            registrar: Arc::new(NoopRegistrar),
            connector: Arc::new(Offline),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_loads_persisted_cart() {
        let store = Arc::new(MemoryStore::new());
        {
            let services = AppServices::bootstrap(MovbayConfig::default(), collaborators(store.clone())).await;
            services
                .cart()
                .add_to_cart(CartProduct {
                    id: "a".into(),
                    title: "A".into(),
                    image: None,
                    store: serde_json::Value::Null,
                    price: 5.0,
                    discounted_price: None,
                    stock_available: 1,
                })
                .await
                .unwrap();
        }

        let restarted = AppServices::bootstrap(MovbayConfig::default(), collaborators(store)).await;
        assert!(restarted.cart().is_item_in_cart("a"));
    }

    #[tokio::test]
    async fn test_bootstrap_survives_unreadable_store() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKeys::FAVORITES, "[]").await.unwrap();
        store.fail_reads(true);

        let services = AppServices::bootstrap(MovbayConfig::default(), collaborators(store)).await;
        assert!(services.cart().is_empty());
        assert_eq!(services.favorites().count(), 0);
    }

    #[tokio::test]
    async fn test_services_share_instances() {
        let services = AppServices::bootstrap(MovbayConfig::default(), collaborators(Arc::new(MemoryStore::new()))).await;
        let clone = services.clone();

        assert!(Arc::ptr_eq(&services.cart(), &clone.cart()));
        assert!(Arc::ptr_eq(&services.notifications(), &clone.notifications()));
        assert_eq!(services.chat_socket(SocketHandlers::new()).state(), SocketState::Idle);
    }
}
