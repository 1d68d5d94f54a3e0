// Favorites Manager Module
// Toggle-based favorites with the same optimistic persistence as the cart

use crate::storage::{
    load_collection, Keyed, KeyValueStore, StorageKeys, StorageResult, Undo, UpdateTracker,
    WriteQueue, WriteTicket,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Favorited product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<f64>,
    #[serde(default)]
    pub store: serde_json::Value,
    pub date_added: DateTime<Utc>,
}

/// Product handed to the favorites manager; the timestamp is assigned on insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteProduct {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub discounted_price: Option<f64>,
    #[serde(default)]
    pub store: serde_json::Value,
}

impl Keyed for FavoriteItem {
    fn key(&self) -> &str {
        &self.id
    }
}

impl FavoriteItem {
    fn from_product(product: FavoriteProduct, date_added: DateTime<Utc>) -> Self {
        Self {
            id: product.id,
            title: product.title,
            image: product.image,
            price: product.price,
            discounted_price: product.discounted_price,
            store: product.store,
            date_added,
        }
    }
}

/// Single owner of the favorites set
pub struct FavoritesManager {
    items: RwLock<Vec<FavoriteItem>>,
    store: Arc<dyn KeyValueStore>,
    writer: WriteQueue,
    updates: UpdateTracker,
}

impl FavoritesManager {
    /// Create an empty favorites set. Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            writer: WriteQueue::spawn(store.clone()),
            store,
            updates: UpdateTracker::default(),
        }
    }

    pub async fn load(&self) -> StorageResult<usize> {
        let loaded = load_collection::<FavoriteItem>(self.store.as_ref(), StorageKeys::FAVORITES).await?;

        let mut seen = HashSet::new();
        let items: Vec<_> = loaded.into_iter().filter(|item| seen.insert(item.id.clone())).collect();
        let count = items.len();
        *self.items.write() = items;

        info!(items = count, "Favorites loaded from storage");
        Ok(count)
    }

    /// Flip membership of `product`; returns whether it is now a favorite
    #[instrument(skip(self, product), fields(item_id = %product.id))]
    pub async fn toggle_favorite(&self, product: FavoriteProduct) -> bool {
        let _guard = self.updates.begin();

        let (now_favorite, undo, ticket) = {
            let mut items = self.items.write();

            let (now_favorite, undo) = match items.iter().position(|item| item.id == product.id) {
                Some(index) => {
                    let item = items.remove(index);
                    (false, Undo::Reinsert { index, item })
                }
                None => {
                    let id = product.id.clone();
                    items.push(FavoriteItem::from_product(product, Utc::now()));
                    (true, Undo::Discard { id })
                }
            };

            (now_favorite, undo, self.enqueue_snapshot(&items))
        };

        if self.commit(undo, ticket).await {
            now_favorite
        } else {
            !now_favorite
        }
    }

    /// Add `product`; already present is a no-op
    #[instrument(skip(self, product), fields(item_id = %product.id))]
    pub async fn add_to_favorites(&self, product: FavoriteProduct) {
        let _guard = self.updates.begin();

        let (undo, ticket) = {
            let mut items = self.items.write();
            if items.iter().any(|item| item.id == product.id) {
                debug!("Already a favorite");
                return;
            }
            let id = product.id.clone();
            items.push(FavoriteItem::from_product(product, Utc::now()));
            (Undo::Discard { id }, self.enqueue_snapshot(&items))
        };

        self.commit(undo, ticket).await;
    }

    /// Remove `id`; absent is a no-op
    #[instrument(skip(self))]
    pub async fn remove_from_favorites(&self, id: &str) {
        let _guard = self.updates.begin();

        let (undo, ticket) = {
            let mut items = self.items.write();
            let Some(index) = items.iter().position(|item| item.id == id) else {
                return;
            };
            let item = items.remove(index);
            (Undo::Reinsert { index, item }, self.enqueue_snapshot(&items))
        };

        self.commit(undo, ticket).await;
    }

    #[instrument(skip(self))]
    pub async fn clear_favorites(&self) {
        let _guard = self.updates.begin();

        let (undo, ticket) = {
            let mut items = self.items.write();
            let cleared = std::mem::take(&mut *items);
            (Undo::Restore(cleared), Ok(self.writer.enqueue_remove(StorageKeys::FAVORITES)))
        };

        self.commit(undo, ticket).await;
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.items.read().iter().any(|item| item.id == id)
    }

    pub fn items(&self) -> Vec<FavoriteItem> {
        self.items.read().clone()
    }

    pub fn count(&self) -> usize {
        self.items.read().len()
    }

    /// Wait for every queued favorites write to land
    pub async fn flush(&self) -> StorageResult<()> {
        self.writer.flush().await
    }

    pub fn is_updating(&self) -> bool {
        self.updates.is_active()
    }

    /// Queue a write of `items`. Call with the items lock held.
    fn enqueue_snapshot(&self, items: &[FavoriteItem]) -> StorageResult<WriteTicket> {
        let json = serde_json::to_string(items)?;
        Ok(self.writer.enqueue_set(StorageKeys::FAVORITES, json))
    }

    /// Wait for the queued write; on failure reverse only this mutation.
    /// Returns whether the write landed.
    async fn commit(&self, undo: Undo<FavoriteItem>, ticket: StorageResult<WriteTicket>) -> bool {
        let result = match ticket {
            Ok(ticket) => WriteQueue::wait(ticket).await,
            Err(e) => Err(e),
        };

        let Err(e) = result else {
            return true;
        };
        error!(error = %e, "Failed to persist favorites, reverting the change");

        let mut items = self.items.write();
        undo.apply(&mut items);
        match serde_json::to_string(&*items) {
            Ok(json) => self.writer.set_detached(StorageKeys::FAVORITES, json),
            Err(e) => error!(error = %e, "Failed to encode favorites after rollback"),
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn product(id: &str) -> FavoriteProduct {
        FavoriteProduct {
            id: id.to_string(),
            title: format!("Product {}", id),
            image: Some(format!("https://cdn.example/{}.png", id)),
            price: 25.0,
            discounted_price: None,
            store: serde_json::Value::Null,
        }
    }

    fn manager() -> (Arc<MemoryStore>, FavoritesManager) {
        let store = Arc::new(MemoryStore::new());
        let favorites = FavoritesManager::new(store.clone());
        (store, favorites)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_membership() {
        let (_, favorites) = manager();

        assert!(favorites.toggle_favorite(product("a")).await);
        assert!(favorites.is_favorite("a"));

        assert!(!favorites.toggle_favorite(product("a")).await);
        assert!(!favorites.is_favorite("a"));
    }

    #[tokio::test]
    async fn test_add_existing_is_noop() {
        let (store, favorites) = manager();
        favorites.add_to_favorites(product("a")).await;
        let first = favorites.items();

        favorites.add_to_favorites(product("a")).await;
        assert_eq!(favorites.items(), first);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_toggle_rolls_back() {
        let (store, favorites) = manager();
        favorites.toggle_favorite(product("a")).await;

        store.fail_writes(true);
        assert!(favorites.toggle_favorite(product("a")).await);
        assert!(favorites.is_favorite("a"));

        assert!(!favorites.toggle_favorite(product("b")).await);
        assert_eq!(favorites.count(), 1);
    }

    #[tokio::test]
    async fn test_reload_matches_memory() {
        let (store, favorites) = manager();
        favorites.toggle_favorite(product("a")).await;
        favorites.toggle_favorite(product("b")).await;
        favorites.remove_from_favorites("a").await;

        let restarted = FavoritesManager::new(store.clone());
        restarted.load().await.unwrap();
        assert_eq!(restarted.items(), favorites.items());
    }

    #[tokio::test]
    async fn test_corrupt_storage_loads_empty() {
        let (store, favorites) = manager();
        store.set(StorageKeys::FAVORITES, "[{\"id\":").await.unwrap();

        assert_eq!(favorites.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_clear_restores_cleared_items() {
        let (store, favorites) = manager();
        favorites.toggle_favorite(product("a")).await;
        favorites.toggle_favorite(product("b")).await;

        store.fail_writes(true);
        favorites.clear_favorites().await;

        let ids: Vec<_> = favorites.items().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(!favorites.is_updating());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_toggles_persist_final_state() {
        for round in 0..25 {
            let store = Arc::new(MemoryStore::new());
            let favorites = Arc::new(FavoritesManager::new(store.clone()));

            let tasks: Vec<_> = (0..16)
                .map(|i| {
                    let favorites = favorites.clone();
                    tokio::spawn(async move {
                        let id = format!("p{}", i);
                        favorites.toggle_favorite(product(&id)).await;
                        if i % 2 == 0 {
                            favorites.toggle_favorite(product(&id)).await;
                        }
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }
            favorites.flush().await.unwrap();

            let persisted: Vec<FavoriteItem> =
                serde_json::from_str(&store.peek(StorageKeys::FAVORITES).unwrap()).unwrap();
            assert_eq!(persisted, favorites.items(), "round {}", round);
            assert_eq!(favorites.count(), 8);
        }
    }
}
