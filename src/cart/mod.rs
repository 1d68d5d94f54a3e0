// Cart Manager Module
// Optimistic, stock-aware cart state persisted through the ordered write queue

pub mod item;

pub use item::{CartItem, CartProduct};

use crate::storage::{
    load_collection, KeyValueStore, StorageKeys, StorageResult, Undo, UpdateTracker, WriteQueue,
    WriteTicket,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Why a cart operation was refused. Refusals never mutate the cart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartRejection {
    #[error("This item is out of stock")]
    OutOfStock { id: String },

    #[error("Cannot add more than {stock} of this item ({remaining} remaining in stock)")]
    StockExceeded { id: String, stock: u32, remaining: u32 },

    #[error("Quantity must be at least 1")]
    InvalidQuantity { requested: u32 },

    #[error("Item not found in cart")]
    ItemNotFound { id: String },
}

impl CartRejection {
    /// Human-readable message for display
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Remaining stock for stock refusals
    pub fn remaining(&self) -> Option<u32> {
        match self {
            CartRejection::StockExceeded { remaining, .. } => Some(*remaining),
            CartRejection::OutOfStock { .. } => Some(0),
            _ => None,
        }
    }
}

/// Single owner of the cart line items.
///
/// Mutations are applied to memory before the call returns. Each one queues
/// its write while still holding the lock, so storage sees snapshots in the
/// same order memory took them.
pub struct CartManager {
    items: RwLock<Vec<CartItem>>,
    store: Arc<dyn KeyValueStore>,
    writer: WriteQueue,
    updates: UpdateTracker,
}

impl CartManager {
    /// Create an empty cart. Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            writer: WriteQueue::spawn(store.clone()),
            store,
            updates: UpdateTracker::default(),
        }
    }

    /// Replace in-memory state with what storage holds
    pub async fn load(&self) -> StorageResult<usize> {
        let items = sanitize(load_collection::<CartItem>(self.store.as_ref(), StorageKeys::CART).await?);
        let count = items.len();
        *self.items.write() = items;

        info!(items = count, "Cart loaded from storage");
        Ok(count)
    }

    /// Add one unit of `product`, inserting it on first add
    #[instrument(skip(self, product), fields(item_id = %product.id))]
    pub async fn add_to_cart(&self, product: CartProduct) -> Result<u32, CartRejection> {
        let _guard = self.updates.begin();

        let (quantity, ticket) = {
            let mut items = self.items.write();

            let quantity = match items.iter_mut().find(|item| item.id == product.id) {
                Some(existing) => {
                    if existing.at_stock_limit() {
                        return Err(CartRejection::StockExceeded {
                            id: product.id,
                            stock: existing.stock_available,
                            remaining: existing.remaining_stock(),
                        });
                    }
                    existing.quantity += 1;
                    existing.quantity
                }
                None => {
                    if product.stock_available == 0 {
                        return Err(CartRejection::OutOfStock { id: product.id });
                    }
                    items.push(CartItem::from_product(product, Utc::now()));
                    1
                }
            };

            // Enqueued under the lock so queue order matches mutation order
            (quantity, self.enqueue_snapshot(&items))
        };

        if let Err(e) = settle(ticket).await {
            error!(error = %e, "Failed to persist cart, reloading from storage");
            self.reload().await;
        }

        debug!(quantity, "Item added to cart");
        Ok(quantity)
    }

    /// Remove the entry for `id`
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, id: &str) -> Result<(), CartRejection> {
        let _guard = self.updates.begin();

        let (undo, ticket) = {
            let mut items = self.items.write();
            let index = items
                .iter()
                .position(|item| item.id == id)
                .ok_or_else(|| CartRejection::ItemNotFound { id: id.to_string() })?;
            let item = items.remove(index);

            (Undo::Reinsert { index, item }, self.enqueue_snapshot(&items))
        };

        if let Err(e) = settle(ticket).await {
            error!(error = %e, "Failed to persist removal, putting the item back");
            self.roll_back(undo);
        }

        Ok(())
    }

    /// Set the quantity of an existing entry.
    ///
    /// The write is queued and this call returns without waiting for it;
    /// a failed write is logged and not reported.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, id: &str, quantity: u32) -> Result<(), CartRejection> {
        if quantity < 1 {
            return Err(CartRejection::InvalidQuantity { requested: quantity });
        }

        let guard = self.updates.begin();

        let ticket = {
            let mut items = self.items.write();
            let item = items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| CartRejection::ItemNotFound { id: id.to_string() })?;

            if quantity > item.stock_available {
                return Err(CartRejection::StockExceeded {
                    id: id.to_string(),
                    stock: item.stock_available,
                    remaining: item.remaining_stock(),
                });
            }

            item.quantity = quantity;
            self.enqueue_snapshot(&items)
        };

        let id = id.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = settle(ticket).await {
                warn!(item_id = %id, error = %e, "Background quantity write failed");
            }
        });

        Ok(())
    }

    /// Empty the cart in memory and in storage
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) {
        let _guard = self.updates.begin();

        let (undo, ticket) = {
            let mut items = self.items.write();
            let cleared = std::mem::take(&mut *items);
            (Undo::Restore(cleared), self.writer.enqueue_remove(StorageKeys::CART))
        };

        if let Err(e) = WriteQueue::wait(ticket).await {
            error!(error = %e, "Failed to clear stored cart, restoring cleared items");
            self.roll_back(undo);
            return;
        }

        info!("Cart cleared");
    }

    /// Wait for every queued cart write to land
    pub async fn flush(&self) -> StorageResult<()> {
        self.writer.flush().await
    }

    /// True while a mutation is still persisting
    pub fn is_updating(&self) -> bool {
        self.updates.is_active()
    }

    /// Snapshot of the current entries in insertion order
    pub fn items(&self) -> Vec<CartItem> {
        self.items.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Total units across all entries
    pub fn item_count(&self) -> u32 {
        self.items.read().iter().map(|item| item.quantity).sum()
    }

    pub fn is_item_in_cart(&self, id: &str) -> bool {
        self.items.read().iter().any(|item| item.id == id)
    }

    /// Quantity held for `id`, 0 when absent
    pub fn get_item_quantity(&self, id: &str) -> u32 {
        self.items
            .read()
            .iter()
            .find(|item| item.id == id)
            .map_or(0, |item| item.quantity)
    }

    /// Whether the entry for `id` already holds its whole stock snapshot
    pub fn is_item_at_stock_limit(&self, id: &str) -> bool {
        self.items
            .read()
            .iter()
            .find(|item| item.id == id)
            .is_some_and(CartItem::at_stock_limit)
    }

    /// Units of a product with `stock_available` that can still be added
    pub fn get_remaining_stock(&self, id: &str, stock_available: u32) -> u32 {
        stock_available.saturating_sub(self.get_item_quantity(id))
    }

    /// Sum of `(discounted price or price) * quantity`
    pub fn total_amount(&self) -> f64 {
        self.items.read().iter().map(CartItem::line_total).sum()
    }

    /// Queue a write of `items`. Call with the items lock held.
    fn enqueue_snapshot(&self, items: &[CartItem]) -> StorageResult<WriteTicket> {
        let json = serde_json::to_string(items)?;
        Ok(self.writer.enqueue_set(StorageKeys::CART, json))
    }

    /// Reverse one failed mutation and queue the resulting state
    fn roll_back(&self, undo: Undo<CartItem>) {
        let mut items = self.items.write();
        undo.apply(&mut items);

        match serde_json::to_string(&*items) {
            Ok(json) => self.writer.set_detached(StorageKeys::CART, json),
            Err(e) => error!(error = %e, "Failed to encode cart after rollback"),
        }
    }

    async fn reload(&self) {
        if let Err(e) = self.load().await {
            error!(error = %e, "Failed to reload cart from storage");
        }
    }
}

async fn settle(ticket: StorageResult<WriteTicket>) -> StorageResult<()> {
    WriteQueue::wait(ticket?).await
}

/// Enforce cart invariants on persisted data: unique ids, quantity >= 1
fn sanitize(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            if item.quantity == 0 {
                warn!(item_id = %item.id, "Dropping zero-quantity cart entry");
                return false;
            }
            seen.insert(item.id.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn product(id: &str, stock: u32) -> CartProduct {
        CartProduct {
            id: id.to_string(),
            title: format!("Product {}", id),
            image: None,
            store: serde_json::Value::Null,
            price: 10.0,
            discounted_price: None,
            stock_available: stock,
        }
    }

    fn manager() -> (Arc<MemoryStore>, CartManager) {
        let store = Arc::new(MemoryStore::new());
        let cart = CartManager::new(store.clone());
        (store, cart)
    }

    #[tokio::test]
    async fn test_add_increments_existing_entry() {
        let (_, cart) = manager();

        assert_eq!(cart.add_to_cart(product("a", 5)).await, Ok(1));
        assert_eq!(cart.add_to_cart(product("a", 5)).await, Ok(2));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get_item_quantity("a"), 2);
    }

    #[tokio::test]
    async fn test_add_out_of_stock() {
        let (store, cart) = manager();

        let result = cart.add_to_cart(product("a", 0)).await;
        assert_eq!(result, Err(CartRejection::OutOfStock { id: "a".into() }));
        assert!(cart.is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_add_beyond_stock_mentions_counts() {
        let (_, cart) = manager();
        cart.add_to_cart(product("a", 2)).await.unwrap();
        cart.add_to_cart(product("a", 2)).await.unwrap();

        let rejection = cart.add_to_cart(product("a", 2)).await.unwrap_err();
        assert_eq!(rejection.remaining(), Some(0));
        assert!(rejection.message().contains('2'));
        assert_eq!(cart.get_item_quantity("a"), 2);
        assert!(cart.is_item_at_stock_limit("a"));
    }

    #[tokio::test]
    async fn test_update_quantity_validation() {
        let (_, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();

        assert_eq!(
            cart.update_quantity("a", 0).await,
            Err(CartRejection::InvalidQuantity { requested: 0 })
        );
        assert_eq!(
            cart.update_quantity("missing", 1).await,
            Err(CartRejection::ItemNotFound { id: "missing".into() })
        );
        assert!(matches!(
            cart.update_quantity("a", 4).await,
            Err(CartRejection::StockExceeded { stock: 3, remaining: 2, .. })
        ));
        assert_eq!(cart.get_item_quantity("a"), 1);
    }

    #[tokio::test]
    async fn test_update_quantity_persists_in_background() {
        let (store, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();

        cart.update_quantity("a", 3).await.unwrap();
        assert_eq!(cart.get_item_quantity("a"), 3);

        cart.flush().await.unwrap();
        let persisted: Vec<CartItem> =
            serde_json::from_str(&store.peek(StorageKeys::CART).unwrap()).unwrap();
        assert_eq!(persisted[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_failed_add_reloads_from_storage() {
        let (store, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();

        store.fail_writes(true);
        cart.add_to_cart(product("b", 3)).await.unwrap();

        assert!(!cart.is_item_in_cart("b"));
        assert_eq!(cart.get_item_quantity("a"), 1);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_snapshot() {
        let (store, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();
        cart.add_to_cart(product("b", 3)).await.unwrap();
        let before = cart.items();

        store.fail_writes(true);
        cart.remove_from_cart("a").await.unwrap();

        assert_eq!(cart.items(), before);
    }

    #[tokio::test]
    async fn test_failed_clear_restores_snapshot() {
        let (store, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();

        store.fail_writes(true);
        cart.clear_cart().await;
        assert!(cart.is_item_in_cart("a"));

        store.fail_writes(false);
        cart.clear_cart().await;
        assert!(cart.is_empty());
        assert!(store.peek(StorageKeys::CART).is_none());
    }

    #[tokio::test]
    async fn test_total_amount_uses_discounts() {
        let (_, cart) = manager();
        let mut discounted = product("a", 5);
        discounted.discounted_price = Some(7.5);

        cart.add_to_cart(discounted.clone()).await.unwrap();
        cart.add_to_cart(discounted).await.unwrap();
        cart.add_to_cart(product("b", 5)).await.unwrap();

        assert_eq!(cart.total_amount(), 25.0);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.get_remaining_stock("a", 5), 3);
        assert_eq!(cart.get_remaining_stock("c", 5), 5);
    }

    #[tokio::test]
    async fn test_load_drops_duplicates_and_zero_quantities() {
        let (store, cart) = manager();
        let now = Utc::now();
        let mut zero = CartItem::from_product(product("z", 2), now);
        zero.quantity = 0;
        let items = vec![
            CartItem::from_product(product("a", 2), now),
            CartItem::from_product(product("a", 9), now),
            zero,
        ];
        store
            .set(StorageKeys::CART, &serde_json::to_string(&items).unwrap())
            .await
            .unwrap();

        assert_eq!(cart.load().await.unwrap(), 1);
        assert_eq!(cart.items()[0].stock_available, 2);
    }

    #[tokio::test]
    async fn test_is_updating_clears_after_mutation() {
        let (_, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();
        assert!(!cart.is_updating());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_mutations_persist_final_state() {
        for round in 0..25 {
            let store = Arc::new(MemoryStore::new());
            let cart = Arc::new(CartManager::new(store.clone()));

            let tasks: Vec<_> = (0..16)
                .map(|i| {
                    let cart = cart.clone();
                    tokio::spawn(async move {
                        let id = format!("p{}", i);
                        cart.add_to_cart(product(&id, 5)).await.unwrap();
                        cart.update_quantity(&id, 3).await.unwrap();
                        if i % 4 == 0 {
                            cart.remove_from_cart(&id).await.unwrap();
                        }
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }
            cart.flush().await.unwrap();

            let persisted: Vec<CartItem> =
                serde_json::from_str(&store.peek(StorageKeys::CART).unwrap()).unwrap();
            assert_eq!(persisted, cart.items(), "round {}", round);
            assert_eq!(cart.items().len(), 12);
            assert_eq!(cart.item_count(), 36);
        }
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_position_and_storage_converges() {
        let (store, cart) = manager();
        cart.add_to_cart(product("a", 3)).await.unwrap();
        cart.add_to_cart(product("b", 3)).await.unwrap();
        cart.add_to_cart(product("c", 3)).await.unwrap();

        store.fail_writes(true);
        cart.remove_from_cart("b").await.unwrap();
        let ids: Vec<_> = cart.items().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        store.fail_writes(false);
        cart.update_quantity("c", 2).await.unwrap();
        cart.flush().await.unwrap();
        let persisted: Vec<CartItem> =
            serde_json::from_str(&store.peek(StorageKeys::CART).unwrap()).unwrap();
        assert_eq!(persisted, cart.items());
    }
}
