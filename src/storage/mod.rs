// Persistent Key-Value Storage Module
// Durable string-keyed storage shared by the cart, favorites and session state

pub mod file;
pub mod memory;
pub mod session;
pub mod undo;
pub mod write_queue;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use session::{SessionStore, UserType};
pub use undo::{Keyed, Undo};
pub use write_queue::{UpdateGuard, UpdateTracker, WriteQueue, WriteTicket};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Cart line items (JSON array)
    pub const CART: &'static str = "cart";

    /// Favorited items (JSON array)
    pub const FAVORITES: &'static str = "favorites";

    /// Bearer token for the REST API and chat socket
    pub const AUTH_TOKEN: &'static str = "movebay_token";

    /// Account type of the signed-in user
    pub const USER_TYPE: &'static str = "movebay_usertype";

    /// Onboarding completion flag
    pub const ONBOARDING: &'static str = "movebay_onboarding";

    /// Ride the rider is currently servicing
    pub const ACCEPTED_RIDE_ID: &'static str = "accepted_ride_id";

    /// Push token last forwarded to the API
    pub const LAST_SENT_PUSH_TOKEN: &'static str = "last_sent_push_token";

    /// When the push token was last forwarded (RFC 3339)
    pub const TOKEN_SENT_TIMESTAMP: &'static str = "token_sent_timestamp";
}

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Key cannot be mapped to a backing location
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The writer task is gone
    #[error("Write queue closed")]
    QueueClosed,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable string-keyed storage.
///
/// Implementations must be safe to share between managers; each manager is
/// the only writer of its own key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Load a JSON array stored under `key`.
///
/// Absent keys and corrupt payloads both yield an empty collection; only
/// backend read failures are reported.
pub async fn load_collection<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Vec<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding corrupt persisted collection");
            Ok(Vec::new())
        }
    }
}
