// Session and device state
// Typed accessors over the auxiliary storage keys

use super::{KeyValueStore, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Account type of the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Buyer or seller on the marketplace
    User,
    /// Courier fulfilling rides and deliveries
    Rider,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::User => write!(f, "user"),
            UserType::Rider => write!(f, "rider"),
        }
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(UserType::User),
            "rider" => Ok(UserType::Rider),
            other => Err(format!("unknown user type: {}", other)),
        }
    }
}

/// Session store shared by the CLI, the chat socket and the notification router
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn auth_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::AUTH_TOKEN).await
    }

    pub async fn set_auth_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::AUTH_TOKEN, token).await
    }

    /// Stored user type; unrecognized values read as absent
    pub async fn user_type(&self) -> StorageResult<Option<UserType>> {
        let raw = self.store.get(StorageKeys::USER_TYPE).await?;
        Ok(raw.and_then(|value| match value.parse() {
            Ok(user_type) => Some(user_type),
            Err(e) => {
                warn!(error = %e, "Ignoring stored user type");
                None
            }
        }))
    }

    pub async fn set_user_type(&self, user_type: UserType) -> StorageResult<()> {
        self.store.set(StorageKeys::USER_TYPE, &user_type.to_string()).await
    }

    pub async fn onboarding_complete(&self) -> StorageResult<bool> {
        Ok(self.store.get(StorageKeys::ONBOARDING).await?.as_deref() == Some("true"))
    }

    pub async fn set_onboarding_complete(&self) -> StorageResult<()> {
        self.store.set(StorageKeys::ONBOARDING, "true").await
    }

    pub async fn accepted_ride_id(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::ACCEPTED_RIDE_ID).await
    }

    pub async fn set_accepted_ride_id(&self, ride_id: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::ACCEPTED_RIDE_ID, ride_id).await
    }

    pub async fn clear_accepted_ride(&self) -> StorageResult<()> {
        self.store.remove(StorageKeys::ACCEPTED_RIDE_ID).await
    }

    pub async fn last_sent_push_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::LAST_SENT_PUSH_TOKEN).await
    }

    /// When the push token was last forwarded, if recorded and parseable
    pub async fn token_sent_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let raw = self.store.get(StorageKeys::TOKEN_SENT_TIMESTAMP).await?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Remember a push token the API accepted
    pub async fn record_push_token(&self, token: &str, sent_at: DateTime<Utc>) -> StorageResult<()> {
        self.store.set(StorageKeys::LAST_SENT_PUSH_TOKEN, token).await?;
        self.store
            .set(StorageKeys::TOKEN_SENT_TIMESTAMP, &sent_at.to_rfc3339())
            .await
    }

    /// Drop everything tied to the signed-in account.
    /// Onboarding state is per device and survives logout.
    pub async fn clear(&self) -> StorageResult<()> {
        for key in [
            StorageKeys::AUTH_TOKEN,
            StorageKeys::USER_TYPE,
            StorageKeys::ACCEPTED_RIDE_ID,
            StorageKeys::LAST_SENT_PUSH_TOKEN,
            StorageKeys::TOKEN_SENT_TIMESTAMP,
        ] {
            self.store.remove(key).await?;
        }

        info!("Session cleared");
        Ok(())
    }
}
