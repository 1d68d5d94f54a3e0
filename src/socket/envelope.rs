// Chat wire helpers
// Outbound envelope, endpoint URL and reconnect backoff

use super::SocketError;
use crate::config::SocketConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Message type tag the chat server expects on every outbound message
pub const CHAT_MESSAGE_TYPE: &str = "chat_message";

/// Outbound chat envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: String,
    /// ISO-8601 UTC with millisecond precision
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl OutboundMessage {
    pub fn chat(content: &str, image_url: Option<&str>, sent_at: DateTime<Utc>) -> Self {
        Self {
            content: content.to_string(),
            message_type: CHAT_MESSAGE_TYPE.to_string(),
            timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            image_url: image_url.map(str::to_string),
        }
    }

    pub fn to_json(&self) -> Result<String, SocketError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `<scheme>://<host>/ws/chat/<room>/?token=<token>`
pub fn chat_url(config: &SocketConfig, room_id: &str, token: &str) -> Result<Url, SocketError> {
    if room_id.trim().is_empty() {
        return Err(SocketError::InvalidUrl("room id is empty".to_string()));
    }

    let base = format!("{}://{}/", config.scheme, config.host);
    let mut url = Url::parse(&base).map_err(|e| SocketError::InvalidUrl(format!("{}: {}", base, e)))?;

    url.path_segments_mut()
        .map_err(|_| SocketError::InvalidUrl(base.clone()))?
        .pop_if_empty()
        .extend(["ws", "chat", room_id, ""]);
    url.query_pairs_mut().append_pair("token", token);

    Ok(url)
}

/// Exponential backoff delay: base * 2^attempt, capped at max
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(max_ms))
}
