// REST API Client Module
// Thin reqwest wrapper for the endpoints the client core talks to directly

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;

/// Path of the push token registration endpoint
pub const PUSH_TOKEN_PATH: &str = "/notification/fcm-token/";

/// Error type for API calls.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Forwards push-delivery tokens to the backend
#[async_trait]
pub trait TokenRegistrar: Send + Sync {
    async fn register_push_token(&self, push_token: &str, auth_token: &str) -> ApiResult<()>;
}

#[derive(Debug, Serialize)]
struct PushTokenRequest<'a> {
    token: &'a str,
}

/// HTTP client for the Movbay REST API
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if reqwest::Url::parse(&base_url).is_err() {
            return Err(ApiError::InvalidBaseUrl(config.base_url.clone()));
        }

        // reqwest has no overall default; bound each request so registration cannot hang
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl TokenRegistrar for ApiClient {
    async fn register_push_token(&self, push_token: &str, auth_token: &str) -> ApiResult<()> {
        let url = self.endpoint(PUSH_TOKEN_PATH);
        debug!(url = %url, "Registering push token");

        let response = self
            .client
            .post(&url)
            .bearer_auth(auth_token)
            .json(&PushTokenRequest { token: push_token })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Push token registered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let reason = rejection_reason(&body).unwrap_or_else(|| status.to_string());
        warn!(status = status.as_u16(), reason = %reason, "Push token rejected");

        Err(ApiError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

/// Pull the human-readable reason out of an error body's `token` field.
/// The field is either a string or a list of strings.
fn rejection_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("token")? {
        serde_json::Value::String(reason) => Some(reason.clone()),
        serde_json::Value::Array(reasons) => {
            let joined: Vec<&str> = reasons.iter().filter_map(|r| r.as_str()).collect();
            (!joined.is_empty()).then(|| joined.join("; "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: format!("{}/", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_rejection_reason_shapes() {
        assert_eq!(rejection_reason(r#"{"token":"already registered"}"#).as_deref(), Some("already registered"));
        assert_eq!(rejection_reason(r#"{"token":["bad","worse"]}"#).as_deref(), Some("bad; worse"));
        assert_eq!(rejection_reason(r#"{"detail":"nope"}"#), None);
        assert_eq!(rejection_reason("<html>"), None);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(&ApiConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(ApiError::InvalidBaseUrl(_))));
    }

    #[tokio::test]
    async fn test_register_push_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PUSH_TOKEN_PATH))
            .and(header("authorization", "Bearer session-1"))
            .and(body_json(serde_json::json!({ "token": "push-abc" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).register_push_token("push-abc", "session-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_register_push_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PUSH_TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({ "token": ["Invalid token"] })),
            )
            .mount(&server)
            .await;

        let err = client(&server).register_push_token("bad", "session-1").await.unwrap_err();
        match err {
            ApiError::Rejected { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "Invalid token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stalled_registration_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PUSH_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&ApiConfig {
            base_url: server.uri(),
            timeout_secs: 1,
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.register_push_token("push-abc", "session-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Http(ref e) if e.is_timeout()), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
