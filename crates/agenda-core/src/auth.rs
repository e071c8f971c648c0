//! OAuth 2.0 refresh-token lifecycle.
//!
//! [`TokenManager`] guarantees that every outbound call carries a
//! non-expired bearer token, refreshing transparently when needed. Callers
//! never see a "refreshing" state: token state lives behind one async mutex,
//! so concurrent callers that both observe an expired token share a single
//! refresh instead of racing the token endpoint (a race would be unsafe with
//! providers that rotate the refresh token).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Details, Error, Result};

/// Tokens are treated as expired this long before their actual expiry, to
/// protect against a token expiring mid-flight.
const SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Timeout for token-endpoint requests.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Source of bearer tokens for the request pipeline.
///
/// Implemented by [`TokenManager`] for OAuth providers and by
/// [`StaticToken`] for APIs authenticated with a fixed integration token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token currently valid for use in an Authorization header.
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed bearer token (e.g. a Notion internal-integration secret).
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Destination for refreshed credentials.
///
/// When the provider rotates the refresh token, the manager persists the new
/// pair through this hook before returning. Persistence failures are logged
/// and never abort a refresh; the in-memory token is still valid.
pub trait CredentialSink: Send + Sync {
    fn persist_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()>;
}

/// OAuth refresh-token manager.
pub struct TokenManager {
    http: reqwest::Client,
    token_uri: String,
    client_id: String,
    client_secret: String,
    state: Mutex<TokenState>,
    sink: Option<Arc<dyn CredentialSink>>,
}

struct TokenState {
    access_token: Option<String>,
    expires_at: Option<Instant>,
    refresh_token: String,
}

impl TokenState {
    fn is_expired(&self) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expiry)) => match expiry.checked_sub(SAFETY_MARGIN) {
                Some(deadline) => Instant::now() >= deadline,
                None => true,
            },
            _ => true,
        }
    }
}

impl TokenManager {
    /// Create a manager for the given token endpoint and client credentials.
    pub fn new(
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REFRESH_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            state: Mutex::new(TokenState {
                access_token: None,
                expires_at: None,
                refresh_token: refresh_token.into(),
            }),
            sink: None,
        }
    }

    /// Seed an access token already known at startup. It carries no expiry,
    /// so the first use still triggers a refresh.
    pub fn with_seed_token(self, access_token: Option<String>) -> Self {
        if let Some(token) = access_token {
            self.state
                .try_lock()
                .expect("state lock is free during construction")
                .access_token = Some(token);
        }
        self
    }

    /// Persist rotated credentials through the given sink.
    pub fn with_sink(mut self, sink: Arc<dyn CredentialSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Whether the held token is missing, has no recorded expiry, or is
    /// within the safety margin of expiring.
    pub async fn is_expired(&self) -> bool {
        self.state.lock().await.is_expired()
    }

    /// Return a valid access token, refreshing first if needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.is_expired() {
            tracing::info!("Access token expired or missing, refreshing");
            self.refresh_locked(&mut state).await?;
        }
        state
            .access_token
            .clone()
            .ok_or_else(|| Error::auth("Token refresh did not produce an access token"))
    }

    /// Force a refresh and return the new access token.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await?;
        state
            .access_token
            .clone()
            .ok_or_else(|| Error::auth("Token refresh did not produce an access token"))
    }

    /// Exchange the refresh token for a new access token. Called with the
    /// state lock held, which serializes concurrent refreshes.
    async fn refresh_locked(&self, state: &mut TokenState) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::config("Client ID is not configured", "client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(Error::config(
                "Client secret is not configured",
                "client_secret",
            ));
        }
        if state.refresh_token.is_empty() {
            return Err(Error::config(
                "Refresh token is not configured",
                "refresh_token",
            ));
        }

        tracing::debug!(token_uri = %self.token_uri, "Requesting new access token");

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", state.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(REFRESH_TIMEOUT.as_secs_f64())
                } else {
                    let mut details = Details::new();
                    details.insert("token_uri".into(), Value::String(self.token_uri.clone()));
                    details.insert("cause".into(), Value::String(e.to_string()));
                    Error::network("Token refresh request failed", details)
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status >= 400 {
            return Err(token_error(status, &body));
        }

        let token_data: Value = serde_json::from_str(&body).map_err(|_| {
            let mut details = Details::new();
            details.insert("response_text".into(), Value::String(truncate(&body)));
            Error::auth_with("Failed to parse token response", details)
        })?;

        let access_token = token_data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let mut details = Details::new();
                details.insert("response".into(), token_data.clone());
                Error::auth_with("Token response did not contain an access token", details)
            })?
            .to_string();

        let expires_in = token_data
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_EXPIRES_IN);

        state.access_token = Some(access_token.clone());
        state.expires_at = Some(Instant::now() + Duration::from_secs(expires_in));

        // The provider may rotate the refresh token; the new value must be
        // used for every subsequent refresh and persisted where possible.
        if let Some(rotated) = token_data.get("refresh_token").and_then(Value::as_str) {
            if rotated != state.refresh_token {
                tracing::info!("Provider rotated the refresh token");
                state.refresh_token = rotated.to_string();
                if let Some(sink) = &self.sink {
                    if let Err(e) = sink.persist_tokens(&access_token, rotated) {
                        tracing::warn!(error = %e, "Failed to persist rotated credentials");
                    }
                }
            }
        }

        tracing::info!(expires_in, "Access token refreshed");
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn bearer_token(&self) -> Result<String> {
        self.access_token().await
    }
}

/// Map a token-endpoint error response to an authentication error carrying
/// the provider's `error` / `error_description`.
fn token_error(status: u16, body: &str) -> Error {
    let (message, code) = match serde_json::from_str::<Value>(body) {
        Ok(data) => {
            let code = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            let message = data
                .get("error_description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| code.clone());
            (message, code)
        }
        Err(_) => (
            format!("HTTP {}: {}", status, truncate(body)),
            "parse_error".to_string(),
        ),
    };

    tracing::error!(status, error_code = %code, "Token refresh failed");

    let mut details = Details::new();
    details.insert("status_code".into(), status.into());
    details.insert("error_code".into(), Value::String(code));
    Error::auth_with(format!("Failed to refresh access token: {message}"), details)
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

// =============================================================================
// Tests
// =============================================================================
