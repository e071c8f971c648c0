//! Error types for agenda-tools.
//!
//! Every failure path in the request pipeline produces exactly one [`Error`].
//! Retryable kinds (rate-limit, conflict, server, network, timeout) may be
//! swallowed across attempts inside the pipeline; everything else propagates
//! to the caller immediately.

use serde_json::Value;
use thiserror::Error;

/// Machine-readable detail map attached to most error kinds.
pub type Details = serde_json::Map<String, Value>;

/// Main error type for agenda operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (names the offending key)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        key: Option<String>,
    },

    /// Authentication failed (401 or token refresh failure)
    #[error("Authentication error: {message}")]
    Auth { message: String, details: Details },

    /// Access to the resource is forbidden (403)
    #[error("Permission error: {message}")]
    Permission { message: String, details: Details },

    /// Resource does not exist (404)
    #[error("Not found: {message}")]
    NotFound { message: String, details: Details },

    /// Request was rejected as invalid (400)
    #[error("Validation error: {message}")]
    Validation { message: String, details: Details },

    /// Write conflicted with concurrent modification (409)
    #[error("Conflict: {message}")]
    Conflict { message: String, details: Details },

    /// Rate limit exceeded (429), with the provider's Retry-After hint
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
        details: Details,
    },

    /// Upstream server error (5xx)
    #[error("Server error ({status}): {message}")]
    Server {
        status: u16,
        message: String,
        details: Details,
    },

    /// Any other API-level error, carrying the provider's error code
    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        details: Details,
    },

    /// Transport-level failure (connect, DNS, reset)
    #[error("Network error: {message}")]
    Network { message: String, details: Details },

    /// Request deadline exceeded
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: f64 },

    /// Response body could not be decoded into the expected shape
    #[error("Data parsing error: {message}")]
    DataParsing { message: String, details: Details },

    /// Cache-layer failure (reserved, not expected in normal operation)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Credential storage failure. Never fatal to a request: callers log
    /// and continue with in-memory state.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for agenda operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bytes of raw body kept when an error response cannot be parsed.
const RAW_BODY_LIMIT: usize = 200;

impl Error {
    /// Configuration error naming the missing/invalid key.
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn auth_with(message: impl Into<String>, details: Details) -> Self {
        Self::Auth {
            message: message.into(),
            details,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn network(message: impl Into<String>, details: Details) -> Self {
        Self::Network {
            message: message.into(),
            details,
        }
    }

    pub fn timeout(timeout_secs: f64) -> Self {
        Self::Timeout { timeout_secs }
    }

    pub fn data_parsing(message: impl Into<String>, details: Details) -> Self {
        Self::DataParsing {
            message: message.into(),
            details,
        }
    }

    /// Map an HTTP error response (status + raw body) to a typed error.
    ///
    /// Understands both provider error envelopes:
    /// Google nests the payload under `"error"` (`{"error":{"code":404,...}}`),
    /// Notion returns it flat (`{"status":404,"code":"...","message":"..."}`).
    /// An unparseable body becomes a data-parsing error carrying the
    /// truncated raw text.
    pub fn from_response(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => {
                let mut details = Details::new();
                details.insert("status_code".into(), status.into());
                return Self::data_parsing(
                    format!("Failed to parse error response: {}", truncate(body)),
                    details,
                );
            }
        };

        // Unwrap Google's {"error": {...}} envelope; Notion bodies are flat.
        let envelope = parsed.get("error").filter(|v| v.is_object()).unwrap_or(&parsed);

        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("An unknown error occurred")
            .to_string();
        let code = match envelope.get("code") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "unknown_error".to_string(),
        };
        // Providers may report their own numeric status; prefer it.
        let effective_status = envelope
            .get("status")
            .and_then(Value::as_u64)
            .or_else(|| envelope.get("code").and_then(Value::as_u64))
            .map(|s| s as u16)
            .unwrap_or(status);

        let mut details = Details::new();
        details.insert("status_code".into(), effective_status.into());
        details.insert("error_code".into(), Value::String(code.clone()));
        if let Some(errors) = envelope.get("errors") {
            details.insert("errors".into(), errors.clone());
        }

        match effective_status {
            400 => Self::Validation { message, details },
            401 => Self::Auth { message, details },
            403 => Self::Permission { message, details },
            404 => Self::NotFound { message, details },
            409 => Self::Conflict { message, details },
            429 => {
                if let Some(secs) = retry_after {
                    details.insert("retry_after".into(), secs.into());
                }
                Self::RateLimited {
                    message,
                    retry_after,
                    details,
                }
            }
            s if s >= 500 => Self::Server {
                status: s,
                message,
                details,
            },
            s => Self::Api {
                status: s,
                code,
                message,
                details,
            },
        }
    }

    /// Whether the pipeline may recover from this error by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Conflict { .. }
                | Self::Server { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
        )
    }

    /// Retry-After hint in seconds, if the provider supplied one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Structured detail map, empty for kinds that carry none.
    pub fn details(&self) -> Details {
        match self {
            Self::Auth { details, .. }
            | Self::Permission { details, .. }
            | Self::NotFound { details, .. }
            | Self::Validation { details, .. }
            | Self::Conflict { details, .. }
            | Self::RateLimited { details, .. }
            | Self::Server { details, .. }
            | Self::Api { details, .. }
            | Self::Network { details, .. }
            | Self::DataParsing { details, .. } => details.clone(),
            Self::Config { key, .. } => {
                let mut details = Details::new();
                if let Some(key) = key {
                    details.insert("config_key".into(), Value::String(key.clone()));
                }
                details
            }
            _ => Details::new(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::data_parsing(format!("Serialization failed: {e}"), Details::new())
    }
}

/// Truncate a raw response body for inclusion in error details.
fn truncate(body: &str) -> &str {
    match body.char_indices().nth(RAW_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// =============================================================================
// Tests
// =============================================================================
