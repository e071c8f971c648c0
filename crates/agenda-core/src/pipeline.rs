//! The single chokepoint for every outbound vendor API call.
//!
//! [`RequestPipeline::execute`] owns rate-limit admission, auth attachment,
//! retry policy, backoff, and error classification, so individual clients
//! only describe requests (method + path + body + query) and never deal
//! with failure handling themselves.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;

use crate::auth::TokenProvider;
use crate::error::{Details, Error, Result};
use crate::rate_limiter::RateLimiter;

pub use reqwest::Method;

/// Per-request hard timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Rate-limited, retrying request executor.
pub struct RequestPipeline {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    tokens: Arc<dyn TokenProvider>,
}

impl RequestPipeline {
    /// Create a pipeline with a default HTTP client (60 s timeout).
    pub fn new(
        base_url: impl Into<String>,
        limiter: Arc<RateLimiter>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("agenda-tools")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self::with_client(http, base_url, limiter, tokens)
    }

    /// Create a pipeline around a preconfigured client. Used by clients that
    /// need vendor default headers (e.g. `Notion-Version`).
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        limiter: Arc<RateLimiter>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter,
            tokens,
        }
    }

    /// Execute one API call with up to `max_retries` attempts.
    ///
    /// Returns the parsed JSON body; a 204 No Content response yields an
    /// empty object. Retryable failures (429/409/5xx, transport errors) are
    /// recovered internally with exponential backoff (`2^attempt` seconds,
    /// except that a 429 `Retry-After` header takes precedence); all other
    /// failures are raised on the attempt that observed them.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(String, String)],
        max_retries: u32,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        for attempt in 0..max_retries {
            let last_attempt = attempt + 1 == max_retries;

            // 1. Admission: one token per request. An invalid request
            //    (n > capacity) propagates immediately.
            self.limiter.acquire_one().await?;

            // 2. Auth. Transport failures during a token refresh are
            //    retryable here; auth/config failures are not.
            let token = match self.tokens.bearer_token().await {
                Ok(token) => token,
                Err(e) if e.is_retryable() && !last_attempt => {
                    let wait = backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries,
                        wait_secs = wait.as_secs(),
                        "Token acquisition failed, retrying"
                    );
                    sleep(wait).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(
                method = %method,
                url = %url,
                attempt = attempt + 1,
                "API request"
            );

            // 3. Issue the call.
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if !last_attempt {
                        let wait = backoff(attempt);
                        tracing::warn!(
                            error = %e,
                            attempt = attempt + 1,
                            max_retries,
                            wait_secs = wait.as_secs(),
                            "Transport error, retrying"
                        );
                        sleep(wait).await;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(Error::timeout(REQUEST_TIMEOUT.as_secs_f64()));
                    }
                    let mut details = Details::new();
                    details.insert("url".into(), Value::String(url.clone()));
                    details.insert("method".into(), Value::String(method.to_string()));
                    details.insert("cause".into(), Value::String(e.to_string()));
                    return Err(Error::network("API request failed", details));
                }
            };

            // 4. Classify.
            let status = response.status();
            tracing::debug!(status = status.as_u16(), attempt = attempt + 1, "API response");

            match status.as_u16() {
                429 => {
                    let retry_after = parse_retry_after(&response);
                    if last_attempt {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::from_response(429, &body, retry_after));
                    }
                    // Retry-After is authoritative when present.
                    let wait = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| backoff(attempt));
                    tracing::warn!(
                        wait_secs = wait.as_secs(),
                        attempt = attempt + 1,
                        max_retries,
                        "Rate limited, retrying"
                    );
                    sleep(wait).await;
                }
                409 => {
                    if last_attempt {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::from_response(409, &body, None));
                    }
                    let wait = backoff(attempt);
                    tracing::warn!(
                        wait_secs = wait.as_secs(),
                        attempt = attempt + 1,
                        max_retries,
                        "Conflict, retrying"
                    );
                    sleep(wait).await;
                }
                s if s >= 500 => {
                    if last_attempt {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::from_response(s, &body, None));
                    }
                    let wait = backoff(attempt);
                    tracing::warn!(
                        status = s,
                        wait_secs = wait.as_secs(),
                        attempt = attempt + 1,
                        max_retries,
                        "Server error, retrying"
                    );
                    sleep(wait).await;
                }
                s if s >= 400 => {
                    // Client-side mistakes do not self-correct: never retried.
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::from_response(s, &body, None));
                }
                204 => return Ok(Value::Object(serde_json::Map::new())),
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    return serde_json::from_str(&text).map_err(|e| {
                        let mut details = Details::new();
                        details.insert("status_code".into(), status.as_u16().into());
                        details.insert(
                            "response_text".into(),
                            Value::String(text.chars().take(200).collect()),
                        );
                        details.insert("cause".into(), Value::String(e.to_string()));
                        Error::data_parsing("Failed to parse response body as JSON", details)
                    });
                }
            }
        }

        // Defensive fallback: the loop above always returns or raises, but a
        // zero-retry budget lands here.
        let mut details = Details::new();
        details.insert("url".into(), Value::String(url));
        details.insert("max_retries".into(), max_retries.into());
        Err(Error::network("Retry budget exhausted", details))
    }
}

/// Exponential backoff: 1, 2, 4, 8, ... seconds.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16))
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Instant;

    fn pipeline(base_url: &str) -> RequestPipeline {
        // Generous limiter so admission never delays these tests.
        RequestPipeline::new(
            base_url,
            Arc::new(RateLimiter::new(1000.0, 1000)),
            Arc::new(StaticToken::new("test-token")),
        )
    }

    #[tokio::test]
    async fn test_success_returns_parsed_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/things")
                .header("authorization", "Bearer test-token")
                .header("accept", "application/json");
            then.status(200).json_body(json!({"items": [1, 2, 3]}));
        });

        let result = pipeline(&server.base_url())
            .execute(Method::GET, "things", None, &[], 3)
            .await
            .unwrap();

        assert_eq!(result, json!({"items": [1, 2, 3]}));
        mock.assert();
    }

    #[tokio::test]
    async fn test_query_and_body_are_forwarded() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/things")
                .query_param("page_size", "10")
                .json_body(json!({"filter": "open"}));
            then.status(200).json_body(json!({"ok": true}));
        });

        let query = vec![("page_size".to_string(), "10".to_string())];
        let body = json!({"filter": "open"});
        pipeline(&server.base_url())
            .execute(Method::POST, "/things", Some(&body), &query, 3)
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_no_content_yields_empty_object() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/empty");
            then.status(204);
        });

        let result = pipeline(&server.base_url())
            .execute(Method::GET, "empty", None, &[], 1)
            .await
            .unwrap();
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn test_not_found_short_circuits_without_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404)
                .json_body(json!({"message": "no such thing"}));
        });

        let start = Instant::now();
        let err = pipeline(&server.base_url())
            .execute(Method::GET, "missing", None, &[], 5)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        // First attempt, no retry delay incurred.
        mock.assert();
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_validation_error_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/things");
            then.status(400).json_body(json!({"message": "bad payload"}));
        });

        let body = json!({});
        let err = pipeline(&server.base_url())
            .execute(Method::POST, "things", Some(&body), &[], 3)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        mock.assert();
    }

    #[tokio::test]
    async fn test_server_errors_retry_with_backoff_then_raise() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503).json_body(json!({"message": "unavailable"}));
        });

        let start = Instant::now();
        let err = pipeline(&server.base_url())
            .execute(Method::GET, "flaky", None, &[], 3)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Server { status: 503, .. }));
        // Attempted exactly 3 times with 1 s + 2 s backoff between attempts.
        mock.assert_calls(3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_rate_limit_honors_retry_after() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(429)
                .header("Retry-After", "2")
                .json_body(json!({"message": "slow down"}));
        });

        let start = Instant::now();
        let err = pipeline(&server.base_url())
            .execute(Method::GET, "limited", None, &[], 2)
            .await
            .unwrap_err();

        match err {
            Error::RateLimited { retry_after, .. } => assert_eq!(retry_after, Some(2)),
            other => panic!("expected RateLimited, got {:?}", other),
        }
        // One Retry-After wait between the two attempts.
        mock.assert_calls(2);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_conflict_retries_then_raises() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/busy");
            then.status(409).json_body(json!({"message": "conflict"}));
        });

        let body = json!({});
        let start = Instant::now();
        let err = pipeline(&server.base_url())
            .execute(Method::POST, "busy", Some(&body), &[], 2)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict { .. }));
        mock.assert_calls(2);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_data_parsing_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/garbled");
            then.status(200).body("not json at all");
        });

        let err = pipeline(&server.base_url())
            .execute(Method::GET, "garbled", None, &[], 3)
            .await
            .unwrap_err();

        match err {
            Error::DataParsing { details, .. } => {
                assert_eq!(
                    details.get("response_text").and_then(Value::as_str),
                    Some("not json at all")
                );
            }
            other => panic!("expected DataParsing, got {:?}", other),
        }
        // Malformed 2xx bodies are not retried.
        mock.assert();
    }

    #[tokio::test]
    async fn test_connection_failure_exhausts_as_network_error() {
        // Nothing listens on this port; two fast connection failures with a
        // single 1 s backoff between them.
        let pipeline = pipeline("http://127.0.0.1:1");
        let err = pipeline
            .execute(Method::GET, "things", None, &[], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[tokio::test]
    async fn test_limiter_overflow_propagates() {
        let server = MockServer::start();
        let limiter = Arc::new(RateLimiter::new(1.0, 0));
        let pipeline = RequestPipeline::new(
            server.base_url(),
            limiter,
            Arc::new(StaticToken::new("t")),
        );
        let err = pipeline
            .execute(Method::GET, "things", None, &[], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_zero_retry_budget_is_defensive_network_error() {
        let server = MockServer::start();
        let err = pipeline(&server.base_url())
            .execute(Method::GET, "things", None, &[], 0)
            .await
            .unwrap_err();
        match err {
            Error::Network { message, .. } => assert!(message.contains("Retry budget")),
            other => panic!("expected Network, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_propagates_immediately() {
        struct DeniedTokens;

        #[async_trait::async_trait]
        impl TokenProvider for DeniedTokens {
            async fn bearer_token(&self) -> Result<String> {
                Err(Error::auth("refresh denied"))
            }
        }

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/things");
            then.status(200).json_body(json!({}));
        });

        let pipeline = RequestPipeline::new(
            server.base_url(),
            Arc::new(RateLimiter::new(1000.0, 10)),
            Arc::new(DeniedTokens),
        );
        let err = pipeline
            .execute(Method::GET, "things", None, &[], 5)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth { .. }));
        mock.assert_calls(0);
    }
}
