//! Core building blocks shared by every agenda-tools API client.
//!
//! This crate owns the pieces with real invariants: the token-bucket
//! [`RateLimiter`], the [`LruTtlCache`], the OAuth [`TokenManager`], and the
//! [`RequestPipeline`] that every outbound vendor call flows through.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod rate_limiter;

pub use auth::{CredentialSink, StaticToken, TokenManager, TokenProvider};
pub use cache::LruTtlCache;
pub use config::{CalendarConfig, NotionConfig};
pub use error::{Details, Error, Result};
pub use pipeline::{Method, RequestPipeline};
pub use rate_limiter::RateLimiter;
