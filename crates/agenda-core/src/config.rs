//! Configuration for the agenda API clients.
//!
//! Both servers are configured through the process environment, matching
//! their deployment model (secrets injected by the MCP host or a local
//! `.env`-style credentials file, see `agenda-storage`). Every config can
//! also be built as a plain struct literal in tests.

use std::env;

use crate::error::{Error, Result};

/// Default Google OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default Google Calendar API base URL.
pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Default Notion API base URL.
pub const NOTION_BASE_URL: &str = "https://api.notion.com/v1";

/// Notion API version header value.
pub const NOTION_VERSION: &str = "2022-06-28";

/// Google Calendar client configuration.
///
/// Rate defaults follow the documented Calendar quota of 100 requests per
/// minute, with margin: 1.5 requests/second sustained, bursts of 10.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Seed access token, if one is already known. Refreshed on expiry.
    pub access_token: Option<String>,
    pub calendar_id: String,
    pub token_uri: String,
    pub base_url: String,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            access_token: None,
            calendar_id: "primary".to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            base_url: GOOGLE_CALENDAR_BASE_URL.to_string(),
            rate_limit_rps: 1.5,
            rate_limit_burst: 10,
        }
    }
}

impl CalendarConfig {
    /// Load from the process environment.
    ///
    /// `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and `GOOGLE_REFRESH_TOKEN`
    /// are required; each missing value is reported as a configuration
    /// error naming that variable.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            client_id: require_env("GOOGLE_CLIENT_ID")?,
            client_secret: require_env("GOOGLE_CLIENT_SECRET")?,
            refresh_token: require_env("GOOGLE_REFRESH_TOKEN")?,
            access_token: optional_env("GOOGLE_ACCESS_TOKEN"),
            calendar_id: env_or("GOOGLE_CALENDAR_ID", "primary"),
            token_uri: env_or("GOOGLE_TOKEN_URI", GOOGLE_TOKEN_URI),
            base_url: env_or("GOOGLE_CALENDAR_BASE_URL", GOOGLE_CALENDAR_BASE_URL),
            ..Self::default()
        };
        tracing::debug!(calendar_id = %config.calendar_id, "Loaded Google Calendar config");
        Ok(config)
    }
}

/// Notion client configuration.
///
/// Property names of the task/memo databases are user-specific and therefore
/// configurable; the optional ones are skipped in filters and sorts when
/// unset. Rate defaults follow Notion's documented 3 requests/second.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub task_database_id: String,
    pub memo_database_id: String,
    pub base_url: String,
    pub notion_version: String,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub cache_ttl_secs: f64,
    pub cache_capacity: usize,
    pub task_prop_title: String,
    pub task_prop_status: String,
    pub task_prop_priority: Option<String>,
    pub task_prop_due_date: Option<String>,
    pub task_prop_tags: Option<String>,
    pub memo_prop_title: String,
    pub memo_prop_tags: Option<String>,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            task_database_id: String::new(),
            memo_database_id: String::new(),
            base_url: NOTION_BASE_URL.to_string(),
            notion_version: NOTION_VERSION.to_string(),
            rate_limit_rps: 3.0,
            rate_limit_burst: 10,
            cache_ttl_secs: 30.0,
            cache_capacity: 100,
            task_prop_title: "Name".to_string(),
            task_prop_status: "Status".to_string(),
            task_prop_priority: None,
            task_prop_due_date: None,
            task_prop_tags: None,
            memo_prop_title: "Name".to_string(),
            memo_prop_tags: Some("Tags".to_string()),
        }
    }
}

impl NotionConfig {
    /// Load from the process environment.
    ///
    /// `NOTION_API_KEY`, `NOTION_TASK_DATABASE_ID` and
    /// `NOTION_MEMO_DATABASE_ID` are required.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let memo_prop_tags =
            optional_env("NOTION_MEMO_PROP_TAGS").or_else(|| defaults.memo_prop_tags.clone());
        let config = Self {
            api_key: require_env("NOTION_API_KEY")?,
            task_database_id: require_env("NOTION_TASK_DATABASE_ID")?,
            memo_database_id: require_env("NOTION_MEMO_DATABASE_ID")?,
            base_url: env_or("NOTION_BASE_URL", NOTION_BASE_URL),
            notion_version: env_or("NOTION_VERSION", NOTION_VERSION),
            task_prop_title: env_or("NOTION_TASK_PROP_TITLE", &defaults.task_prop_title),
            task_prop_status: env_or("NOTION_TASK_PROP_STATUS", &defaults.task_prop_status),
            task_prop_priority: optional_env("NOTION_TASK_PROP_PRIORITY"),
            task_prop_due_date: optional_env("NOTION_TASK_PROP_DUE_DATE"),
            task_prop_tags: optional_env("NOTION_TASK_PROP_TAGS"),
            memo_prop_title: env_or("NOTION_MEMO_PROP_TITLE", &defaults.memo_prop_title),
            memo_prop_tags,
            ..defaults
        };
        tracing::debug!(
            task_db = %config.task_database_id,
            memo_db = %config.memo_database_id,
            "Loaded Notion config"
        );
        Ok(config)
    }
}

fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::config(format!("{key} is not configured"), key)),
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

// =============================================================================
// Tests
// =============================================================================
