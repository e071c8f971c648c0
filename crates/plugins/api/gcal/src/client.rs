//! Google Calendar API client implementation.

use std::sync::Arc;

use agenda_core::{
    CalendarConfig, Error, Method, RateLimiter, RequestPipeline, Result, TokenManager,
    TokenProvider,
};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{Calendar, Event, EventPatch, EventQuery, NewEvent};

/// Retry budget for calendar calls.
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Google Calendar API client.
///
/// Thin request descriptions over the shared pipeline; the pipeline owns
/// rate limiting, token refresh, retries, and error mapping.
pub struct CalendarClient {
    pipeline: RequestPipeline,
    default_calendar_id: String,
}

/// Result of a concurrent multi-calendar fetch: whatever succeeded, plus one
/// message per calendar that failed.
#[derive(Debug, Default)]
pub struct MultiCalendarEvents {
    pub events: Vec<Event>,
    pub errors: Vec<String>,
}

impl CalendarClient {
    /// Create a client with its own token manager and rate limiter.
    pub fn new(config: &CalendarConfig) -> Self {
        let auth = Arc::new(
            TokenManager::new(
                &config.token_uri,
                &config.client_id,
                &config.client_secret,
                &config.refresh_token,
            )
            .with_seed_token(config.access_token.clone()),
        );
        Self::with_token_provider(config, auth)
    }

    /// Create a client around an externally constructed token provider,
    /// used by the composition root to share an auth manager wired with
    /// credential persistence, and by tests to inject a static token.
    pub fn with_token_provider(config: &CalendarConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
        ));
        Self {
            pipeline: RequestPipeline::new(&config.base_url, limiter, tokens),
            default_calendar_id: config.calendar_id.clone(),
        }
    }

    /// Calendar used when an operation does not name one.
    pub fn default_calendar_id(&self) -> &str {
        &self.default_calendar_id
    }

    fn calendar_id<'a>(&'a self, calendar_id: Option<&'a str>) -> &'a str {
        calendar_id.unwrap_or(&self.default_calendar_id)
    }

    /// List the calendars the user can access. Entries that fail to parse
    /// are logged and skipped.
    pub async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        info!("Listing calendars");
        let response = self
            .pipeline
            .execute(
                Method::GET,
                "users/me/calendarList",
                None,
                &[],
                DEFAULT_MAX_RETRIES,
            )
            .await?;

        let items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut calendars = Vec::new();
        for item in items {
            let id = item.get("id").and_then(Value::as_str).unwrap_or("unknown").to_string();
            match serde_json::from_value::<Calendar>(item) {
                Ok(calendar) => calendars.push(calendar),
                Err(e) => {
                    warn!(calendar_id = %id, error = %e, "Failed to parse calendar, skipping");
                }
            }
        }

        info!(count = calendars.len(), "Retrieved calendars");
        Ok(calendars)
    }

    /// List events from one calendar. Events that fail to parse are logged
    /// and skipped rather than failing the whole listing.
    pub async fn list_events(
        &self,
        calendar_id: Option<&str>,
        query: &EventQuery,
    ) -> Result<Vec<Event>> {
        let calendar_id = self.calendar_id(calendar_id);
        let path = format!("calendars/{calendar_id}/events");
        let params = query.to_params();

        info!(
            calendar_id,
            time_min = query.time_min.as_deref(),
            time_max = query.time_max.as_deref(),
            max_results = query.max_results,
            "Listing events"
        );

        let response = self
            .pipeline
            .execute(Method::GET, &path, None, &params, DEFAULT_MAX_RETRIES)
            .await?;

        let items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut events = Vec::new();
        for item in items {
            match parse_event(item) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Failed to parse event, skipping"),
            }
        }

        info!(count = events.len(), "Retrieved events");
        Ok(events)
    }

    /// Fetch events from several calendars concurrently. A failure on one
    /// calendar does not abort the others: partial results are returned
    /// together with one error message per failed calendar.
    pub async fn list_events_multi(
        &self,
        calendar_ids: &[String],
        query: &EventQuery,
    ) -> MultiCalendarEvents {
        let fetches = calendar_ids
            .iter()
            .map(|id| async move { (id.as_str(), self.list_events(Some(id), query).await) });

        let mut result = MultiCalendarEvents::default();
        for (calendar_id, outcome) in join_all(fetches).await {
            match outcome {
                Ok(events) => result.events.extend(events),
                Err(e) => {
                    warn!(calendar_id, error = %e, "Calendar fetch failed");
                    result.errors.push(format!("{calendar_id}: {e}"));
                }
            }
        }
        result
    }

    /// Fetch a single event.
    pub async fn get_event(&self, event_id: &str, calendar_id: Option<&str>) -> Result<Event> {
        let calendar_id = self.calendar_id(calendar_id);
        let path = format!("calendars/{calendar_id}/events/{event_id}");

        debug!(calendar_id, event_id, "Getting event");
        let response = self
            .pipeline
            .execute(Method::GET, &path, None, &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_event(response)
    }

    /// Create an event.
    pub async fn create_event(
        &self,
        event: &NewEvent,
        calendar_id: Option<&str>,
    ) -> Result<Event> {
        let calendar_id = self.calendar_id(calendar_id);
        let path = format!("calendars/{calendar_id}/events");
        let body = serde_json::to_value(event)?;

        info!(calendar_id, summary = %event.summary, "Creating event");
        let response = self
            .pipeline
            .execute(Method::POST, &path, Some(&body), &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_event(response)
    }

    /// Partially update an event (PATCH).
    pub async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
        calendar_id: Option<&str>,
    ) -> Result<Event> {
        if patch.is_empty() {
            return Err(Error::validation(
                "At least one field must be specified for update",
            ));
        }

        let calendar_id = self.calendar_id(calendar_id);
        let path = format!("calendars/{calendar_id}/events/{event_id}");
        let body = serde_json::to_value(patch)?;

        info!(calendar_id, event_id, "Updating event");
        let response = self
            .pipeline
            .execute(Method::PATCH, &path, Some(&body), &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_event(response)
    }
}

/// Decode one API event payload, reporting the offending event id on failure.
fn parse_event(value: Value) -> Result<Event> {
    let event_id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    serde_json::from_value(value).map_err(|e| {
        let mut details = agenda_core::Details::new();
        details.insert("event_id".into(), Value::String(event_id));
        details.insert("cause".into(), Value::String(e.to_string()));
        Error::data_parsing("Failed to parse event data", details)
    })
}

// =============================================================================
// Tests
// =============================================================================
