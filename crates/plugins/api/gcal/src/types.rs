//! Google Calendar API types.
//!
//! Field names on the wire are camelCase; `start`/`end` carry either a
//! `dateTime` (timed event) or a `date` (all-day event), never both.

use serde::{Deserialize, Serialize};

/// Event status values used by Google Calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Start or end of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// RFC 3339 timestamp for timed events (e.g. `2026-02-04T10:00:00+09:00`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// Calendar date for all-day events (e.g. `2026-02-04`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// Timed event at the given RFC 3339 timestamp.
    pub fn at(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            ..Self::default()
        }
    }

    /// All-day event on the given date.
    pub fn on(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    /// The timestamp or date, whichever is set.
    pub fn display(&self) -> &str {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .unwrap_or("unknown")
    }
}

/// Event attendee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub organizer: bool,
}

/// Calendar event as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub recurrence: Vec<String>,
    #[serde(default)]
    pub hangout_link: Option<String>,
}

impl Event {
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("(no title)")
    }
}

/// Input for event creation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

/// Partial update for an event (PATCH). Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
    }
}

/// Entry from the user's calendar list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub access_role: Option<String>,
}

/// Query parameters for event listing.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Lower bound on event start, RFC 3339.
    pub time_min: Option<String>,
    /// Upper bound on event start, RFC 3339.
    pub time_max: Option<String>,
    pub max_results: u32,
    /// Expand recurring events into individual instances.
    pub single_events: bool,
    /// `startTime` or `updated`; only valid with `single_events`.
    pub order_by: Option<String>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            time_min: None,
            time_max: None,
            max_results: 10,
            single_events: true,
            order_by: Some("startTime".to_string()),
        }
    }
}

impl EventQuery {
    pub(crate) fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("maxResults".to_string(), self.max_results.to_string()),
            ("singleEvents".to_string(), self.single_events.to_string()),
        ];
        if let Some(time_min) = &self.time_min {
            params.push(("timeMin".to_string(), time_min.clone()));
        }
        if let Some(time_max) = &self.time_max {
            params.push(("timeMax".to_string(), time_max.clone()));
        }
        if self.single_events {
            if let Some(order_by) = &self.order_by {
                params.push(("orderBy".to_string(), order_by.clone()));
            }
        }
        params
    }
}

// =============================================================================
// Tests
// =============================================================================
