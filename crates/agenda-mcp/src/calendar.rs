//! Tool handlers for the Google Calendar server.

use std::sync::Arc;

use agenda_gcal::{CalendarClient, Event, EventPatch, EventQuery, EventTime, NewEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::tools::{ToolDefinition, ToolOutput};

/// Executes calendar tools against one [`CalendarClient`].
pub struct CalendarToolHandler {
    client: Arc<CalendarClient>,
}

impl CalendarToolHandler {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        Self { client }
    }

    /// Tool definitions advertised to the host.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_events".to_string(),
                description: "List calendar events in a time range, grouped by day".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "time_min": {
                            "type": "string",
                            "description": "Range start, RFC 3339 (default: now)"
                        },
                        "time_max": {
                            "type": "string",
                            "description": "Range end, RFC 3339 (default: 7 days after time_min)"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum events per calendar (default: 10)",
                            "minimum": 1,
                            "maximum": 250
                        },
                        "calendar_ids": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Calendars to read; omit for the default calendar"
                        }
                    }
                }),
            },
            ToolDefinition {
                name: "get_event".to_string(),
                description: "Show one event in detail".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "event_id": { "type": "string", "description": "Event ID" },
                        "calendar_id": { "type": "string", "description": "Calendar ID (default: configured calendar)" }
                    },
                    "required": ["event_id"]
                }),
            },
            ToolDefinition {
                name: "create_event".to_string(),
                description: "Create a calendar event. Start/end with a time component create \
                              a timed event; bare dates create an all-day event"
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string", "description": "Event title" },
                        "start": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD date" },
                        "end": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD date" },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "calendar_id": { "type": "string" }
                    },
                    "required": ["summary", "start", "end"]
                }),
            },
            ToolDefinition {
                name: "update_event".to_string(),
                description: "Update fields of an existing event".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "event_id": { "type": "string", "description": "Event ID" },
                        "summary": { "type": "string" },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "start": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD date" },
                        "end": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD date" },
                        "calendar_id": { "type": "string" }
                    },
                    "required": ["event_id"]
                }),
            },
        ]
    }

    /// Execute a tool by name. Always returns text; never panics or
    /// propagates an error past this boundary.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolOutput {
        let arguments = arguments.unwrap_or_else(|| Value::Object(Default::default()));
        match name {
            "get_events" => self.get_events(arguments).await,
            "get_event" => self.get_event(arguments).await,
            "create_event" => self.create_event(arguments).await,
            "update_event" => self.update_event(arguments).await,
            _ => ToolOutput::error(format!("Unknown tool: {name}")),
        }
    }

    async fn get_events(&self, arguments: Value) -> ToolOutput {
        let params: GetEventsParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        let query = EventQuery {
            time_min: params.time_min,
            time_max: params.time_max,
            max_results: params.max_results.unwrap_or(10),
            ..EventQuery::default()
        };

        let (events, warnings) = match params.calendar_ids {
            Some(ids) if !ids.is_empty() => {
                let result = self.client.list_events_multi(&ids, &query).await;
                (result.events, result.errors)
            }
            _ => match self.client.list_events(None, &query).await {
                Ok(events) => (events, Vec::new()),
                Err(e) => return render_failure("Failed to get events", &e),
            },
        };

        if events.is_empty() && warnings.is_empty() {
            return ToolOutput::text("No events found in the requested range.");
        }

        ToolOutput::text(format_event_list(&events, &warnings))
    }

    async fn get_event(&self, arguments: Value) -> ToolOutput {
        let params: GetEventParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        match self
            .client
            .get_event(&params.event_id, params.calendar_id.as_deref())
            .await
        {
            Ok(event) => ToolOutput::text(format_event_detail(&event)),
            Err(e) => render_failure("Failed to get event", &e),
        }
    }

    async fn create_event(&self, arguments: Value) -> ToolOutput {
        let params: CreateEventParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        let event = NewEvent {
            summary: params.summary,
            description: params.description,
            location: params.location,
            start: event_time(&params.start),
            end: event_time(&params.end),
            attendees: Vec::new(),
        };

        match self
            .client
            .create_event(&event, params.calendar_id.as_deref())
            .await
        {
            Ok(created) => ToolOutput::text(format!(
                "Created event \"{}\" ({})\n{}",
                created.title(),
                created.id,
                created.html_link.as_deref().unwrap_or(""),
            )),
            Err(e) => render_failure("Failed to create event", &e),
        }
    }

    async fn update_event(&self, arguments: Value) -> ToolOutput {
        let params: UpdateEventParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        let patch = EventPatch {
            summary: params.summary,
            description: params.description,
            location: params.location,
            start: params.start.as_deref().map(event_time),
            end: params.end.as_deref().map(event_time),
        };

        match self
            .client
            .update_event(&params.event_id, &patch, params.calendar_id.as_deref())
            .await
        {
            Ok(updated) => ToolOutput::text(format!(
                "Updated event \"{}\" ({})",
                updated.title(),
                updated.id
            )),
            Err(e) => render_failure("Failed to update event", &e),
        }
    }
}

// =============================================================================
// Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GetEventsParams {
    time_min: Option<String>,
    time_max: Option<String>,
    max_results: Option<u32>,
    calendar_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GetEventParams {
    event_id: String,
    calendar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateEventParams {
    summary: String,
    start: String,
    end: String,
    description: Option<String>,
    location: Option<String>,
    calendar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateEventParams {
    event_id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<String>,
    end: Option<String>,
    calendar_id: Option<String>,
}

fn parse_args<T: serde::de::DeserializeOwned>(
    arguments: Value,
) -> std::result::Result<T, ToolOutput> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolOutput::error(format!("Invalid arguments: {e}")))
}

/// Log the full structured detail, return only the message as text.
fn render_failure(context: &str, error: &agenda_core::Error) -> ToolOutput {
    error!(error = %error, details = ?error.details(), "{context}");
    ToolOutput::error(format!("{context}: {error}"))
}

// =============================================================================
// Formatting
// =============================================================================

/// A timestamp's date part, for day grouping.
fn event_date(event: &Event) -> &str {
    let display = event.start.display();
    if display.len() >= 10 {
        &display[..10]
    } else {
        display
    }
}

/// `HH:MM` for timed events, "all day" otherwise.
fn event_clock(time: &EventTime) -> String {
    match &time.date_time {
        Some(ts) if ts.len() >= 16 => ts[11..16].to_string(),
        Some(ts) => ts.clone(),
        None => "all day".to_string(),
    }
}

fn format_event_summary(event: &Event) -> String {
    let mut line = format!("- {} {}", event_clock(&event.start), event.title());
    if let Some(location) = &event.location {
        line.push_str(&format!(" @ {location}"));
    }
    line.push_str(&format!(" [{}]", event.id));
    line
}

fn format_event_list(events: &[Event], warnings: &[String]) -> String {
    let mut lines = vec![format!("Events ({} total)", events.len())];

    let mut current_date = "";
    for event in events {
        let date = event_date(event);
        if date != current_date {
            lines.push(String::new());
            lines.push(format!("[{date}]"));
            current_date = date;
        }
        lines.push(format_event_summary(event));
    }

    if !warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        for warning in warnings {
            lines.push(format!("- {warning}"));
        }
    }

    lines.join("\n")
}

fn format_event_detail(event: &Event) -> String {
    let mut lines = vec![
        format!("Title: {}", event.title()),
        format!(
            "When: {} - {}",
            event.start.display(),
            event.end.display()
        ),
        format!("Status: {:?}", event.status),
    ];
    if let Some(location) = &event.location {
        lines.push(format!("Location: {location}"));
    }
    if let Some(description) = &event.description {
        lines.push(format!("Description: {description}"));
    }
    if !event.attendees.is_empty() {
        let attendees: Vec<&str> = event.attendees.iter().map(|a| a.email.as_str()).collect();
        lines.push(format!("Attendees: {}", attendees.join(", ")));
    }
    if let Some(link) = &event.hangout_link {
        lines.push(format!("Meet: {link}"));
    }
    if let Some(link) = &event.html_link {
        lines.push(format!("Link: {link}"));
    }
    lines.push(format!("ID: {}", event.id));
    lines.join("\n")
}

/// A value with a time component is a timed event; a bare date is all-day.
fn event_time(value: &str) -> EventTime {
    if value.contains('T') {
        EventTime::at(value)
    } else {
        EventTime::on(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
