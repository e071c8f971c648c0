//! Google Calendar API client.
//!
//! All calls flow through the shared `agenda-core` request pipeline, which
//! owns rate limiting, OAuth token refresh, retries, and error mapping.

pub mod client;
pub mod types;

pub use client::{CalendarClient, MultiCalendarEvents};
pub use types::{Attendee, Calendar, Event, EventPatch, EventQuery, EventStatus, EventTime, NewEvent};
