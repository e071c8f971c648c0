//! Tool-call boundary for the agenda servers.
//!
//! Each handler receives a flat JSON argument map, calls exactly one client
//! method, and renders the typed result (or the typed error's message) to
//! text. The JSON-RPC framing and stdio transport belong to the embedding
//! MCP host, not to this crate: the surface ends at
//! `execute(name, arguments) -> ToolOutput`.

pub mod calendar;
pub mod notion;
pub mod tools;

pub use calendar::CalendarToolHandler;
pub use notion::NotionToolHandler;
pub use tools::{ToolDefinition, ToolOutput};
