//! Notion API client.
//!
//! Task and memo operations over the shared `agenda-core` request pipeline,
//! with a read-through task cache in front of database queries.

pub mod cache;
pub mod client;
pub mod types;

pub use cache::TaskCache;
pub use client::NotionClient;
pub use types::{Memo, NewTask, Page, QueryResponse, Task, TaskPatch, TaskPriority, TaskStatus};
