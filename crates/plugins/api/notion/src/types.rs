//! Notion API types and the task/memo domain models extracted from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task status values of the task database's status property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Not started")]
    NotStarted,
    #[serde(rename = "Today")]
    Today,
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "Backlog")]
    Backlog,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Today => "Today",
            Self::InProgress => "In progress",
            Self::Backlog => "Backlog",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Parse a status property value; `None` for statuses this database
    /// does not model.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Not started" => Some(Self::NotStarted),
            "Today" => Some(Self::Today),
            "In progress" => Some(Self::InProgress),
            "Backlog" => Some(Self::Backlog),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Task priority values of the task database's select property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "High" => Some(Self::High),
            "Medium" => Some(Self::Medium),
            "Low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A task extracted from a page of the task database.
///
/// Serializable so task lists can round-trip through the response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Option<TaskPriority>,
    /// ISO 8601 date, e.g. `2026-02-15`.
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
    pub url: Option<String>,
}

/// A memo extracted from a page of the memo database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
    pub url: Option<String>,
}

/// Input for task creation.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub status: TaskStatus,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TaskStatus::NotStarted,
            priority: None,
            due_date: None,
            tags: Vec::new(),
        }
    }
}

/// Partial update for a task. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

/// A Notion page: opaque property map plus metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Response of a database query, with cursor pagination state.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Page>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::Today,
            TaskStatus::InProgress,
            TaskStatus::Backlog,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("Someday"), None);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(TaskPriority::parse("High"), Some(TaskPriority::High));
        assert_eq!(TaskPriority::parse("Urgent"), None);
    }

    #[test]
    fn test_task_serde_roundtrip() {
        let task = Task {
            id: "page-1".to_string(),
            title: "Write report".to_string(),
            status: TaskStatus::InProgress,
            priority: Some(TaskPriority::High),
            due_date: Some("2026-02-15".to_string()),
            tags: vec!["work".to_string()],
            created_time: Some("2026-02-01T10:00:00.000Z".to_string()),
            last_edited_time: None,
            url: Some("https://notion.so/page-1".to_string()),
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["status"], "In progress");
        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_query_response_deserializes() {
        let response: QueryResponse = serde_json::from_value(json!({
            "object": "list",
            "results": [{
                "object": "page",
                "id": "page-1",
                "created_time": "2026-02-01T10:00:00.000Z",
                "last_edited_time": "2026-02-02T10:00:00.000Z",
                "properties": {},
                "url": "https://notion.so/page-1"
            }],
            "next_cursor": "cursor-1",
            "has_more": true
        }))
        .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "page-1");
        assert!(response.has_more);
        assert_eq!(response.next_cursor.as_deref(), Some("cursor-1"));
    }

    #[test]
    fn test_task_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
