//! Tool handlers for the Notion server.

use std::sync::Arc;

use agenda_notion::{NewTask, NotionClient, Task, TaskPatch, TaskPriority, TaskStatus};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::tools::{ToolDefinition, ToolOutput};

/// Executes task/memo tools against one [`NotionClient`].
pub struct NotionToolHandler {
    client: Arc<NotionClient>,
}

impl NotionToolHandler {
    pub fn new(client: Arc<NotionClient>) -> Self {
        Self { client }
    }

    /// Tool definitions advertised to the host.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_tasks".to_string(),
                description: "List tasks from the task database".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "include_completed": {
                            "type": "boolean",
                            "description": "Include Completed and Cancelled tasks (default: false)"
                        }
                    }
                }),
            },
            ToolDefinition {
                name: "search_tasks".to_string(),
                description: "Search tasks by title, status, and/or tag".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Substring of the task title" },
                        "status": { "type": "string", "description": "Exact status name" },
                        "tag": { "type": "string", "description": "Tag name" }
                    }
                }),
            },
            ToolDefinition {
                name: "create_task".to_string(),
                description: "Create a task".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "status": {
                            "type": "string",
                            "description": "Not started, Today, In progress, Backlog, Completed, or Cancelled"
                        },
                        "priority": { "type": "string", "description": "High, Medium, or Low" },
                        "due_date": { "type": "string", "description": "ISO 8601 date, e.g. 2026-02-15" },
                        "tags": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title"]
                }),
            },
            ToolDefinition {
                name: "update_task".to_string(),
                description: "Update fields of an existing task".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "page_id": { "type": "string", "description": "Task page ID" },
                        "title": { "type": "string" },
                        "status": { "type": "string" },
                        "priority": { "type": "string" },
                        "due_date": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["page_id"]
                }),
            },
            ToolDefinition {
                name: "create_memo".to_string(),
                description: "Create a memo, optionally with body content".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "content": { "type": "string", "description": "Body text" },
                        "tags": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title"]
                }),
            },
        ]
    }

    /// Execute a tool by name. Always returns text; never panics or
    /// propagates an error past this boundary.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolOutput {
        let arguments = arguments.unwrap_or_else(|| Value::Object(Default::default()));
        match name {
            "get_tasks" => self.get_tasks(arguments).await,
            "search_tasks" => self.search_tasks(arguments).await,
            "create_task" => self.create_task(arguments).await,
            "update_task" => self.update_task(arguments).await,
            "create_memo" => self.create_memo(arguments).await,
            _ => ToolOutput::error(format!("Unknown tool: {name}")),
        }
    }

    async fn get_tasks(&self, arguments: Value) -> ToolOutput {
        let params: GetTasksParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        match self
            .client
            .get_tasks(params.include_completed.unwrap_or(false))
            .await
        {
            Ok(tasks) => ToolOutput::text(format_task_list(&tasks)),
            Err(e) => render_failure("Failed to get tasks", &e),
        }
    }

    async fn search_tasks(&self, arguments: Value) -> ToolOutput {
        let params: SearchTasksParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        match self
            .client
            .search_tasks(
                params.query.as_deref(),
                params.status.as_deref(),
                params.tag.as_deref(),
            )
            .await
        {
            Ok(tasks) => ToolOutput::text(format_task_list(&tasks)),
            Err(e) => render_failure("Failed to search tasks", &e),
        }
    }

    async fn create_task(&self, arguments: Value) -> ToolOutput {
        let params: CreateTaskParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        let status = match params.status.as_deref().map(parse_status).transpose() {
            Ok(status) => status.unwrap_or(TaskStatus::NotStarted),
            Err(output) => return output,
        };
        let priority = match params.priority.as_deref().map(parse_priority).transpose() {
            Ok(priority) => priority,
            Err(output) => return output,
        };

        let task = NewTask {
            title: params.title,
            status,
            priority,
            due_date: params.due_date,
            tags: params.tags.unwrap_or_default(),
        };

        match self.client.create_task(&task).await {
            Ok(created) => ToolOutput::text(format!(
                "Created task \"{}\" [{}] ({})",
                created.title,
                created.status.as_str(),
                created.id
            )),
            Err(e) => render_failure("Failed to create task", &e),
        }
    }

    async fn update_task(&self, arguments: Value) -> ToolOutput {
        let params: UpdateTaskParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        let status = match params.status.as_deref().map(parse_status).transpose() {
            Ok(status) => status,
            Err(output) => return output,
        };
        let priority = match params.priority.as_deref().map(parse_priority).transpose() {
            Ok(priority) => priority,
            Err(output) => return output,
        };

        let patch = TaskPatch {
            title: params.title,
            status,
            priority,
            due_date: params.due_date,
            tags: params.tags,
        };

        match self.client.update_task(&params.page_id, &patch).await {
            Ok(updated) => ToolOutput::text(format!(
                "Updated task \"{}\" [{}] ({})",
                updated.title,
                updated.status.as_str(),
                updated.id
            )),
            Err(e) => render_failure("Failed to update task", &e),
        }
    }

    async fn create_memo(&self, arguments: Value) -> ToolOutput {
        let params: CreateMemoParams = match parse_args(arguments) {
            Ok(params) => params,
            Err(output) => return output,
        };

        match self
            .client
            .create_memo(
                &params.title,
                params.content.as_deref(),
                &params.tags.unwrap_or_default(),
            )
            .await
        {
            Ok(memo) => ToolOutput::text(format!("Created memo \"{}\" ({})", memo.title, memo.id)),
            Err(e) => render_failure("Failed to create memo", &e),
        }
    }
}

// =============================================================================
// Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GetTasksParams {
    include_completed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchTasksParams {
    query: Option<String>,
    status: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskParams {
    title: String,
    status: Option<String>,
    priority: Option<String>,
    due_date: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskParams {
    page_id: String,
    title: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    due_date: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CreateMemoParams {
    title: String,
    content: Option<String>,
    tags: Option<Vec<String>>,
}

fn parse_args<T: serde::de::DeserializeOwned>(
    arguments: Value,
) -> std::result::Result<T, ToolOutput> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolOutput::error(format!("Invalid arguments: {e}")))
}

fn parse_status(value: &str) -> std::result::Result<TaskStatus, ToolOutput> {
    TaskStatus::parse(value).ok_or_else(|| {
        ToolOutput::error(format!(
            "Unknown status \"{value}\". Valid statuses: Not started, Today, In progress, \
             Backlog, Completed, Cancelled"
        ))
    })
}

fn parse_priority(value: &str) -> std::result::Result<TaskPriority, ToolOutput> {
    TaskPriority::parse(value).ok_or_else(|| {
        ToolOutput::error(format!(
            "Unknown priority \"{value}\". Valid priorities: High, Medium, Low"
        ))
    })
}

/// Log the full structured detail, return only the message as text.
fn render_failure(context: &str, error: &agenda_core::Error) -> ToolOutput {
    error!(error = %error, details = ?error.details(), "{context}");
    ToolOutput::error(format!("{context}: {error}"))
}

// =============================================================================
// Formatting
// =============================================================================

fn format_task_summary(task: &Task) -> String {
    let mut line = format!("- [{}] {}", task.status.as_str(), task.title);
    if let Some(priority) = task.priority {
        line.push_str(&format!(" ({})", priority.as_str()));
    }
    if let Some(due_date) = &task.due_date {
        line.push_str(&format!(" due {due_date}"));
    }
    for tag in &task.tags {
        line.push_str(&format!(" #{tag}"));
    }
    line.push_str(&format!(" ({})", task.id));
    line
}

fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }
    let mut lines = vec![format!("Tasks ({} total)", tasks.len())];
    lines.extend(tasks.iter().map(format_task_summary));
    lines.join("\n")
}

// =============================================================================
// Tests
// =============================================================================
