//! Notion API client implementation.
//!
//! Property names of the task/memo databases come from [`NotionConfig`];
//! optional properties that are not configured are simply left out of
//! filters, sorts, and payloads.

use std::sync::Arc;
use std::time::Duration;

use agenda_core::{
    Details, Error, Method, NotionConfig, RateLimiter, RequestPipeline, Result, StaticToken,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::TaskCache;
use crate::types::{Memo, NewTask, Page, QueryResponse, Task, TaskPatch, TaskPriority, TaskStatus};

/// Retry budget for Notion calls.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Page size for database queries; pagination fetches to exhaustion.
const QUERY_PAGE_SIZE: u32 = 100;

/// Per-request hard timeout, matching the pipeline default.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Notion API client.
pub struct NotionClient {
    pipeline: RequestPipeline,
    config: NotionConfig,
    cache: TaskCache,
}

impl NotionClient {
    /// Create a client from config. The `Notion-Version` header rides on the
    /// underlying HTTP client; auth is the fixed integration token.
    pub fn new(config: NotionConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
        ));
        let tokens = Arc::new(StaticToken::new(&config.api_key));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Notion-Version",
            reqwest::header::HeaderValue::from_str(&config.notion_version)
                .expect("Invalid Notion version string"),
        );
        let http = reqwest::Client::builder()
            .user_agent("agenda-tools")
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        let pipeline = RequestPipeline::with_client(http, &config.base_url, limiter, tokens);
        let cache = TaskCache::new(
            config.cache_capacity,
            Duration::from_secs_f64(config.cache_ttl_secs),
        );

        Self {
            pipeline,
            config,
            cache,
        }
    }

    // =========================================================================
    // Raw page/database operations
    // =========================================================================

    /// Query a database, following cursor pagination to exhaustion.
    pub async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<Page>> {
        let path = format!("databases/{database_id}/query");

        let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }
        if let Some(sorts) = sorts {
            body["sorts"] = sorts;
        }

        let mut pages = Vec::new();
        loop {
            let response = self
                .pipeline
                .execute(Method::POST, &path, Some(&body), &[], DEFAULT_MAX_RETRIES)
                .await?;
            let batch: QueryResponse = serde_json::from_value(response).map_err(|e| {
                let mut details = Details::new();
                details.insert("database_id".into(), Value::String(database_id.to_string()));
                details.insert("cause".into(), Value::String(e.to_string()));
                Error::data_parsing("Failed to parse database query response", details)
            })?;

            debug!(
                database_id,
                batch = batch.results.len(),
                total = pages.len() + batch.results.len(),
                has_more = batch.has_more,
                "Retrieved query page"
            );
            pages.extend(batch.results);

            match (batch.has_more, batch.next_cursor) {
                (true, Some(cursor)) => body["start_cursor"] = Value::String(cursor),
                _ => break,
            }
        }

        Ok(pages)
    }

    /// Fetch a single page.
    pub async fn retrieve_page(&self, page_id: &str) -> Result<Page> {
        let path = format!("pages/{page_id}");
        let response = self
            .pipeline
            .execute(Method::GET, &path, None, &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_page(response)
    }

    /// Create a page in a database.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: Value,
        children: Option<Value>,
    ) -> Result<Page> {
        let mut body = json!({
            "parent": {"type": "database_id", "database_id": database_id},
            "properties": properties,
        });
        if let Some(children) = children {
            body["children"] = children;
        }

        info!(database_id, "Creating page");
        let response = self
            .pipeline
            .execute(Method::POST, "pages", Some(&body), &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_page(response)
    }

    /// Update page properties.
    pub async fn update_page(&self, page_id: &str, properties: Value) -> Result<Page> {
        let path = format!("pages/{page_id}");
        let body = json!({ "properties": properties });

        info!(page_id, "Updating page");
        let response = self
            .pipeline
            .execute(Method::PATCH, &path, Some(&body), &[], DEFAULT_MAX_RETRIES)
            .await?;
        parse_page(response)
    }

    /// Append child blocks to a block or page.
    pub async fn append_block_children(&self, block_id: &str, children: Value) -> Result<Value> {
        let path = format!("blocks/{block_id}/children");
        let body = json!({ "children": children });

        info!(block_id, "Appending blocks");
        self.pipeline
            .execute(Method::PATCH, &path, Some(&body), &[], DEFAULT_MAX_RETRIES)
            .await
    }

    // =========================================================================
    // Task operations
    // =========================================================================

    /// List tasks, read-through cached. With `include_completed` unset,
    /// Completed and Cancelled tasks are filtered out server-side.
    pub async fn get_tasks(&self, include_completed: bool) -> Result<Vec<Task>> {
        let database_id = self.config.task_database_id.clone();
        if let Some(cached) = self.cache.get_tasks(&database_id, include_completed) {
            return Ok(cached);
        }

        let filter = if include_completed {
            None
        } else {
            Some(json!({
                "and": [
                    {
                        "property": self.config.task_prop_status,
                        "status": {"does_not_equal": TaskStatus::Completed.as_str()},
                    },
                    {
                        "property": self.config.task_prop_status,
                        "status": {"does_not_equal": TaskStatus::Cancelled.as_str()},
                    },
                ]
            }))
        };

        // Sort by the configured properties when present; creation time is
        // always the final key.
        let mut sorts = Vec::new();
        if let Some(priority) = &self.config.task_prop_priority {
            sorts.push(json!({"property": priority, "direction": "ascending"}));
        }
        if let Some(due_date) = &self.config.task_prop_due_date {
            sorts.push(json!({"property": due_date, "direction": "ascending"}));
        }
        sorts.push(json!({"timestamp": "created_time", "direction": "descending"}));

        let pages = self
            .query_database(&database_id, filter, Some(Value::Array(sorts)))
            .await?;
        let tasks = self.pages_to_tasks(&pages);

        self.cache.set_tasks(&database_id, include_completed, &tasks);
        Ok(tasks)
    }

    /// Fetch a single task by page id.
    pub async fn get_task(&self, page_id: &str) -> Result<Task> {
        let page = self.retrieve_page(page_id).await?;
        self.parse_task(&page)
    }

    /// Search tasks by title substring, status name, and/or tag.
    pub async fn search_tasks(
        &self,
        query: Option<&str>,
        status: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<Task>> {
        let mut clauses = Vec::new();
        if let Some(query) = query {
            clauses.push(json!({
                "property": self.config.task_prop_title,
                "title": {"contains": query},
            }));
        }
        if let Some(status) = status {
            clauses.push(json!({
                "property": self.config.task_prop_status,
                "status": {"equals": status},
            }));
        }
        if let Some(tag) = tag {
            match &self.config.task_prop_tags {
                Some(tags_prop) => clauses.push(json!({
                    "property": tags_prop,
                    "multi_select": {"contains": tag},
                })),
                None => warn!("Tag filter requested but no tags property is configured"),
            }
        }

        let filter = if clauses.is_empty() {
            None
        } else {
            Some(json!({"and": clauses}))
        };

        let pages = self
            .query_database(&self.config.task_database_id, filter, None)
            .await?;
        Ok(self.pages_to_tasks(&pages))
    }

    /// Create a task. Invalidates every cached view of the task database.
    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        let mut properties = serde_json::Map::new();
        properties.insert(
            self.config.task_prop_title.clone(),
            title_property(&task.title),
        );
        properties.insert(
            self.config.task_prop_status.clone(),
            status_property(task.status),
        );
        if let (Some(priority), Some(prop)) = (task.priority, &self.config.task_prop_priority) {
            properties.insert(prop.clone(), select_property(priority.as_str()));
        }
        if let (Some(due_date), Some(prop)) = (&task.due_date, &self.config.task_prop_due_date) {
            properties.insert(prop.clone(), date_property(due_date));
        }
        if let Some(prop) = &self.config.task_prop_tags {
            if !task.tags.is_empty() {
                properties.insert(prop.clone(), multi_select_property(&task.tags));
            }
        }

        info!(title = %task.title, "Creating task");
        let page = self
            .create_page(&self.config.task_database_id, Value::Object(properties), None)
            .await?;

        self.cache.invalidate_database(&self.config.task_database_id);
        self.parse_task(&page)
    }

    /// Partially update a task. Invalidates every cached view of the task
    /// database.
    pub async fn update_task(&self, page_id: &str, patch: &TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::validation(
                "At least one property must be specified for update",
            ));
        }

        let mut properties = serde_json::Map::new();
        if let Some(title) = &patch.title {
            properties.insert(self.config.task_prop_title.clone(), title_property(title));
        }
        if let Some(status) = patch.status {
            properties.insert(self.config.task_prop_status.clone(), status_property(status));
        }
        if let (Some(priority), Some(prop)) = (patch.priority, &self.config.task_prop_priority) {
            properties.insert(prop.clone(), select_property(priority.as_str()));
        }
        if let (Some(due_date), Some(prop)) = (&patch.due_date, &self.config.task_prop_due_date) {
            properties.insert(prop.clone(), date_property(due_date));
        }
        if let (Some(tags), Some(prop)) = (&patch.tags, &self.config.task_prop_tags) {
            properties.insert(prop.clone(), multi_select_property(tags));
        }

        let page = self.update_page(page_id, Value::Object(properties)).await?;

        self.cache.invalidate_database(&self.config.task_database_id);
        self.parse_task(&page)
    }

    /// Set just the status of a task.
    pub async fn update_task_status(&self, page_id: &str, status: TaskStatus) -> Result<Task> {
        info!(page_id, status = status.as_str(), "Updating task status");
        self.update_task(
            page_id,
            &TaskPatch {
                status: Some(status),
                ..TaskPatch::default()
            },
        )
        .await
    }

    // =========================================================================
    // Memo operations
    // =========================================================================

    /// List memos, newest first.
    pub async fn get_memos(&self) -> Result<Vec<Memo>> {
        let sorts = json!([{"timestamp": "created_time", "direction": "descending"}]);
        let pages = self
            .query_database(&self.config.memo_database_id, None, Some(sorts))
            .await?;
        Ok(self.pages_to_memos(&pages))
    }

    /// Search memos by title substring and/or tag.
    pub async fn search_memos(&self, query: Option<&str>, tag: Option<&str>) -> Result<Vec<Memo>> {
        let mut clauses = Vec::new();
        if let Some(query) = query {
            clauses.push(json!({
                "property": self.config.memo_prop_title,
                "title": {"contains": query},
            }));
        }
        if let Some(tag) = tag {
            match &self.config.memo_prop_tags {
                Some(tags_prop) => clauses.push(json!({
                    "property": tags_prop,
                    "multi_select": {"contains": tag},
                })),
                None => warn!("Tag filter requested but no tags property is configured"),
            }
        }

        let filter = if clauses.is_empty() {
            None
        } else {
            Some(json!({"and": clauses}))
        };

        let pages = self
            .query_database(&self.config.memo_database_id, filter, None)
            .await?;
        Ok(self.pages_to_memos(&pages))
    }

    /// Create a memo, with its content as a paragraph block.
    pub async fn create_memo(
        &self,
        title: &str,
        content: Option<&str>,
        tags: &[String],
    ) -> Result<Memo> {
        let mut properties = serde_json::Map::new();
        properties.insert(self.config.memo_prop_title.clone(), title_property(title));
        if let Some(prop) = &self.config.memo_prop_tags {
            if !tags.is_empty() {
                properties.insert(prop.clone(), multi_select_property(tags));
            }
        }

        let children = content.map(|text| json!([paragraph_block(text)]));

        info!(title, "Creating memo");
        let page = self
            .create_page(&self.config.memo_database_id, Value::Object(properties), children)
            .await?;
        Ok(self.parse_memo(&page))
    }

    /// Update a memo's title/tags and/or append content, then return its
    /// refreshed state.
    pub async fn update_memo(
        &self,
        page_id: &str,
        title: Option<&str>,
        tags: Option<&[String]>,
        content: Option<&str>,
    ) -> Result<Memo> {
        let mut properties = serde_json::Map::new();
        if let Some(title) = title {
            properties.insert(self.config.memo_prop_title.clone(), title_property(title));
        }
        if let (Some(tags), Some(prop)) = (tags, &self.config.memo_prop_tags) {
            properties.insert(prop.clone(), multi_select_property(tags));
        }

        if properties.is_empty() && content.is_none() {
            return Err(Error::validation(
                "At least one property or content must be specified for update",
            ));
        }

        if !properties.is_empty() {
            self.update_page(page_id, Value::Object(properties)).await?;
        }
        if let Some(text) = content {
            self.append_block_children(page_id, json!([paragraph_block(text)]))
                .await?;
        }

        let page = self.retrieve_page(page_id).await?;
        Ok(self.parse_memo(&page))
    }

    // =========================================================================
    // Page -> domain model mapping
    // =========================================================================

    /// Extract a [`Task`] from a page of the task database.
    ///
    /// The title property is required; everything else decodes with named
    /// defaults so structurally unexpected pages degrade instead of crashing.
    fn parse_task(&self, page: &Page) -> Result<Task> {
        let title_prop = page.properties.get(&self.config.task_prop_title).ok_or_else(|| {
            let mut details = Details::new();
            details.insert("page_id".into(), Value::String(page.id.clone()));
            details.insert(
                "field".into(),
                Value::String(self.config.task_prop_title.clone()),
            );
            Error::data_parsing(
                format!(
                    "Required property '{}' not found",
                    self.config.task_prop_title
                ),
                details,
            )
        })?;
        let title = title_text(title_prop).unwrap_or_else(|| "Untitled".to_string());

        let status_value = page
            .properties
            .get(&self.config.task_prop_status)
            .and_then(status_name)
            .unwrap_or("Not started");
        let status = TaskStatus::parse(status_value).unwrap_or_else(|| {
            warn!(status = status_value, "Unknown status, defaulting to Not started");
            TaskStatus::NotStarted
        });

        let priority = self.config.task_prop_priority.as_ref().and_then(|prop| {
            let value = page.properties.get(prop).and_then(select_name)?;
            let parsed = TaskPriority::parse(value);
            if parsed.is_none() {
                warn!(priority = value, "Unknown priority");
            }
            parsed
        });

        let due_date = self
            .config
            .task_prop_due_date
            .as_ref()
            .and_then(|prop| page.properties.get(prop))
            .and_then(date_start);

        let tags = self
            .config
            .task_prop_tags
            .as_ref()
            .and_then(|prop| page.properties.get(prop))
            .map(multi_select_names)
            .unwrap_or_default();

        Ok(Task {
            id: page.id.clone(),
            title,
            status,
            priority,
            due_date,
            tags,
            created_time: page.created_time.clone(),
            last_edited_time: page.last_edited_time.clone(),
            url: page.url.clone(),
        })
    }

    fn pages_to_tasks(&self, pages: &[Page]) -> Vec<Task> {
        let mut tasks = Vec::new();
        for page in pages {
            match self.parse_task(page) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(page_id = %page.id, error = %e, "Failed to parse task, skipping");
                }
            }
        }
        tasks
    }

    fn pages_to_memos(&self, pages: &[Page]) -> Vec<Memo> {
        pages.iter().map(|page| self.parse_memo(page)).collect()
    }

    /// Extract a [`Memo`]. Memos have no required properties: a page without
    /// a readable title becomes "Untitled".
    fn parse_memo(&self, page: &Page) -> Memo {
        let title = page
            .properties
            .get(&self.config.memo_prop_title)
            .and_then(title_text)
            .unwrap_or_else(|| "Untitled".to_string());

        let tags = self
            .config
            .memo_prop_tags
            .as_ref()
            .and_then(|prop| page.properties.get(prop))
            .map(multi_select_names)
            .unwrap_or_default();

        Memo {
            id: page.id.clone(),
            title,
            tags,
            created_time: page.created_time.clone(),
            last_edited_time: page.last_edited_time.clone(),
            url: page.url.clone(),
        }
    }
}

fn parse_page(value: Value) -> Result<Page> {
    let page_id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    serde_json::from_value(value).map_err(|e| {
        let mut details = Details::new();
        details.insert("page_id".into(), Value::String(page_id));
        details.insert("cause".into(), Value::String(e.to_string()));
        Error::data_parsing("Failed to parse page data", details)
    })
}

// =============================================================================
// Property readers
// =============================================================================

fn title_text(prop: &Value) -> Option<String> {
    prop.get("title")?
        .as_array()?
        .first()?
        .pointer("/text/content")?
        .as_str()
        .map(str::to_string)
}

fn status_name(prop: &Value) -> Option<&str> {
    prop.pointer("/status/name")?.as_str()
}

fn select_name(prop: &Value) -> Option<&str> {
    prop.pointer("/select/name")?.as_str()
}

fn date_start(prop: &Value) -> Option<String> {
    prop.pointer("/date/start")?.as_str().map(str::to_string)
}

fn multi_select_names(prop: &Value) -> Vec<String> {
    prop.get("multi_select")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Property builders
// =============================================================================

fn title_property(text: &str) -> Value {
    json!({
        "type": "title",
        "title": [{"type": "text", "text": {"content": text}}],
    })
}

fn status_property(status: TaskStatus) -> Value {
    json!({
        "type": "status",
        "status": {"name": status.as_str()},
    })
}

fn select_property(name: &str) -> Value {
    json!({
        "type": "select",
        "select": {"name": name},
    })
}

fn date_property(date: &str) -> Value {
    json!({
        "type": "date",
        "date": {"start": date, "end": null, "time_zone": null},
    })
}

fn multi_select_property(tags: &[String]) -> Value {
    let entries: Vec<Value> = tags.iter().map(|tag| json!({"name": tag})).collect();
    json!({
        "type": "multi_select",
        "multi_select": entries,
    })
}

fn paragraph_block(text: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": [{"type": "text", "text": {"content": text}}]
        },
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> NotionConfig {
        NotionConfig {
            api_key: "secret_test".to_string(),
            task_database_id: "db-tasks".to_string(),
            memo_database_id: "db-memos".to_string(),
            base_url: base_url.to_string(),
            rate_limit_rps: 1000.0,
            rate_limit_burst: 100,
            task_prop_priority: Some("Priority".to_string()),
            task_prop_due_date: Some("Due".to_string()),
            task_prop_tags: Some("Tags".to_string()),
            ..Default::default()
        }
    }

    fn task_page_json(id: &str, title: &str, status: &str) -> Value {
        json!({
            "object": "page",
            "id": id,
            "created_time": "2026-02-01T10:00:00.000Z",
            "last_edited_time": "2026-02-02T10:00:00.000Z",
            "url": format!("https://notion.so/{id}"),
            "properties": {
                "Name": {
                    "type": "title",
                    "title": [{"type": "text", "text": {"content": title}, "plain_text": title}]
                },
                "Status": {"type": "status", "status": {"name": status}},
                "Priority": {"type": "select", "select": {"name": "High"}},
                "Due": {"type": "date", "date": {"start": "2026-02-15"}},
                "Tags": {"type": "multi_select", "multi_select": [{"name": "work"}]}
            }
        })
    }

    #[test]
    fn test_parse_task() {
        let client = NotionClient::new(test_config("http://localhost"));
        let page = parse_page(task_page_json("page-1", "Write report", "In progress")).unwrap();
        let task = client.parse_task(&page).unwrap();

        assert_eq!(task.id, "page-1");
        assert_eq!(task.title, "Write report");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Some(TaskPriority::High));
        assert_eq!(task.due_date.as_deref(), Some("2026-02-15"));
        assert_eq!(task.tags, vec!["work"]);
        assert_eq!(task.url.as_deref(), Some("https://notion.so/page-1"));
    }

    #[test]
    fn test_parse_task_unknown_status_defaults() {
        let client = NotionClient::new(test_config("http://localhost"));
        let page = parse_page(task_page_json("page-1", "X", "Someday")).unwrap();
        let task = client.parse_task(&page).unwrap();
        assert_eq!(task.status, TaskStatus::NotStarted);
    }

    #[test]
    fn test_parse_task_missing_title_property() {
        let client = NotionClient::new(test_config("http://localhost"));
        let page = parse_page(json!({
            "id": "page-1",
            "properties": {
                "Status": {"type": "status", "status": {"name": "Not started"}}
            }
        }))
        .unwrap();

        let err = client.parse_task(&page).unwrap_err();
        match err {
            Error::DataParsing { details, .. } => {
                assert_eq!(details.get("field").and_then(Value::as_str), Some("Name"));
            }
            other => panic!("expected DataParsing, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_task_empty_title_list_is_untitled() {
        let client = NotionClient::new(test_config("http://localhost"));
        let page = parse_page(json!({
            "id": "page-1",
            "properties": {
                "Name": {"type": "title", "title": []}
            }
        }))
        .unwrap();
        let task = client.parse_task(&page).unwrap();
        assert_eq!(task.title, "Untitled");
    }

    #[test]
    fn test_parse_memo_without_title_is_untitled() {
        let client = NotionClient::new(test_config("http://localhost"));
        let page = parse_page(json!({"id": "memo-1", "properties": {}})).unwrap();
        let memo = client.parse_memo(&page);
        assert_eq!(memo.title, "Untitled");
        assert!(memo.tags.is_empty());
    }

    mod integration {
        use super::*;
        use httpmock::prelude::*;

        fn query_response(pages: Vec<Value>) -> Value {
            json!({
                "object": "list",
                "results": pages,
                "next_cursor": null,
                "has_more": false
            })
        }

        #[tokio::test]
        async fn test_get_tasks_filters_completed() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/databases/db-tasks/query")
                    .header("authorization", "Bearer secret_test")
                    .header("Notion-Version", "2022-06-28")
                    .json_body_includes(
                        r#"{"filter":{"and":[{"property":"Status","status":{"does_not_equal":"Completed"}},{"property":"Status","status":{"does_not_equal":"Cancelled"}}]}}"#,
                    );
                then.status(200).json_body(query_response(vec![task_page_json(
                    "page-1",
                    "Write report",
                    "Not started",
                )]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let tasks = client.get_tasks(false).await.unwrap();

            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].title, "Write report");
            mock.assert();
        }

        #[tokio::test]
        async fn test_get_tasks_reads_through_cache() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/databases/db-tasks/query");
                then.status(200).json_body(query_response(vec![task_page_json(
                    "page-1",
                    "Cached",
                    "Not started",
                )]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let first = client.get_tasks(false).await.unwrap();
            let second = client.get_tasks(false).await.unwrap();

            assert_eq!(first, second);
            // The second call was served from cache.
            mock.assert();
        }

        #[tokio::test]
        async fn test_create_task_invalidates_cache() {
            let server = MockServer::start();
            let query = server.mock(|when, then| {
                when.method(POST).path("/databases/db-tasks/query");
                then.status(200).json_body(query_response(vec![]));
            });
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/pages")
                    .json_body_includes(r#"{"parent":{"type":"database_id","database_id":"db-tasks"}}"#);
                then.status(200)
                    .json_body(task_page_json("page-new", "New task", "Not started"));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            client.get_tasks(false).await.unwrap();

            let created = client.create_task(&NewTask::new("New task")).await.unwrap();
            assert_eq!(created.title, "New task");
            create.assert();

            // The cached (empty) listing was invalidated by the write.
            client.get_tasks(false).await.unwrap();
            query.assert_calls(2);
        }

        #[tokio::test]
        async fn test_query_pagination_follows_cursor() {
            let server = MockServer::start();
            let first_page = server.mock(|when, then| {
                when.method(POST)
                    .path("/databases/db-tasks/query")
                    .body_excludes("start_cursor");
                then.status(200).json_body(json!({
                    "object": "list",
                    "results": [task_page_json("page-1", "First", "Not started")],
                    "next_cursor": "cursor-1",
                    "has_more": true
                }));
            });
            let second_page = server.mock(|when, then| {
                when.method(POST)
                    .path("/databases/db-tasks/query")
                    .body_includes(r#""start_cursor":"cursor-1""#);
                then.status(200).json_body(query_response(vec![task_page_json(
                    "page-2",
                    "Second",
                    "Not started",
                )]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let pages = client
                .query_database("db-tasks", None, None)
                .await
                .unwrap();

            assert_eq!(pages.len(), 2);
            assert_eq!(pages[0].id, "page-1");
            assert_eq!(pages[1].id, "page-2");
            first_page.assert();
            second_page.assert();
        }

        #[tokio::test]
        async fn test_search_tasks_builds_filter() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/databases/db-tasks/query")
                    .body_includes(r#""title":{"contains":"report"}"#)
                    .body_includes(r#""status":{"equals":"In progress"}"#)
                    .body_includes(r#""multi_select":{"contains":"work"}"#);
                then.status(200).json_body(query_response(vec![task_page_json(
                    "page-1",
                    "Write report",
                    "In progress",
                )]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let tasks = client
                .search_tasks(Some("report"), Some("In progress"), Some("work"))
                .await
                .unwrap();

            assert_eq!(tasks.len(), 1);
            mock.assert();
        }

        #[tokio::test]
        async fn test_unparseable_pages_are_skipped() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/databases/db-tasks/query");
                then.status(200).json_body(query_response(vec![
                    task_page_json("page-1", "Good", "Not started"),
                    json!({"object": "page", "id": "page-broken", "properties": {}}),
                ]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let tasks = client.get_tasks(true).await.unwrap();

            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].id, "page-1");
        }

        #[tokio::test]
        async fn test_update_task_status() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(httpmock::Method::PATCH)
                    .path("/pages/page-1")
                    .json_body_includes(
                        r#"{"properties":{"Status":{"type":"status","status":{"name":"Completed"}}}}"#,
                    );
                then.status(200)
                    .json_body(task_page_json("page-1", "Write report", "Completed"));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let task = client
                .update_task_status("page-1", TaskStatus::Completed)
                .await
                .unwrap();

            assert_eq!(task.status, TaskStatus::Completed);
            mock.assert();
        }

        #[tokio::test]
        async fn test_update_task_empty_patch_is_validation_error() {
            let server = MockServer::start();
            let client = NotionClient::new(test_config(&server.base_url()));
            let err = client
                .update_task("page-1", &TaskPatch::default())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }

        #[tokio::test]
        async fn test_get_task() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/pages/page-1");
                then.status(200)
                    .json_body(task_page_json("page-1", "Write report", "Today"));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let task = client.get_task("page-1").await.unwrap();
            assert_eq!(task.status, TaskStatus::Today);
        }

        fn memo_page_json(id: &str, title: &str) -> Value {
            json!({
                "object": "page",
                "id": id,
                "created_time": "2026-02-01T10:00:00.000Z",
                "last_edited_time": "2026-02-01T10:00:00.000Z",
                "url": format!("https://notion.so/{id}"),
                "properties": {
                    "Name": {
                        "type": "title",
                        "title": [{"type": "text", "text": {"content": title}}]
                    },
                    "Tags": {"type": "multi_select", "multi_select": [{"name": "meeting"}]}
                }
            })
        }

        #[tokio::test]
        async fn test_create_memo_with_content_block() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/pages")
                    .json_body_includes(r#"{"parent":{"type":"database_id","database_id":"db-memos"}}"#)
                    .body_includes(r#""content":"Agenda and decisions""#);
                then.status(200).json_body(memo_page_json("memo-1", "Weekly sync"));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let memo = client
                .create_memo(
                    "Weekly sync",
                    Some("Agenda and decisions"),
                    &["meeting".to_string()],
                )
                .await
                .unwrap();

            assert_eq!(memo.title, "Weekly sync");
            assert_eq!(memo.tags, vec!["meeting"]);
            mock.assert();
        }

        #[tokio::test]
        async fn test_get_memos() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST)
                    .path("/databases/db-memos/query")
                    .body_includes(r#""timestamp":"created_time""#);
                then.status(200)
                    .json_body(query_response(vec![memo_page_json("memo-1", "Weekly sync")]));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let memos = client.get_memos().await.unwrap();
            assert_eq!(memos.len(), 1);
            assert_eq!(memos[0].title, "Weekly sync");
        }

        #[tokio::test]
        async fn test_update_memo_appends_content_and_rereads() {
            let server = MockServer::start();
            let append = server.mock(|when, then| {
                when.method(httpmock::Method::PATCH)
                    .path("/blocks/memo-1/children")
                    .body_includes(r#""content":"More notes""#);
                then.status(200).json_body(json!({"object": "list", "results": []}));
            });
            let read_back = server.mock(|when, then| {
                when.method(GET).path("/pages/memo-1");
                then.status(200).json_body(memo_page_json("memo-1", "Weekly sync"));
            });

            let client = NotionClient::new(test_config(&server.base_url()));
            let memo = client
                .update_memo("memo-1", None, None, Some("More notes"))
                .await
                .unwrap();

            assert_eq!(memo.title, "Weekly sync");
            append.assert();
            read_back.assert();
        }

        #[tokio::test]
        async fn test_update_memo_requires_some_change() {
            let server = MockServer::start();
            let client = NotionClient::new(test_config(&server.base_url()));
            let err = client
                .update_memo("memo-1", None, None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }
    }
}
