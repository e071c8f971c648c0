//! Domain cache over query results of the task database.
//!
//! Composes the core TTL/LRU cache with a deterministic key built from the
//! query parameters, and scopes invalidation to "every cached view of this
//! database". The cache is not transactionally tied to writes: a read racing
//! a concurrent write may observe stale data for up to the TTL window. That
//! freshness/latency tradeoff is deliberate.

use std::time::Duration;

use agenda_core::LruTtlCache;
use tracing::debug;

use crate::types::Task;

/// Cache of task listings, keyed by database id and completion filter.
pub struct TaskCache {
    cache: LruTtlCache,
}

impl TaskCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: LruTtlCache::new(capacity, ttl),
        }
    }

    fn key(database_id: &str, include_completed: bool) -> String {
        format!("tasks:{database_id}:{include_completed}")
    }

    /// Cached task list for the given query, if fresh.
    pub fn get_tasks(&self, database_id: &str, include_completed: bool) -> Option<Vec<Task>> {
        let value = self.cache.get(&Self::key(database_id, include_completed))?;
        match serde_json::from_value(value) {
            Ok(tasks) => {
                debug!(database_id, include_completed, "Task cache hit");
                Some(tasks)
            }
            // A cached value that no longer decodes is treated as absent.
            Err(_) => None,
        }
    }

    /// Store a task list for the given query.
    pub fn set_tasks(&self, database_id: &str, include_completed: bool, tasks: &[Task]) {
        if let Ok(value) = serde_json::to_value(tasks) {
            self.cache.set(Self::key(database_id, include_completed), value);
        }
    }

    /// Drop every cached view of one database. Called after any create or
    /// update against it.
    pub fn invalidate_database(&self, database_id: &str) {
        debug!(database_id, "Invalidating cached task views");
        self.cache.invalidate_prefix(&format!("tasks:{database_id}:"));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            status: TaskStatus::NotStarted,
            priority: None,
            due_date: None,
            tags: vec![],
            created_time: None,
            last_edited_time: None,
            url: None,
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = TaskCache::new(10, Duration::from_secs(30));
        cache.set_tasks("db1", false, &[task("a")]);

        let cached = cache.get_tasks("db1", false).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, "a");

        // Different completion flag is a different view.
        assert!(cache.get_tasks("db1", true).is_none());
    }

    #[test]
    fn test_invalidate_database_scoping() {
        let cache = TaskCache::new(10, Duration::from_secs(30));
        cache.set_tasks("db1", false, &[task("a")]);
        cache.set_tasks("db1", true, &[task("a"), task("b")]);
        cache.set_tasks("db2", false, &[task("c")]);

        cache.invalidate_database("db1");

        assert!(cache.get_tasks("db1", false).is_none());
        assert!(cache.get_tasks("db1", true).is_none());
        assert!(cache.get_tasks("db2", false).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = TaskCache::new(10, Duration::from_millis(30));
        cache.set_tasks("db1", false, &[task("a")]);
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get_tasks("db1", false).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = TaskCache::new(10, Duration::from_secs(30));
        cache.set_tasks("db1", false, &[task("a")]);
        cache.clear();
        assert!(cache.get_tasks("db1", false).is_none());
    }
}
