use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    NewInstanceData, NewTaskData, RecurrenceRule, StoredRule, Task, TaskStatus, TaskTemplate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod instances;
pub mod rules;
pub mod tasks;

/// Filters for listing a user's tasks; combined with AND.
#[derive(Debug, Clone)]
pub enum TaskFilter {
    Status(TaskStatus),
    Repeating(bool),
    FromRule(Uuid),
}

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, user_id: Uuid, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks_by_short_id_prefix(&self, user_id: Uuid, short_id: &str) -> Result<Vec<Task>, CoreError>;
    async fn find_tasks(&self, user_id: Uuid, filters: &[TaskFilter]) -> Result<Vec<Task>, CoreError>;
    async fn find_task_tags(&self, task_id: Uuid) -> Result<Vec<String>, CoreError>;
    async fn complete_task(&self, user_id: Uuid, id: Uuid) -> Result<Task, CoreError>;
    /// Deletes a task; a rule left without its definition is deleted with it.
    async fn delete_task(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError>;
    /// Saves `rule` as the task's rule (updating the one it already owns, if any)
    /// and marks the task as repeating, in one transaction.
    async fn attach_rule(&self, user_id: Uuid, task_id: Uuid, rule: &RecurrenceRule) -> Result<Uuid, CoreError>;
    /// Stops a task repeating. Returns the id of the rule removed as orphaned, if any.
    async fn unlink_rule(&self, user_id: Uuid, task_id: Uuid) -> Result<Option<Uuid>, CoreError>;
}

/// Domain-specific trait for recurrence rule operations
#[async_trait]
pub trait RuleRepository {
    /// Active rules of `user_id` together with the template fields of their definition.
    async fn find_active_rules_with_template(&self, user_id: Uuid) -> Result<Vec<(StoredRule, TaskTemplate)>, CoreError>;
    /// Updates `rule_id` in place when given (NotFound unless owned by `user_id`), otherwise inserts.
    async fn upsert_rule(&self, user_id: Uuid, rule_id: Option<Uuid>, rule: &RecurrenceRule) -> Result<Uuid, CoreError>;
    async fn find_rule(&self, user_id: Uuid, rule_id: Uuid) -> Result<Option<StoredRule>, CoreError>;
    async fn find_rules(&self, user_id: Uuid) -> Result<Vec<StoredRule>, CoreError>;
    async fn find_rules_by_short_id_prefix(&self, user_id: Uuid, short_id: &str) -> Result<Vec<StoredRule>, CoreError>;
    async fn set_rule_active(&self, user_id: Uuid, rule_id: Uuid, active: bool) -> Result<StoredRule, CoreError>;
    /// Deletes a rule. Its instances survive with the link cleared; its definition stops repeating.
    async fn delete_rule(&self, user_id: Uuid, rule_id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for generated instances
#[async_trait]
pub trait InstanceRepository {
    /// Instance of `rule_id` whose `due_at` lies in `[start, end)`.
    async fn find_generated_instance(&self, rule_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Option<Task>, CoreError>;
    /// Fails with [`CoreError::DuplicateInstance`] if the rule already has an instance on that date.
    async fn insert_generated_instance(&self, data: NewInstanceData) -> Result<Task, CoreError>;
    async fn find_tasks_due_between(&self, user_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Task>, CoreError>;
}

/// Main repository trait that composes all domain traits
pub trait Repository: TaskRepository + RuleRepository + InstanceRepository + Send + Sync {}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteRepository {}

/// `LIKE` pattern for an ID prefix, matching `lower(hex(id))` in SQLite.
///
/// Dashes are ignored. Returns `None` when the prefix is empty or contains
/// anything besides hex digits, since no ID can match it.
pub(crate) fn short_id_pattern(short_id: &str) -> Option<String> {
    let digits: String = short_id
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{}%", digits))
}
