//! Rule create/update entry points used by task editing.

use uuid::Uuid;

use crate::error::CoreError;
use crate::repository::{RuleRepository, TaskRepository};
use crate::rule::RuleInput;

/// Validates rule payloads and persists them against their owning task.
pub struct RuleService<'a, R> {
    repo: &'a R,
}

impl<'a, R> RuleService<'a, R>
where
    R: RuleRepository + TaskRepository + Sync,
{
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Validates `payload`, then updates `existing_rule_id` in place or inserts a new rule.
    ///
    /// Nothing is written when validation fails. Updating a rule the user does
    /// not own fails with [`CoreError::NotFound`]. Repeated updates of the same
    /// rule are last-write-wins.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        existing_rule_id: Option<Uuid>,
        payload: &RuleInput,
    ) -> Result<Uuid, CoreError> {
        let rule = payload.validate()?;
        let rule_id = self.repo.upsert_rule(user_id, existing_rule_id, &rule).await?;

        tracing::debug!(
            %user_id,
            %rule_id,
            rule_type = rule.pattern.type_name(),
            updated = existing_rule_id.is_some(),
            "rule saved"
        );
        Ok(rule_id)
    }

    /// Saves the rule of a task and turns the task into a repeating definition.
    ///
    /// Reuses the task's current rule when it has one. The rule write and the
    /// link to the task commit together or not at all.
    pub async fn upsert_for_task(&self, user_id: Uuid, task_id: Uuid, payload: &RuleInput) -> Result<Uuid, CoreError> {
        let rule = payload.validate()?;
        let rule_id = self.repo.attach_rule(user_id, task_id, &rule).await?;

        tracing::debug!(
            %user_id,
            %task_id,
            %rule_id,
            rule_type = rule.pattern.type_name(),
            "task rule saved"
        );
        Ok(rule_id)
    }

    /// Stops a task repeating. Returns the id of the rule removed with it, if any.
    pub async fn stop_repeating(&self, user_id: Uuid, task_id: Uuid) -> Result<Option<Uuid>, CoreError> {
        let removed = self.repo.unlink_rule(user_id, task_id).await?;
        if let Some(rule_id) = removed {
            tracing::info!(%task_id, %rule_id, "task no longer repeats");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_connection;
    use crate::models::{NewTaskData, RecurrencePattern};
    use crate::repository::SqliteRepository;
    use crate::rule::ValidationError;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    async fn setup_with_pool() -> (SqliteRepository, SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service.db");
        let pool = establish_connection(db_path.to_str().unwrap()).await.unwrap();
        (SqliteRepository::new(pool.clone()), pool, temp_dir)
    }

    async fn setup() -> (SqliteRepository, TempDir) {
        let (repo, _pool, temp_dir) = setup_with_pool().await;
        (repo, temp_dir)
    }

    fn payload(json: &str) -> RuleInput {
        serde_json::from_str(json).unwrap()
    }

    async fn add(repo: &SqliteRepository, user_id: Uuid, title: &str) -> Uuid {
        repo.add_task(NewTaskData {
            user_id,
            title: title.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_invalid_payload_writes_nothing() {
        let (repo, _dir) = setup().await;
        let user = Uuid::now_v7();
        let service = RuleService::new(&repo);

        let err = service
            .upsert(user, None, &payload(r#"{"type": "fortnightly"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::UnknownType(_))));
        assert!(repo.find_rules(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_last_write_wins() {
        let (repo, _dir) = setup().await;
        let user = Uuid::now_v7();
        let service = RuleService::new(&repo);

        let id = service.upsert(user, None, &payload(r#"{"type": "daily"}"#)).await.unwrap();
        let same = service
            .upsert(user, Some(id), &payload(r#"{"type": "after_days", "n": 3}"#))
            .await
            .unwrap();
        assert_eq!(id, same);

        let rules = repo.find_rules(user).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule.pattern, RecurrencePattern::AfterDays { n: 3 });
    }

    #[tokio::test]
    async fn test_foreign_rule_is_not_found() {
        let (repo, _dir) = setup().await;
        let owner = Uuid::now_v7();
        let service = RuleService::new(&repo);
        let id = service.upsert(owner, None, &payload(r#"{"type": "daily"}"#)).await.unwrap();

        let err = service
            .upsert(Uuid::now_v7(), Some(id), &payload(r#"{"type": "daily", "time": "07:00"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_for_task_reuses_existing_rule() {
        let (repo, _dir) = setup().await;
        let user = Uuid::now_v7();
        let task_id = add(&repo, user, "Water plants").await;
        let service = RuleService::new(&repo);

        let first = service
            .upsert_for_task(user, task_id, &payload(r#"{"type": "daily"}"#))
            .await
            .unwrap();
        let second = service
            .upsert_for_task(user, task_id, &payload(r#"{"type": "weekly", "weekdays": ["sat"]}"#))
            .await
            .unwrap();
        assert_eq!(first, second);

        let task = repo.find_task_by_id(user, task_id).await.unwrap().unwrap();
        assert!(task.is_repeating);
        assert_eq!(task.rule_id, Some(first));
        assert_eq!(repo.find_rules(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_for_missing_task() {
        let (repo, _dir) = setup().await;
        let err = RuleService::new(&repo)
            .upsert_for_task(Uuid::now_v7(), Uuid::now_v7(), &payload(r#"{"type": "daily"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_for_task_leaves_no_rule_behind_on_failure() {
        let (repo, pool, _dir) = setup_with_pool().await;
        let user = Uuid::now_v7();
        let task_id = add(&repo, user, "Inbox zero").await;
        let service = RuleService::new(&repo);

        // Another user's task: the rule must not be written on its own
        let err = service
            .upsert_for_task(Uuid::now_v7(), task_id, &payload(r#"{"type": "daily"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        // A generated instance cannot own a rule either
        sqlx::query("UPDATE tasks SET occurrence_date = '2025-03-10' WHERE id = $1")
            .bind(task_id)
            .execute(&pool)
            .await
            .unwrap();
        let err = service
            .upsert_for_task(user, task_id, &payload(r#"{"type": "daily"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let rules: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recurrence_rules")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rules, 0);
    }

    #[tokio::test]
    async fn test_stop_repeating_removes_rule() {
        let (repo, _dir) = setup().await;
        let user = Uuid::now_v7();
        let task_id = add(&repo, user, "Backup").await;
        let service = RuleService::new(&repo);

        let rule_id = service
            .upsert_for_task(user, task_id, &payload(r#"{"type": "monthly", "end_of_month": true}"#))
            .await
            .unwrap();
        assert_eq!(service.stop_repeating(user, task_id).await.unwrap(), Some(rule_id));

        let task = repo.find_task_by_id(user, task_id).await.unwrap().unwrap();
        assert!(!task.is_repeating);
        assert_eq!(task.rule_id, None);
        assert!(repo.find_rule(user, rule_id).await.unwrap().is_none());

        // Already plain
        assert_eq!(service.stop_repeating(user, task_id).await.unwrap(), None);
    }
}
