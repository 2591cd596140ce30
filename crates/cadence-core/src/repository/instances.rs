use crate::error::CoreError;
use crate::models::{NewInstanceData, Task, TaskStatus};
use crate::repository::tasks::{insert_tags, insert_task_row};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
impl super::InstanceRepository for SqliteRepository {
    async fn find_generated_instance(&self, rule_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Option<Task>, CoreError> {
        let task = sqlx::query_as(
            r#"SELECT * FROM tasks
            WHERE source_rule_id = $1
            AND due_at >= $2 AND due_at < $3
            ORDER BY due_at
            LIMIT 1"#,
        )
        .bind(rule_id)
        .bind(start)
        .bind(end)
        .fetch_optional(self.pool())
        .await?;
        Ok(task)
    }

    async fn insert_generated_instance(&self, data: NewInstanceData) -> Result<Task, CoreError> {
        let mut tx = self.pool().begin().await?;
        let now = Utc::now();

        let task = Task {
            id: Uuid::now_v7(),
            user_id: data.user_id,
            title: data.title,
            category: data.category,
            unit: data.unit,
            target_amount: data.target_amount,
            remaining_amount: data.remaining_amount,
            planned_start: data.planned_start,
            planned_end: data.planned_end,
            due_at: Some(data.due_at),
            is_today: data.is_today,
            is_todo: data.is_todo,
            status: TaskStatus::Pending,
            completed_at: None,
            is_repeating: false,
            rule_id: None,
            source_rule_id: Some(data.rule_id),
            occurrence_date: Some(data.occurrence_date),
            created_at: now,
            updated_at: now,
        };

        match insert_task_row(&mut tx, &task).await {
            Ok(()) => {}
            Err(CoreError::Database(sqlx::Error::Database(db_err))) if db_err.is_unique_violation() => {
                return Err(CoreError::DuplicateInstance {
                    rule_id: data.rule_id,
                    date: data.occurrence_date,
                });
            }
            Err(e) => return Err(e),
        }
        insert_tags(&mut tx, task.id, &data.tags).await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn find_tasks_due_between(&self, user_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as(
            r#"SELECT * FROM tasks
            WHERE user_id = $1
            AND is_repeating = FALSE
            AND due_at >= $2 AND due_at < $3
            ORDER BY due_at"#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }
}
