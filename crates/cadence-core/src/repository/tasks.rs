use crate::error::CoreError;
use crate::models::{NewTaskData, RecurrenceRule, Task, TaskStatus};
use crate::repository::rules::write_rule;
use crate::repository::{short_id_pattern, SqliteRepository, TaskFilter};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::TaskRepository for SqliteRepository {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        if data.title.trim().is_empty() {
            return Err(CoreError::InvalidInput("Task title cannot be empty".to_string()));
        }

        let mut tx = self.pool().begin().await?;
        let now = Utc::now();

        let task = Task {
            id: Uuid::now_v7(),
            user_id: data.user_id,
            title: data.title,
            category: data.category,
            unit: data.unit,
            target_amount: data.target_amount,
            remaining_amount: data.remaining_amount.or(data.target_amount),
            planned_start: data.planned_start,
            planned_end: data.planned_end,
            due_at: data.due_at,
            is_today: data.is_today,
            is_todo: data.is_todo,
            status: TaskStatus::Pending,
            completed_at: None,
            is_repeating: false,
            rule_id: None,
            source_rule_id: None,
            occurrence_date: None,
            created_at: now,
            updated_at: now,
        };

        insert_task_row(&mut tx, &task).await?;
        insert_tags(&mut tx, task.id, &data.tags).await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn find_task_by_id(&self, user_id: Uuid, id: Uuid) -> Result<Option<Task>, CoreError> {
        let task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    async fn find_tasks_by_short_id_prefix(&self, user_id: Uuid, short_id: &str) -> Result<Vec<Task>, CoreError> {
        let Some(pattern) = short_id_pattern(short_id) else {
            return Ok(Vec::new());
        };
        let tasks: Vec<Task> =
            sqlx::query_as("SELECT * FROM tasks WHERE user_id = $1 AND lower(hex(id)) LIKE $2")
                .bind(user_id)
                .bind(pattern)
                .fetch_all(self.pool())
                .await?;
        Ok(tasks)
    }

    async fn find_tasks(&self, user_id: Uuid, filters: &[TaskFilter]) -> Result<Vec<Task>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE user_id = ");
        qb.push_bind(user_id);

        for filter in filters {
            match filter {
                TaskFilter::Status(status) => {
                    qb.push(" AND status = ");
                    qb.push_bind(*status);
                }
                TaskFilter::Repeating(repeating) => {
                    qb.push(" AND is_repeating = ");
                    qb.push_bind(*repeating);
                }
                TaskFilter::FromRule(rule_id) => {
                    qb.push(" AND source_rule_id = ");
                    qb.push_bind(*rule_id);
                }
            }
        }

        qb.push(" ORDER BY due_at IS NULL, due_at, created_at");

        let tasks = qb.build_query_as::<Task>().fetch_all(self.pool()).await?;
        Ok(tasks)
    }

    async fn find_task_tags(&self, task_id: Uuid) -> Result<Vec<String>, CoreError> {
        let tags: Vec<String> =
            sqlx::query_scalar("SELECT tag_name FROM task_tags WHERE task_id = $1 ORDER BY tag_name")
                .bind(task_id)
                .fetch_all(self.pool())
                .await?;
        Ok(tags)
    }

    async fn complete_task(&self, user_id: Uuid, id: Uuid) -> Result<Task, CoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"UPDATE tasks SET status = $1, completed_at = $2, updated_at = $3
            WHERE id = $4 AND user_id = $5 AND is_repeating = FALSE"#,
        )
        .bind(TaskStatus::Completed)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_task_by_id(user_id, id).await? {
                Some(_) => Err(CoreError::InvalidInput(
                    "Repeating definitions cannot be completed; complete one of their instances".to_string(),
                )),
                None => Err(CoreError::NotFound(id.to_string())),
            };
        }

        self.find_task_by_id(user_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn delete_task(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(rule_id) = task.rule_id {
            delete_orphaned_rule(&mut tx, rule_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn attach_rule(&self, user_id: Uuid, task_id: Uuid, rule: &RecurrenceRule) -> Result<Uuid, CoreError> {
        let mut tx = self.pool().begin().await?;

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", task_id)))?;

        if task.is_generated() {
            return Err(CoreError::InvalidInput(
                "Generated instances cannot become repeating definitions".to_string(),
            ));
        }

        let rule_id = write_rule(&mut *tx, user_id, task.rule_id, rule).await?;

        sqlx::query("UPDATE tasks SET is_repeating = TRUE, rule_id = $1, updated_at = $2 WHERE id = $3")
            .bind(rule_id)
            .bind(Utc::now())
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(rule_id)
    }

    async fn unlink_rule(&self, user_id: Uuid, task_id: Uuid) -> Result<Option<Uuid>, CoreError> {
        let mut tx = self.pool().begin().await?;

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(task_id.to_string()))?;

        sqlx::query("UPDATE tasks SET is_repeating = FALSE, rule_id = NULL, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        let mut removed = None;
        if let Some(rule_id) = task.rule_id {
            if delete_orphaned_rule(&mut tx, rule_id).await? {
                removed = Some(rule_id);
            }
        }

        tx.commit().await?;
        Ok(removed)
    }
}

pub(crate) async fn insert_task_row<'a>(tx: &mut Transaction<'a, Sqlite>, task: &Task) -> Result<(), CoreError> {
    sqlx::query(
        r#"INSERT INTO tasks (id, user_id, title, category, unit, target_amount, remaining_amount,
            planned_start, planned_end, due_at, is_today, is_todo, status, completed_at,
            is_repeating, rule_id, source_rule_id, occurrence_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"#,
    )
    .bind(task.id)
    .bind(task.user_id)
    .bind(&task.title)
    .bind(&task.category)
    .bind(&task.unit)
    .bind(task.target_amount)
    .bind(task.remaining_amount)
    .bind(task.planned_start)
    .bind(task.planned_end)
    .bind(task.due_at)
    .bind(task.is_today)
    .bind(task.is_todo)
    .bind(task.status)
    .bind(task.completed_at)
    .bind(task.is_repeating)
    .bind(task.rule_id)
    .bind(task.source_rule_id)
    .bind(task.occurrence_date)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn insert_tags<'a>(tx: &mut Transaction<'a, Sqlite>, task_id: Uuid, tags: &[String]) -> Result<(), CoreError> {
    if tags.is_empty() {
        return Ok(());
    }
    let mut unique: Vec<&String> = tags.iter().collect();
    unique.sort();
    unique.dedup();

    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO task_tags (task_id, tag_name) ");
    query_builder.push_values(unique, |mut b, tag| {
        b.push_bind(task_id).push_bind(tag.clone());
    });
    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Deletes `rule_id` when no task references it as its definition any more.
async fn delete_orphaned_rule<'a>(tx: &mut Transaction<'a, Sqlite>, rule_id: Uuid) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"DELETE FROM recurrence_rules
        WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM tasks WHERE rule_id = $2)"#,
    )
    .bind(rule_id)
    .bind(rule_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() > 0 {
        tracing::info!(%rule_id, "removed orphaned recurrence rule");
    }
    Ok(result.rows_affected() > 0)
}
