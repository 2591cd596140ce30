use crate::error::CoreError;
use crate::models::{GeneratePolicy, RecurrencePattern, RecurrenceRule, StoredRule, Task, TaskTemplate};
use crate::repository::{short_id_pattern, SqliteRepository, TaskRepository};
use crate::rule::MAX_INTERVAL;
use crate::timezone::parse_timezone;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

/// Row shape of `recurrence_rules`.
#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    user_id: Uuid,
    pattern: String,
    interval: i64,
    time: Option<NaiveTime>,
    timezone: String,
    generate_policy: String,
    advance_days: i64,
    default_today_flag: bool,
    default_todo_flag: bool,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for StoredRule {
    type Error = CoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |detail: String| CoreError::CorruptRule(id, detail);

        let pattern: RecurrencePattern =
            serde_json::from_str(&row.pattern).map_err(|e| corrupt(format!("pattern: {}", e)))?;
        let interval = u32::try_from(row.interval)
            .ok()
            .filter(|i| (1..=MAX_INTERVAL).contains(i))
            .ok_or_else(|| corrupt(format!("interval {}", row.interval)))?;
        let timezone = parse_timezone(&row.timezone).map_err(|e| corrupt(e.to_string()))?;
        let advance_days = u32::try_from(row.advance_days)
            .map_err(|_| corrupt(format!("advance_days {}", row.advance_days)))?;
        let policy = match row.generate_policy.as_str() {
            "immediate" => GeneratePolicy::Immediate,
            "same" => GeneratePolicy::SameDay,
            "before" => GeneratePolicy::Before { advance_days },
            other => return Err(corrupt(format!("generate_policy {}", other))),
        };

        Ok(StoredRule {
            id: row.id,
            user_id: row.user_id,
            rule: RecurrenceRule {
                pattern,
                interval,
                time: row.time,
                timezone,
                policy,
                default_today_flag: row.default_today_flag,
                default_todo_flag: row.default_todo_flag,
            },
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl SqliteRepository {
    /// Template fields of the repeating definition that owns `rule_id`.
    async fn load_template(&self, user_id: Uuid, rule_id: Uuid) -> Result<Option<TaskTemplate>, CoreError> {
        let definition: Option<Task> = sqlx::query_as(
            "SELECT * FROM tasks WHERE rule_id = $1 AND user_id = $2 AND is_repeating = TRUE",
        )
        .bind(rule_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(definition) = definition else {
            return Ok(None);
        };
        let tags = self.find_task_tags(definition.id).await?;
        Ok(Some(TaskTemplate::from_task(&definition, tags)))
    }
}

fn pattern_json(rule: &RecurrenceRule) -> Result<String, CoreError> {
    serde_json::to_string(&rule.pattern).map_err(|e| CoreError::InvalidInput(e.to_string()))
}

fn convert_rows(rows: Vec<RuleRow>) -> Result<Vec<StoredRule>, CoreError> {
    rows.into_iter().map(StoredRule::try_from).collect()
}

#[async_trait]
impl super::RuleRepository for SqliteRepository {
    async fn find_active_rules_with_template(&self, user_id: Uuid) -> Result<Vec<(StoredRule, TaskTemplate)>, CoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT * FROM recurrence_rules WHERE user_id = $1 AND active = TRUE ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let rule_id = row.id;
            // A stored rule that no longer parses must not block the others
            let stored = match StoredRule::try_from(row) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(%rule_id, "skipping unreadable rule: {}", e);
                    continue;
                }
            };

            match self.load_template(user_id, rule_id).await {
                Ok(Some(template)) => result.push((stored, template)),
                Ok(None) => {
                    tracing::debug!(%rule_id, "rule has no repeating definition, skipping");
                }
                Err(e) => {
                    tracing::warn!(%rule_id, error = %e, "skipping rule with unreadable definition");
                }
            }
        }

        Ok(result)
    }

    async fn upsert_rule(&self, user_id: Uuid, rule_id: Option<Uuid>, rule: &RecurrenceRule) -> Result<Uuid, CoreError> {
        let mut conn = self.pool().acquire().await?;
        write_rule(&mut *conn, user_id, rule_id, rule).await
    }

    async fn find_rule(&self, user_id: Uuid, rule_id: Uuid) -> Result<Option<StoredRule>, CoreError> {
        let row: Option<RuleRow> =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1 AND user_id = $2")
                .bind(rule_id)
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(StoredRule::try_from).transpose()
    }

    async fn find_rules(&self, user_id: Uuid) -> Result<Vec<StoredRule>, CoreError> {
        let rows: Vec<RuleRow> =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(self.pool())
                .await?;
        convert_rows(rows)
    }

    async fn find_rules_by_short_id_prefix(&self, user_id: Uuid, short_id: &str) -> Result<Vec<StoredRule>, CoreError> {
        let Some(pattern) = short_id_pattern(short_id) else {
            return Ok(Vec::new());
        };
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT * FROM recurrence_rules WHERE user_id = $1 AND lower(hex(id)) LIKE $2",
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(self.pool())
        .await?;
        convert_rows(rows)
    }

    async fn set_rule_active(&self, user_id: Uuid, rule_id: Uuid, active: bool) -> Result<StoredRule, CoreError> {
        let result = sqlx::query(
            "UPDATE recurrence_rules SET active = $1, updated_at = $2 WHERE id = $3 AND user_id = $4",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(rule_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Rule with id {} not found", rule_id)));
        }

        self.find_rule(user_id, rule_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Rule with id {} not found", rule_id)))
    }

    async fn delete_rule(&self, user_id: Uuid, rule_id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "UPDATE tasks SET is_repeating = FALSE, updated_at = $1 WHERE rule_id = $2 AND user_id = $3",
        )
        .bind(Utc::now())
        .bind(rule_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        // rule_id / source_rule_id are cleared by ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM recurrence_rules WHERE id = $1 AND user_id = $2")
            .bind(rule_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Rule with id {} not found", rule_id)));
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Updates `rule_id` in place when given, otherwise inserts a new rule.
pub(crate) async fn write_rule(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    rule_id: Option<Uuid>,
    rule: &RecurrenceRule,
) -> Result<Uuid, CoreError> {
    let pattern = pattern_json(rule)?;
    let now = Utc::now();

    match rule_id {
        Some(id) => {
            let result = sqlx::query(
                r#"UPDATE recurrence_rules
                SET pattern = $1, interval = $2, time = $3, timezone = $4, generate_policy = $5,
                    advance_days = $6, default_today_flag = $7, default_todo_flag = $8, updated_at = $9
                WHERE id = $10 AND user_id = $11"#,
            )
            .bind(&pattern)
            .bind(i64::from(rule.interval))
            .bind(rule.time)
            .bind(rule.timezone.name())
            .bind(rule.policy.as_str())
            .bind(i64::from(rule.policy.advance_days()))
            .bind(rule.default_today_flag)
            .bind(rule.default_todo_flag)
            .bind(now)
            .bind(id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::NotFound(format!("Rule with id {} not found", id)));
            }
            Ok(id)
        }
        None => {
            let id = Uuid::now_v7();
            sqlx::query(
                r#"INSERT INTO recurrence_rules (id, user_id, pattern, interval, time, timezone, generate_policy,
                    advance_days, default_today_flag, default_todo_flag, active, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11, $12)"#,
            )
            .bind(id)
            .bind(user_id)
            .bind(&pattern)
            .bind(i64::from(rule.interval))
            .bind(rule.time)
            .bind(rule.timezone.name())
            .bind(rule.policy.as_str())
            .bind(i64::from(rule.policy.advance_days()))
            .bind(rule.default_today_flag)
            .bind(rule.default_todo_flag)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(id)
        }
    }
}
