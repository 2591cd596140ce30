use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

/// A task record. The same table holds three kinds of rows:
///
/// - plain tasks (`is_repeating = false`, `source_rule_id = None`)
/// - repeating definitions, which act as templates (`is_repeating = true`, `rule_id` set)
/// - generated instances (`source_rule_id` and `occurrence_date` set)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub target_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub is_today: bool,
    pub is_todo: bool,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_repeating: bool,
    /// Rule owned by this definition (1:1)
    pub rule_id: Option<Uuid>,
    /// Rule that materialized this instance; cleared if the rule is deleted
    pub source_rule_id: Option<Uuid>,
    /// Calendar date of `due_at` in the rule's timezone
    pub occurrence_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_generated(&self) -> bool {
        self.occurrence_date.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub user_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub unit: Option<String>,
    pub target_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub is_today: bool,
    pub is_todo: bool,
}

/// Fields of a repeating definition that are copied onto each generated instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTemplate {
    pub task_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub unit: Option<String>,
    pub target_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
}

impl TaskTemplate {
    pub fn from_task(task: &Task, tags: Vec<String>) -> Self {
        Self {
            task_id: task.id,
            title: task.title.clone(),
            category: task.category.clone(),
            tags,
            unit: task.unit.clone(),
            target_amount: task.target_amount,
            remaining_amount: task.remaining_amount,
            planned_start: task.planned_start,
            planned_end: task.planned_end,
        }
    }
}

/// Everything needed to insert one generated instance.
#[derive(Debug, Clone)]
pub struct NewInstanceData {
    pub user_id: Uuid,
    pub rule_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub due_at: DateTime<Utc>,
    pub title: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub unit: Option<String>,
    pub target_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub is_today: bool,
    pub is_todo: bool,
}

// ============================================================================
// Recurrence rules
// ============================================================================

/// How a monthly rule picks its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MonthlyRule {
    /// Fixed day, clamped to the length of each month
    DayOfMonth { day: u32 },
    /// e.g. "2nd Tuesday"; a 5th weekday that does not exist falls back to the 4th
    NthWeekday { nth: u32, weekday: Weekday },
    EndOfMonth,
}

/// The shape of a recurrence, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    /// Weekdays are de-duplicated and sorted Monday-first.
    Weekly { weekdays: Vec<Weekday> },
    Monthly { on: MonthlyRule },
    Yearly { month: u32, day: u32 },
    /// `n` days after the generation pass that evaluates the rule.
    AfterDays { n: u32 },
    /// `n` hours after the generation pass that evaluates the rule.
    AfterHours { n: u32 },
}

impl RecurrencePattern {
    pub fn type_name(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly { .. } => "weekly",
            RecurrencePattern::Monthly { .. } => "monthly",
            RecurrencePattern::Yearly { .. } => "yearly",
            RecurrencePattern::AfterDays { .. } => "after_days",
            RecurrencePattern::AfterHours { .. } => "after_hours",
        }
    }
}

/// When an instance should appear relative to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratePolicy {
    /// Every generation pass ensures the next occurrence exists.
    Immediate,
    /// Only from the start of the due date's local day.
    SameDay,
    /// From the start of the local day `advance_days` before the due date.
    Before { advance_days: u32 },
}

impl GeneratePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratePolicy::Immediate => "immediate",
            GeneratePolicy::SameDay => "same",
            GeneratePolicy::Before { .. } => "before",
        }
    }

    pub fn advance_days(&self) -> u32 {
        match self {
            GeneratePolicy::Before { advance_days } => *advance_days,
            _ => 0,
        }
    }
}

impl std::fmt::Display for GeneratePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratePolicy::Before { advance_days } => write!(f, "before ({} days)", advance_days),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// A validated recurrence rule. Build one through [`crate::rule::RuleInput::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    /// Every N units; meaningful for daily, weekly, monthly and yearly rules
    pub interval: u32,
    /// Target local time; resolved by the generator when absent
    pub time: Option<NaiveTime>,
    pub timezone: Tz,
    pub policy: GeneratePolicy,
    pub default_today_flag: bool,
    pub default_todo_flag: bool,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            pattern: RecurrencePattern::Daily,
            interval: 1,
            time: None,
            timezone: Tz::UTC,
            policy: GeneratePolicy::Immediate,
            default_today_flag: false,
            default_todo_flag: false,
        }
    }
}

/// A rule as persisted: identity, ownership and lifecycle around a [`RecurrenceRule`].
#[derive(Debug, Clone)]
pub struct StoredRule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub rule: RecurrenceRule,
    /// Paused rules are skipped by generation passes
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
