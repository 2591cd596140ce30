//! Generation passes: turning active rules into concrete task instances.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::time::Instant;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::models::{NewInstanceData, StoredRule, Task, TaskTemplate};
use crate::policy::should_generate_now;
use crate::recurrence::{default_time, next_occurrence_at};
use crate::repository::{InstanceRepository, RuleRepository};
use crate::timezone::{day_bounds_utc, local_date, localize};

/// Statistics collected during one generation pass
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    /// Number of active rules evaluated
    pub rules_processed: usize,
    /// Instances created by this pass
    pub created: Vec<Task>,
    /// Rules whose policy window has not opened yet
    pub skipped_not_due: usize,
    /// Rules whose next occurrence already has an instance
    pub skipped_existing: usize,
    /// Number of rules that failed
    pub rules_with_errors: usize,
    /// Detailed error messages
    pub errors: Vec<String>,
    /// Time taken for the pass
    pub duration_ms: u64,
}

/// Result of the "start my day" trigger.
#[derive(Debug, Clone)]
pub struct DayStart {
    /// Local date the day view was built for
    pub date: NaiveDate,
    pub summary: GenerationSummary,
    /// Every non-definition task of the user due on `date`
    pub tasks: Vec<Task>,
}

/// What a single rule contributed to a pass.
#[derive(Debug)]
enum RuleOutcome {
    Created(Task),
    NotDue,
    AlreadyExists,
}

/// Time of day for a rule's occurrences: the rule's own time, else the clock
/// time of the template's planned start (in the rule's zone), else 09:00.
pub fn resolve_time(stored: &StoredRule, template: &TaskTemplate) -> NaiveTime {
    let tz = stored.rule.timezone;
    stored
        .rule
        .time
        .or_else(|| template.planned_start.map(|start| start.with_timezone(&tz).time()))
        .unwrap_or_else(default_time)
}

/// Decides what instance, if any, a rule calls for at `now`.
///
/// Pure: no storage access. Returns `None` when the policy window is closed.
pub fn plan_instance(stored: &StoredRule, template: &TaskTemplate, now: DateTime<Utc>) -> Option<NewInstanceData> {
    let rule = &stored.rule;
    let tz = rule.timezone;
    let local_now = now.with_timezone(&tz);

    let time = resolve_time(stored, template);
    let due = next_occurrence_at(rule, time, local_now);

    if !should_generate_now(due, rule.policy, local_now) {
        return None;
    }

    let occurrence_date = due.date_naive();
    let (planned_start, planned_end) = translate_window(template, &tz, occurrence_date);

    Some(NewInstanceData {
        user_id: stored.user_id,
        rule_id: stored.id,
        occurrence_date,
        due_at: due.with_timezone(&Utc),
        title: template.title.clone(),
        category: template.category.clone(),
        tags: template.tags.clone(),
        unit: template.unit.clone(),
        target_amount: template.target_amount,
        // A fresh occurrence starts with nothing done
        remaining_amount: template.target_amount.or(template.remaining_amount),
        planned_start,
        planned_end,
        is_today: rule.default_today_flag,
        is_todo: rule.default_todo_flag,
    })
}

/// Moves the template's planned window onto `date`, keeping the start's
/// local clock time and the window's length.
fn translate_window(
    template: &TaskTemplate,
    tz: &Tz,
    date: NaiveDate,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match (template.planned_start, template.planned_end) {
        (Some(start), end) => {
            let new_start = localize(tz, date, start.with_timezone(tz).time()).with_timezone(&Utc);
            let new_end = end.map(|end| new_start + (end - start));
            (Some(new_start), new_end)
        }
        (None, Some(end)) => {
            let new_end = localize(tz, date, end.with_timezone(tz).time()).with_timezone(&Utc);
            (None, Some(new_end))
        }
        (None, None) => (None, None),
    }
}

/// Runs generation passes for one user at a time.
///
/// Calls for different users never interact. Concurrent passes for the same
/// user are tolerated: a lost race surfaces as a duplicate insert, which is
/// counted as an existing instance.
pub struct InstanceGenerator<'a, S, C> {
    store: &'a S,
    clock: &'a C,
}

impl<'a, S, C> InstanceGenerator<'a, S, C>
where
    S: RuleRepository + InstanceRepository + Sync,
    C: Clock,
{
    pub fn new(store: &'a S, clock: &'a C) -> Self {
        Self { store, clock }
    }

    /// Ensures every active rule of `user_id` has its due instance. Idempotent.
    ///
    /// Storage failures for one rule are logged and recorded in the summary;
    /// the remaining rules are still processed.
    pub async fn generate(&self, user_id: Uuid) -> Result<GenerationSummary, CoreError> {
        let started = Instant::now();
        let now = self.clock.now();
        let rules = self.store.find_active_rules_with_template(user_id).await?;

        let mut summary = GenerationSummary::default();
        for (stored, template) in &rules {
            summary.rules_processed += 1;
            match self.materialize(stored, template, now).await {
                Ok(RuleOutcome::Created(task)) => {
                    tracing::info!(
                        rule_id = %stored.id,
                        task_id = %task.id,
                        due_at = ?task.due_at,
                        "materialized '{}'",
                        task.title
                    );
                    summary.created.push(task);
                }
                Ok(RuleOutcome::NotDue) => summary.skipped_not_due += 1,
                Ok(RuleOutcome::AlreadyExists) => summary.skipped_existing += 1,
                Err(e) => {
                    tracing::warn!(rule_id = %stored.id, error = %e, "failed to materialize rule");
                    summary.rules_with_errors += 1;
                    summary.errors.push(format!("rule {}: {}", stored.id, e));
                }
            }
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            %user_id,
            rules = summary.rules_processed,
            created = summary.created.len(),
            errors = summary.rules_with_errors,
            "generation pass finished in {}ms",
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Generates, then lists what is due today in `tz`.
    ///
    /// Succeeds even if the pass itself could not run; the failure is
    /// reported in the summary.
    pub async fn start_day(&self, user_id: Uuid, tz: Tz) -> Result<DayStart, CoreError> {
        let summary = match self.generate(user_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(%user_id, error = %e, "generation pass failed");
                GenerationSummary {
                    rules_with_errors: 1,
                    errors: vec![e.to_string()],
                    ..Default::default()
                }
            }
        };

        let date = local_date(&tz, self.clock.now());
        let (start, end) = day_bounds_utc(&tz, date);
        let tasks = self.store.find_tasks_due_between(user_id, start, end).await?;

        Ok(DayStart {
            date,
            summary,
            tasks,
        })
    }

    async fn materialize(
        &self,
        stored: &StoredRule,
        template: &TaskTemplate,
        now: DateTime<Utc>,
    ) -> Result<RuleOutcome, CoreError> {
        let Some(plan) = plan_instance(stored, template, now) else {
            tracing::debug!(rule_id = %stored.id, "outside generation window");
            return Ok(RuleOutcome::NotDue);
        };

        let (start, end) = day_bounds_utc(&stored.rule.timezone, plan.occurrence_date);
        if let Some(existing) = self.store.find_generated_instance(stored.id, start, end).await? {
            tracing::debug!(rule_id = %stored.id, task_id = %existing.id, "instance already exists");
            return Ok(RuleOutcome::AlreadyExists);
        }

        match self.store.insert_generated_instance(plan).await {
            Ok(task) => Ok(RuleOutcome::Created(task)),
            Err(CoreError::DuplicateInstance { .. }) => Ok(RuleOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{GeneratePolicy, RecurrencePattern, RecurrenceRule, TaskStatus};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Asia::Tokyo;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory store for exercising the pass without SQLite.
    #[derive(Default)]
    struct MemoryStore {
        rules: Vec<(StoredRule, TaskTemplate)>,
        instances: Mutex<Vec<Task>>,
        failing_rules: HashSet<Uuid>,
        fail_listing: bool,
    }

    #[async_trait]
    impl RuleRepository for MemoryStore {
        async fn find_active_rules_with_template(&self, user_id: Uuid) -> Result<Vec<(StoredRule, TaskTemplate)>, CoreError> {
            if self.fail_listing {
                return Err(CoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(self
                .rules
                .iter()
                .filter(|(r, _)| r.user_id == user_id && r.active)
                .cloned()
                .collect())
        }

        async fn upsert_rule(&self, _: Uuid, rule_id: Option<Uuid>, _: &RecurrenceRule) -> Result<Uuid, CoreError> {
            Ok(rule_id.unwrap_or_else(Uuid::now_v7))
        }

        async fn find_rule(&self, user_id: Uuid, rule_id: Uuid) -> Result<Option<StoredRule>, CoreError> {
            Ok(self
                .rules
                .iter()
                .find(|(r, _)| r.id == rule_id && r.user_id == user_id)
                .map(|(r, _)| r.clone()))
        }

        async fn find_rules(&self, user_id: Uuid) -> Result<Vec<StoredRule>, CoreError> {
            Ok(self
                .rules
                .iter()
                .filter(|(r, _)| r.user_id == user_id)
                .map(|(r, _)| r.clone())
                .collect())
        }

        async fn find_rules_by_short_id_prefix(&self, _: Uuid, _: &str) -> Result<Vec<StoredRule>, CoreError> {
            Ok(vec![])
        }

        async fn set_rule_active(&self, _: Uuid, rule_id: Uuid, _: bool) -> Result<StoredRule, CoreError> {
            Err(CoreError::NotFound(rule_id.to_string()))
        }

        async fn delete_rule(&self, _: Uuid, rule_id: Uuid) -> Result<(), CoreError> {
            Err(CoreError::NotFound(rule_id.to_string()))
        }
    }

    #[async_trait]
    impl InstanceRepository for MemoryStore {
        async fn find_generated_instance(&self, rule_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Option<Task>, CoreError> {
            if self.failing_rules.contains(&rule_id) {
                return Err(CoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let instances = self.instances.lock().map_err(|_| CoreError::InvalidInput("poisoned".into()))?;
            Ok(instances
                .iter()
                .find(|t| {
                    t.source_rule_id == Some(rule_id)
                        && t.due_at.map(|d| d >= start && d < end).unwrap_or(false)
                })
                .cloned())
        }

        async fn insert_generated_instance(&self, data: NewInstanceData) -> Result<Task, CoreError> {
            let mut instances = self.instances.lock().map_err(|_| CoreError::InvalidInput("poisoned".into()))?;
            if instances
                .iter()
                .any(|t| t.source_rule_id == Some(data.rule_id) && t.occurrence_date == Some(data.occurrence_date))
            {
                return Err(CoreError::DuplicateInstance {
                    rule_id: data.rule_id,
                    date: data.occurrence_date,
                });
            }
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
            instances.push(task.clone());
            Ok(task)
        }

        async fn find_tasks_due_between(&self, user_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Task>, CoreError> {
            let instances = self.instances.lock().map_err(|_| CoreError::InvalidInput("poisoned".into()))?;
            Ok(instances
                .iter()
                .filter(|t| t.user_id == user_id && t.due_at.map(|d| d >= start && d < end).unwrap_or(false))
                .cloned()
                .collect())
        }
    }

    fn stored(user_id: Uuid, rule: RecurrenceRule) -> StoredRule {
        StoredRule {
            id: Uuid::now_v7(),
            user_id,
            rule,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn template(title: &str) -> TaskTemplate {
        TaskTemplate {
            task_id: Uuid::now_v7(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn daily_tokyo(time: Option<(u32, u32)>) -> RecurrenceRule {
        RecurrenceRule {
            pattern: RecurrencePattern::Daily,
            time: time.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            timezone: Tokyo,
            ..Default::default()
        }
    }

    fn tokyo(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Tokyo.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_resolve_time_prefers_rule_then_template() {
        let user = Uuid::now_v7();
        let mut tpl = template("Stretch");
        tpl.planned_start = Some(tokyo(1, 6, 45));

        let with_time = stored(user, daily_tokyo(Some((8, 0))));
        assert_eq!(resolve_time(&with_time, &tpl), NaiveTime::from_hms_opt(8, 0, 0).unwrap());

        let without_time = stored(user, daily_tokyo(None));
        assert_eq!(resolve_time(&without_time, &tpl), NaiveTime::from_hms_opt(6, 45, 0).unwrap());

        assert_eq!(resolve_time(&without_time, &template("Bare")), default_time());
    }

    #[test]
    fn test_plan_translates_planned_window() {
        let user = Uuid::now_v7();
        let mut tpl = template("Run");
        tpl.planned_start = Some(tokyo(1, 7, 0));
        tpl.planned_end = Some(tokyo(1, 7, 45));
        tpl.target_amount = Some(5.0);
        tpl.remaining_amount = Some(1.5);
        tpl.tags = vec!["health".to_string()];

        let mut rule = daily_tokyo(None);
        rule.default_today_flag = true;
        let plan = plan_instance(&stored(user, rule), &tpl, tokyo(10, 6, 0)).unwrap();

        assert_eq!(plan.due_at, tokyo(10, 7, 0));
        assert_eq!(plan.occurrence_date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(plan.planned_start, Some(tokyo(10, 7, 0)));
        assert_eq!(plan.planned_end, Some(tokyo(10, 7, 45)));
        assert_eq!(plan.remaining_amount, Some(5.0));
        assert_eq!(plan.tags, vec!["health".to_string()]);
        assert!(plan.is_today);
        assert!(!plan.is_todo);
    }

    #[test]
    fn test_plan_respects_policy_window() {
        let user = Uuid::now_v7();
        let mut rule = daily_tokyo(Some((9, 0)));
        rule.pattern = RecurrencePattern::Weekly {
            weekdays: vec![chrono::Weekday::Mon],
        };
        rule.policy = GeneratePolicy::Before { advance_days: 1 };
        let stored = stored(user, rule);

        // Wednesday: next Monday is five days out
        assert!(plan_instance(&stored, &template("Review"), tokyo(12, 10, 0)).is_none());
        // Sunday: the day before
        assert!(plan_instance(&stored, &template("Review"), tokyo(16, 10, 0)).is_some());
    }

    #[tokio::test]
    async fn test_generate_is_idempotent() {
        let user = Uuid::now_v7();
        let store = MemoryStore {
            rules: vec![(stored(user, daily_tokyo(Some((9, 0)))), template("Journal"))],
            ..Default::default()
        };
        let clock = FixedClock::new(tokyo(10, 8, 0));
        let generator = InstanceGenerator::new(&store, &clock);

        let first = generator.generate(user).await.unwrap();
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.created[0].due_at, Some(tokyo(10, 9, 0)));

        let second = generator.generate(user).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(store.instances.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_block_others() {
        let user = Uuid::now_v7();
        let broken = stored(user, daily_tokyo(Some((9, 0))));
        let healthy = stored(user, daily_tokyo(Some((10, 0))));
        let store = MemoryStore {
            failing_rules: HashSet::from([broken.id]),
            rules: vec![(broken, template("Broken")), (healthy, template("Healthy"))],
            ..Default::default()
        };
        let clock = FixedClock::new(tokyo(10, 8, 0));
        let generator = InstanceGenerator::new(&store, &clock);

        let summary = generator.generate(user).await.unwrap();
        assert_eq!(summary.rules_processed, 2);
        assert_eq!(summary.rules_with_errors, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.created[0].title, "Healthy");
    }

    #[tokio::test]
    async fn test_other_users_are_untouched() {
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let store = MemoryStore {
            rules: vec![
                (stored(alice, daily_tokyo(Some((9, 0)))), template("Alice")),
                (stored(bob, daily_tokyo(Some((9, 0)))), template("Bob")),
            ],
            ..Default::default()
        };
        let clock = FixedClock::new(tokyo(10, 8, 0));
        let summary = InstanceGenerator::new(&store, &clock).generate(alice).await.unwrap();
        assert_eq!(summary.rules_processed, 1);
        assert!(store.instances.lock().unwrap().iter().all(|t| t.user_id == alice));
    }

    #[tokio::test]
    async fn test_start_day_lists_tasks_even_when_listing_rules_fails() {
        let user = Uuid::now_v7();
        let store = MemoryStore {
            fail_listing: true,
            ..Default::default()
        };
        let clock = FixedClock::new(tokyo(10, 8, 0));
        let day = InstanceGenerator::new(&store, &clock)
            .start_day(user, Tokyo)
            .await
            .unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(day.summary.rules_with_errors, 1);
        assert!(day.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_start_day_returns_todays_instances() {
        let user = Uuid::now_v7();
        let store = MemoryStore {
            rules: vec![(stored(user, daily_tokyo(Some((21, 0)))), template("Read"))],
            ..Default::default()
        };
        let clock = FixedClock::new(tokyo(10, 8, 0));
        let generator = InstanceGenerator::new(&store, &clock);

        let day = generator.start_day(user, Tokyo).await.unwrap();
        assert_eq!(day.summary.created.len(), 1);
        assert_eq!(day.tasks.len(), 1);
        assert_eq!(day.tasks[0].title, "Read");

        // Past the slot, the next occurrence is tomorrow; today's instance stays listed
        clock.advance(Duration::hours(14));
        let later = generator.start_day(user, Tokyo).await.unwrap();
        assert_eq!(later.summary.created.len(), 1);
        assert_eq!(later.tasks.len(), 1);
        assert_eq!(later.tasks[0].due_at, Some(tokyo(10, 21, 0)));
    }
}
