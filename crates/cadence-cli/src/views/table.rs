use cadence_core::models::{MonthlyRule, RecurrencePattern, RecurrenceRule, Task, TaskStatus};
use cadence_core::rule::weekday_tag;
use cadence_core::timezone::format_with_timezone;
use chrono::{DateTime, Utc};
use chrono_humanize::Humanize;
use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ViewTask {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub unit: Option<String>,
    pub target_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub is_repeating: bool,
    pub is_generated: bool,
    pub is_today: bool,
}

impl ViewTask {
    pub fn new(task: Task, tags: Vec<String>) -> Self {
        Self {
            id: task.id,
            is_generated: task.is_generated(),
            title: task.title,
            status: task.status,
            due_at: task.due_at,
            category: task.category,
            tags,
            unit: task.unit,
            target_amount: task.target_amount,
            remaining_amount: task.remaining_amount,
            is_repeating: task.is_repeating,
            is_today: task.is_today,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewRule {
    pub id: Uuid,
    pub task_title: Option<String>,
    pub rule: RecurrenceRule,
    pub active: bool,
}

fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// One-line human description of a rule's pattern, e.g. "every 2 weeks on mon, thu".
pub fn describe_rule(rule: &RecurrenceRule) -> String {
    let every = |unit: &str| {
        if rule.interval > 1 {
            format!("every {} {}s", rule.interval, unit)
        } else {
            format!("every {}", unit)
        }
    };

    match &rule.pattern {
        RecurrencePattern::Daily => every("day"),
        RecurrencePattern::Weekly { weekdays } => {
            let days: Vec<&str> = weekdays.iter().map(|d| weekday_tag(*d)).collect();
            format!("{} on {}", every("week"), days.join(", "))
        }
        RecurrencePattern::Monthly { on } => match on {
            MonthlyRule::DayOfMonth { day } => format!("{} on day {}", every("month"), day),
            MonthlyRule::NthWeekday { nth, weekday } => {
                format!("{} on {} #{}", every("month"), weekday_tag(*weekday), nth)
            }
            MonthlyRule::EndOfMonth => format!("{} on the last day", every("month")),
        },
        RecurrencePattern::Yearly { month, day } => {
            format!("{} on {:02}-{:02}", every("year"), month, day)
        }
        RecurrencePattern::AfterDays { n } => format!("{} day(s) after each pass", n),
        RecurrencePattern::AfterHours { n } => format!("{} hour(s) after each pass", n),
    }
}

pub fn display_tasks(tasks: &[ViewTask], tz: &Tz) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Status", "Due", "Progress", "Category", "Tags"]);

    let now = Utc::now();
    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&task.id)));

        let mut display_title = String::new();
        if task.is_repeating {
            display_title.push_str("↻ ");
        }
        display_title.push_str(&task.title);
        if task.is_today {
            display_title.push_str(" ★");
        }

        let mut title_cell = Cell::new(display_title);
        title_cell = match task.status {
            TaskStatus::Completed => title_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey),
            TaskStatus::Pending if task.is_repeating => title_cell.fg(Color::Cyan),
            TaskStatus::Pending => title_cell,
        };
        row.add_cell(title_cell);

        let status_cell = match task.status {
            TaskStatus::Completed => Cell::new("completed").fg(Color::Green),
            TaskStatus::Pending if task.is_repeating => Cell::new("repeating"),
            TaskStatus::Pending => Cell::new("pending"),
        };
        row.add_cell(status_cell);

        let due_cell = match task.due_at {
            Some(due_at) => {
                let text = format!(
                    "{} ({})",
                    format_with_timezone(due_at, tz, "%Y-%m-%d %H:%M"),
                    due_at.humanize()
                );
                if task.status == TaskStatus::Pending && due_at < now {
                    Cell::new(text).fg(Color::Red)
                } else {
                    Cell::new(text)
                }
            }
            None => Cell::new("None"),
        };
        row.add_cell(due_cell);

        let progress = match (task.remaining_amount, task.target_amount) {
            (Some(remaining), Some(target)) => format!(
                "{}/{} {}",
                target - remaining,
                target,
                task.unit.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            _ => "-".to_string(),
        };
        row.add_cell(Cell::new(progress));

        row.add_cell(Cell::new(task.category.as_deref().unwrap_or("None")));
        row.add_cell(Cell::new(if task.tags.is_empty() {
            "None".to_string()
        } else {
            task.tags.join(", ")
        }));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_rules(rules: &[ViewRule]) {
    if rules.is_empty() {
        println!("No rules found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Task", "Repeats", "Time", "Timezone", "Policy", "Active"]);

    for view in rules {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&view.id)));
        row.add_cell(Cell::new(view.task_title.as_deref().unwrap_or("(no task)")));
        row.add_cell(Cell::new(describe_rule(&view.rule)));
        row.add_cell(Cell::new(
            view.rule
                .time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));
        row.add_cell(Cell::new(view.rule.timezone.name()));
        row.add_cell(Cell::new(view.rule.policy.to_string()));
        row.add_cell(if view.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("paused").fg(Color::Yellow)
        });
        table.add_row(row);
    }

    println!("{table}");
}
