use cadence_core::models::TaskStatus;
use cadence_core::rule::RuleInput;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Recurring tasks that show up exactly once, when they are due
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage tasks and their repetition
    Task(TaskCommand),
    /// Inspect and manage recurrence rules
    Rule(RuleCommand),
    /// Daily workflow
    Day(DayCommand),
}

// ============================================================================
// task
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskSubcommand {
    /// Add a new task, optionally repeating
    Add(AddCommand),
    /// List tasks
    List(ListCommand),
    /// Mark a task as completed
    Done(DoneCommand),
    /// Delete a task
    Delete(DeleteCommand),
    /// Make a task repeat, or change how it repeats
    Repeat(RepeatCommand),
    /// Stop a task repeating
    Unrepeat(UnrepeatCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title of the task
    pub title: String,
    #[arg(short, long)]
    pub category: Option<String>,
    /// Tags to add to the task
    #[arg(short, long, num_args = 1..)]
    pub tag: Vec<String>,
    /// Unit of the target amount (e.g. "pages")
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long)]
    pub target: Option<f64>,
    /// Due date, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM" in the default timezone
    #[arg(short, long)]
    pub due: Option<String>,
    /// Planned start, same format as --due
    #[arg(long)]
    pub start: Option<String>,
    /// Planned end, same format as --due
    #[arg(long)]
    pub end: Option<String>,
    /// Put the task on today's list
    #[arg(long)]
    pub today: bool,
    /// Put the task on the to-do list
    #[arg(long)]
    pub todo: bool,
    #[command(flatten)]
    pub repeat: RepeatArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    Pending,
    Completed,
}

impl From<StatusArg> for TaskStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => TaskStatus::Pending,
            StatusArg::Completed => TaskStatus::Completed,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// Only tasks with this status
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Only repeating definitions
    #[arg(long, conflicts_with = "rule")]
    pub repeating: bool,
    /// Only instances generated by this rule (ID or prefix)
    #[arg(long)]
    pub rule: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DoneCommand {
    /// The ID of the task to mark as completed
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID of the task to delete
    pub id: String,
    /// Force deletion without confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RepeatCommand {
    /// The ID of the task
    pub id: String,
    #[command(flatten)]
    pub repeat: RepeatArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct UnrepeatCommand {
    /// The ID of the task
    pub id: String,
}

/// Recurrence flags shared by `task add` and `task repeat`.
#[derive(Args, Debug, Clone, Default)]
pub struct RepeatArgs {
    /// Rule type: daily, weekly, monthly, yearly, after_days, after_hours
    #[arg(long)]
    pub every: Option<String>,
    /// Every N days/weeks/months/years
    #[arg(long)]
    pub interval: Option<i64>,
    /// Time of day, 24-hour HH:MM
    #[arg(long)]
    pub at: Option<String>,
    /// Weekdays for weekly rules (mon,tue,...)
    #[arg(long, value_delimiter = ',')]
    pub on: Vec<String>,
    /// Day of month for monthly rules
    #[arg(long)]
    pub day_of_month: Option<i64>,
    /// Occurrence of --weekday within the month (1-5)
    #[arg(long, requires = "weekday")]
    pub nth: Option<i64>,
    #[arg(long)]
    pub weekday: Option<String>,
    /// Last day of every month
    #[arg(long)]
    pub end_of_month: bool,
    /// Month for yearly rules
    #[arg(long)]
    pub month: Option<i64>,
    /// Day for yearly rules
    #[arg(long)]
    pub day: Option<i64>,
    /// N for after_days / after_hours
    #[arg(long)]
    pub n: Option<i64>,
    /// When instances are created: immediate, same, before
    #[arg(long)]
    pub policy: Option<String>,
    /// Days ahead for the "before" policy
    #[arg(long)]
    pub advance_days: Option<i64>,
    /// Rule timezone (IANA name); defaults to the configured timezone
    #[arg(long)]
    pub timezone: Option<String>,
    /// Put generated instances on today's list
    #[arg(long)]
    pub mark_today: bool,
    /// Put generated instances on the to-do list
    #[arg(long)]
    pub mark_todo: bool,
}

impl RepeatArgs {
    /// Builds the rule payload, or `None` when no `--every` was given.
    pub fn to_input(&self, default_timezone: &str) -> Option<RuleInput> {
        let kind = self.every.clone()?;
        Some(RuleInput {
            kind,
            interval: self.interval,
            time: self.at.clone(),
            timezone: Some(self.timezone.clone().unwrap_or_else(|| default_timezone.to_string())),
            weekdays: self.on.clone(),
            day_of_month: self.day_of_month,
            nth: self.nth,
            weekday: self.weekday.clone(),
            end_of_month: self.end_of_month,
            month: self.month,
            day: self.day,
            n: self.n,
            generate_policy: self.policy.clone(),
            advance_days: self.advance_days,
            default_today_flag: self.mark_today,
            default_todo_flag: self.mark_todo,
        })
    }
}

// ============================================================================
// rule
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct RuleCommand {
    #[command(subcommand)]
    pub command: RuleSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RuleSubcommand {
    /// List rules
    List,
    /// Show a rule and its upcoming occurrences
    Show(ShowRuleCommand),
    /// Stop generating instances for a rule
    Pause(RuleIdCommand),
    /// Resume a paused rule
    Resume(RuleIdCommand),
    /// Delete a rule; generated instances are kept
    Delete(DeleteRuleCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ShowRuleCommand {
    /// The ID of the rule
    pub id: String,
    /// Number of upcoming occurrences to preview
    #[arg(short, long, default_value_t = 5)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct RuleIdCommand {
    /// The ID of the rule
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteRuleCommand {
    /// The ID of the rule
    pub id: String,
    /// Force deletion without confirmation
    #[arg(short, long)]
    pub force: bool,
}

// ============================================================================
// day
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct DayCommand {
    #[command(subcommand)]
    pub command: DaySubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DaySubcommand {
    /// Generate due instances and show today's tasks
    Start(StartDayCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct StartDayCommand {
    /// Timezone whose "today" is shown; defaults to the configured timezone
    #[arg(long)]
    pub timezone: Option<String>,
    /// Pretend it is this instant (RFC 3339, or "YYYY-MM-DD HH:MM" local)
    #[arg(long)]
    pub now: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_args_build_weekly_payload() {
        let cli = Cli::try_parse_from([
            "cadence", "task", "add", "Gym", "--every", "weekly", "--on", "mon,thu", "--at", "07:00",
        ])
        .unwrap();

        let Commands::Task(TaskCommand {
            command: TaskSubcommand::Add(add),
        }) = cli.command
        else {
            panic!("expected task add");
        };

        let input = add.repeat.to_input("Europe/Berlin").unwrap();
        assert_eq!(input.kind, "weekly");
        assert_eq!(input.weekdays, vec!["mon".to_string(), "thu".to_string()]);
        assert_eq!(input.time.as_deref(), Some("07:00"));
        assert_eq!(input.timezone.as_deref(), Some("Europe/Berlin"));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_no_every_means_no_rule() {
        let cli = Cli::try_parse_from(["cadence", "task", "add", "One-off"]).unwrap();
        let Commands::Task(TaskCommand {
            command: TaskSubcommand::Add(add),
        }) = cli.command
        else {
            panic!("expected task add");
        };
        assert!(add.repeat.to_input("UTC").is_none());
    }

    #[test]
    fn test_status_filter_maps_to_task_status() {
        let cli = Cli::try_parse_from(["cadence", "task", "list", "--status", "completed"]).unwrap();
        let Commands::Task(TaskCommand {
            command: TaskSubcommand::List(list),
        }) = cli.command
        else {
            panic!("expected task list");
        };
        assert_eq!(list.status.map(TaskStatus::from), Some(TaskStatus::Completed));

        assert!(Cli::try_parse_from(["cadence", "task", "list", "--status", "archived"]).is_err());
    }

    #[test]
    fn test_nth_requires_weekday() {
        let result = Cli::try_parse_from(["cadence", "task", "repeat", "abcd", "--every", "monthly", "--nth", "2"]);
        assert!(result.is_err());
    }
}
