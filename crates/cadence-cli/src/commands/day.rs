use anyhow::Result;
use cadence_core::clock::{FixedClock, SystemClock};
use cadence_core::generator::InstanceGenerator;
use cadence_core::repository::Repository;
use cadence_core::timezone::parse_timezone;
use owo_colors::{OwoColorize, Style};

use crate::cli::{DayCommand, DaySubcommand, StartDayCommand};
use crate::util::{parse_instant, Session};
use crate::views::table::{display_tasks, ViewTask};

pub async fn day_command<R: Repository>(repo: &R, session: &Session, command: DayCommand) -> Result<()> {
    match command.command {
        DaySubcommand::Start(cmd) => start_day(repo, session, cmd).await,
    }
}

async fn start_day<R: Repository>(repo: &R, session: &Session, command: StartDayCommand) -> Result<()> {
    let tz = match command.timezone.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => session.timezone,
    };
    let day = match command.now.as_deref() {
        Some(input) => {
            let clock = FixedClock::new(parse_instant(input, &tz)?);
            InstanceGenerator::new(repo, &clock)
                .start_day(session.user_id, tz)
                .await?
        }
        None => {
            InstanceGenerator::new(repo, &SystemClock)
                .start_day(session.user_id, tz)
                .await?
        }
    };

    let summary = &day.summary;
    let heading = Style::new().blue().bold();
    println!("{} {}", "Today:".style(heading), day.date.format("%A, %Y-%m-%d"));

    for task in &summary.created {
        println!("  {} Generated '{}'", "+".green().bold(), task.title);
    }
    for error in &summary.errors {
        println!("  {} {}", "!".red().bold(), error);
    }
    println!(
        "{}",
        format!(
            "  {} rule(s) checked, {} created, {} already present, {} not yet due",
            summary.rules_processed,
            summary.created.len(),
            summary.skipped_existing,
            summary.skipped_not_due
        )
        .bright_black()
    );
    println!();

    let mut view_tasks = Vec::with_capacity(day.tasks.len());
    for task in day.tasks {
        let tags = repo.find_task_tags(task.id).await?;
        view_tasks.push(ViewTask::new(task, tags));
    }
    display_tasks(&view_tasks, &tz);
    Ok(())
}
