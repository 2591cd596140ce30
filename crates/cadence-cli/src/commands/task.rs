use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::models::NewTaskData;
use cadence_core::repository::{Repository, TaskFilter};
use cadence_core::service::RuleService;
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};

use crate::cli::{
    AddCommand, DeleteCommand, DoneCommand, ListCommand, RepeatCommand, TaskCommand,
    TaskSubcommand, UnrepeatCommand,
};
use crate::util::{parse_local_datetime, resolve_rule_id, resolve_task_id, Session};
use crate::views::table::{display_tasks, ViewTask};

pub async fn task_command<R: Repository>(repo: &R, session: &Session, command: TaskCommand) -> Result<()> {
    match command.command {
        TaskSubcommand::Add(cmd) => add_task(repo, session, cmd).await,
        TaskSubcommand::List(cmd) => list_tasks(repo, session, cmd).await,
        TaskSubcommand::Done(cmd) => done_task(repo, session, cmd).await,
        TaskSubcommand::Delete(cmd) => delete_task(repo, session, cmd).await,
        TaskSubcommand::Repeat(cmd) => repeat_task(repo, session, cmd).await,
        TaskSubcommand::Unrepeat(cmd) => unrepeat_task(repo, session, cmd).await,
    }
}

async fn add_task<R: Repository>(repo: &R, session: &Session, command: AddCommand) -> Result<()> {
    let tz = &session.timezone;
    let due_at = command.due.as_deref().map(|d| parse_local_datetime(d, tz)).transpose()?;
    let planned_start = command.start.as_deref().map(|d| parse_local_datetime(d, tz)).transpose()?;
    let planned_end = command.end.as_deref().map(|d| parse_local_datetime(d, tz)).transpose()?;

    // Reject a bad rule before the task is written
    let rule_input = command.repeat.to_input(tz.name());
    if let Some(input) = &rule_input {
        input.validate().map_err(CoreError::from)?;
    }

    let task = repo
        .add_task(NewTaskData {
            user_id: session.user_id,
            title: command.title,
            category: command.category,
            tags: command.tag,
            unit: command.unit,
            target_amount: command.target,
            remaining_amount: None,
            planned_start,
            planned_end,
            due_at,
            is_today: command.today,
            is_todo: command.todo,
        })
        .await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();

    match rule_input {
        Some(input) => {
            let rule_id = RuleService::new(repo)
                .upsert_for_task(session.user_id, task.id, &input)
                .await?;
            println!(
                "{} Created repeating task: {}",
                "✓".style(success_style),
                task.title.bright_white().bold()
            );
            println!("  {} Task ID: {}", "→".style(info_style), task.id.to_string().yellow());
            println!("  {} Rule ID: {}", "→".style(info_style), rule_id.to_string().yellow());
            println!(
                "  {} Preview upcoming: cadence rule show {}",
                "→".style(info_style),
                &rule_id.to_string()[..8]
            );
        }
        None => {
            println!(
                "{} Created task: {}",
                "✓".style(success_style),
                task.title.bright_white().bold()
            );
            println!("  {} Task ID: {}", "→".style(info_style), task.id.to_string().yellow());
        }
    }

    Ok(())
}

async fn list_tasks<R: Repository>(repo: &R, session: &Session, command: ListCommand) -> Result<()> {
    let mut filters = Vec::new();
    if let Some(status) = command.status {
        filters.push(TaskFilter::Status(status.into()));
    }
    if command.repeating {
        filters.push(TaskFilter::Repeating(true));
    }
    if let Some(rule) = command.rule.as_deref() {
        let rule_id = resolve_rule_id(repo, session, rule).await?;
        filters.push(TaskFilter::FromRule(rule_id));
    }

    let tasks = repo.find_tasks(session.user_id, &filters).await?;

    let mut view_tasks = Vec::with_capacity(tasks.len());
    for task in tasks {
        let tags = repo.find_task_tags(task.id).await?;
        view_tasks.push(ViewTask::new(task, tags));
    }

    display_tasks(&view_tasks, &session.timezone);
    Ok(())
}

async fn done_task<R: Repository>(repo: &R, session: &Session, command: DoneCommand) -> Result<()> {
    let task_id = resolve_task_id(repo, session, &command.id).await?;
    let task = repo.complete_task(session.user_id, task_id).await?;
    println!("{} Completed task: '{}'", "✓".green().bold(), task.title);
    Ok(())
}

async fn delete_task<R: Repository>(repo: &R, session: &Session, command: DeleteCommand) -> Result<()> {
    let task_id = resolve_task_id(repo, session, &command.id).await?;
    let task = repo
        .find_task_by_id(session.user_id, task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Task with ID '{}' not found.", task_id)))?;

    if !command.force {
        let prompt = if task.is_repeating {
            format!("Delete repeating task '{}' and its rule?", task.title)
        } else {
            format!("Are you sure you want to delete task '{}'?", task.title)
        };
        let confirmation = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    repo.delete_task(session.user_id, task_id).await?;
    println!("Deleted task: '{}'", task.title);
    Ok(())
}

async fn repeat_task<R: Repository>(repo: &R, session: &Session, command: RepeatCommand) -> Result<()> {
    let task_id = resolve_task_id(repo, session, &command.id).await?;
    let input = command
        .repeat
        .to_input(session.timezone.name())
        .ok_or_else(|| anyhow!(CoreError::InvalidInput("--every is required".to_string())))?;

    let rule_id = RuleService::new(repo)
        .upsert_for_task(session.user_id, task_id, &input)
        .await?;
    println!(
        "{} Task repeats with rule {}",
        "✓".green().bold(),
        rule_id.to_string().yellow()
    );
    Ok(())
}

async fn unrepeat_task<R: Repository>(repo: &R, session: &Session, command: UnrepeatCommand) -> Result<()> {
    let task_id = resolve_task_id(repo, session, &command.id).await?;
    match RuleService::new(repo).stop_repeating(session.user_id, task_id).await? {
        Some(rule_id) => println!("Task no longer repeats; removed rule {}", rule_id),
        None => println!("Task was not repeating."),
    }
    Ok(())
}
