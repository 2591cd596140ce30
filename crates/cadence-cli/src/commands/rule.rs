use std::collections::HashMap;

use anyhow::Result;
use cadence_core::error::CoreError;
use cadence_core::generator::resolve_time;
use cadence_core::models::{Task, TaskTemplate};
use cadence_core::recurrence::preview;
use cadence_core::repository::{Repository, TaskFilter};
use cadence_core::rule::RuleInput;
use chrono::Utc;
use dialoguer::Confirm;
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::cli::{DeleteRuleCommand, RuleCommand, RuleIdCommand, RuleSubcommand, ShowRuleCommand};
use crate::util::{resolve_rule_id, Session};
use crate::views::table::{describe_rule, display_rules, ViewRule};

pub async fn rule_command<R: Repository>(repo: &R, session: &Session, command: RuleCommand) -> Result<()> {
    match command.command {
        RuleSubcommand::List => list_rules(repo, session).await,
        RuleSubcommand::Show(cmd) => show_rule(repo, session, cmd).await,
        RuleSubcommand::Pause(cmd) => set_active(repo, session, cmd, false).await,
        RuleSubcommand::Resume(cmd) => set_active(repo, session, cmd, true).await,
        RuleSubcommand::Delete(cmd) => delete_rule(repo, session, cmd).await,
    }
}

/// Repeating definitions of the user, keyed by their rule.
async fn definitions_by_rule<R: Repository>(repo: &R, session: &Session) -> Result<HashMap<Uuid, Task>> {
    let definitions = repo
        .find_tasks(session.user_id, &[TaskFilter::Repeating(true)])
        .await?;
    Ok(definitions
        .into_iter()
        .filter_map(|task| task.rule_id.map(|rule_id| (rule_id, task)))
        .collect())
}

async fn list_rules<R: Repository>(repo: &R, session: &Session) -> Result<()> {
    let rules = repo.find_rules(session.user_id).await?;
    let definitions = definitions_by_rule(repo, session).await?;

    let views: Vec<ViewRule> = rules
        .into_iter()
        .map(|stored| ViewRule {
            id: stored.id,
            task_title: definitions.get(&stored.id).map(|t| t.title.clone()),
            rule: stored.rule,
            active: stored.active,
        })
        .collect();

    display_rules(&views);
    Ok(())
}

async fn show_rule<R: Repository>(repo: &R, session: &Session, command: ShowRuleCommand) -> Result<()> {
    let rule_id = resolve_rule_id(repo, session, &command.id).await?;
    let stored = repo
        .find_rule(session.user_id, rule_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Rule with id {} not found", rule_id)))?;
    let definitions = definitions_by_rule(repo, session).await?;
    let definition = definitions.get(&rule_id);

    let rule = &stored.rule;
    println!("{}", "Rule Information".blue().bold());
    println!("Rule ID: {}", stored.id.yellow());
    match definition {
        Some(task) => println!("Task: {} ({})", task.title.cyan(), task.id.yellow()),
        None => println!("Task: {}", "(none)".bright_black()),
    }
    println!("Repeats: {}", describe_rule(rule).green());
    println!("Timezone: {}", rule.timezone.name().magenta());
    println!("Policy: {}", rule.policy);
    println!(
        "Active: {}",
        if stored.active {
            "Yes".green().to_string()
        } else {
            "No".red().to_string()
        }
    );
    println!("Updated: {}", stored.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let payload = payload_summary(&RuleInput::from(rule));
    println!("Payload: {}", payload.bright_black());

    if command.count == 0 {
        return Ok(());
    }

    let template = definition
        .map(|task| TaskTemplate::from_task(task, Vec::new()))
        .unwrap_or_default();
    let time = resolve_time(&stored, &template);
    let now = Utc::now().with_timezone(&rule.timezone);

    println!("\n{}", "Upcoming".blue().bold());
    for (i, occurrence) in preview(rule, time, now, command.count).iter().enumerate() {
        println!("  {}. {}", i + 1, occurrence.format("%a %Y-%m-%d %H:%M %Z"));
    }
    Ok(())
}

/// Compact `key=value` rendering of the non-empty payload fields.
fn payload_summary(input: &RuleInput) -> String {
    let mut parts = vec![format!("type={}", input.kind)];
    if let Some(interval) = input.interval.filter(|i| *i != 1) {
        parts.push(format!("interval={}", interval));
    }
    if let Some(time) = &input.time {
        parts.push(format!("time={}", time));
    }
    if !input.weekdays.is_empty() {
        parts.push(format!("weekdays={}", input.weekdays.join(",")));
    }
    if let Some(day) = input.day_of_month {
        parts.push(format!("day_of_month={}", day));
    }
    if let (Some(nth), Some(weekday)) = (input.nth, &input.weekday) {
        parts.push(format!("nth={} weekday={}", nth, weekday));
    }
    if input.end_of_month {
        parts.push("end_of_month".to_string());
    }
    if let (Some(month), Some(day)) = (input.month, input.day) {
        parts.push(format!("month={} day={}", month, day));
    }
    if let Some(n) = input.n {
        parts.push(format!("n={}", n));
    }
    parts.join(" ")
}

async fn set_active<R: Repository>(repo: &R, session: &Session, command: RuleIdCommand, active: bool) -> Result<()> {
    let rule_id = resolve_rule_id(repo, session, &command.id).await?;
    let stored = repo.set_rule_active(session.user_id, rule_id, active).await?;
    if stored.active {
        println!("Resumed rule {}", stored.id.yellow());
    } else {
        println!("Paused rule {}", stored.id.yellow());
    }
    Ok(())
}

async fn delete_rule<R: Repository>(repo: &R, session: &Session, command: DeleteRuleCommand) -> Result<()> {
    let rule_id = resolve_rule_id(repo, session, &command.id).await?;

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt(format!(
                "Delete rule {}? Generated tasks are kept.",
                rule_id
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    repo.delete_rule(session.user_id, rule_id).await?;
    println!("Deleted rule {}", rule_id);
    Ok(())
}
