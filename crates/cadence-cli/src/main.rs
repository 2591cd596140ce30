use cadence_core::db;
use cadence_core::error::CoreError;
use cadence_core::repository::SqliteRepository;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;
use util::Session;

mod cli;
mod commands;
mod config;
mod util;
mod views;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} ignoring unreadable configuration: {}", "Warning:".yellow().bold(), e);
            config::Config::default()
        }
    };
    init_tracing(&config.log_level);

    let timezone = match config.timezone() {
        Ok(tz) => tz,
        Err(e) => {
            handle_error(e.into());
            std::process::exit(1);
        }
    };
    let session = Session {
        user_id: config.user_id,
        timezone,
    };

    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            handle_error(e.into());
            std::process::exit(1);
        }
    };
    let repository = SqliteRepository::new(db_pool);

    let result = match cli.command {
        cli::Commands::Task(command) => {
            commands::task::task_command(&repository, &session, command).await
        }
        cli::Commands::Rule(command) => {
            commands::rule::rule_command(&repository, &session, command).await
        }
        cli::Commands::Day(command) => {
            commands::day::day_command(&repository, &session, command).await
        }
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    match err.downcast_ref::<CoreError>() {
        Some(CoreError::NotFound(s)) => {
            eprintln!("{} {}", "Error:".style(error_style), s);
        }
        Some(CoreError::AmbiguousId(candidates)) => {
            eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
            eprintln!("Did you mean one of these?");
            for (id, label) in candidates {
                eprintln!("  {} ({})", id.yellow(), label);
            }
        }
        Some(CoreError::InvalidInput(s)) => {
            eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::Validation(e)) => {
            eprintln!("{} Invalid rule: {}", "Error:".style(error_style), e.yellow());
        }
        Some(CoreError::Database(e)) => {
            tracing::debug!("database error: {:?}", e);
            eprintln!("{} Database error: {}", "Error:".style(error_style), e);
        }
        _ => eprintln!("{} {}", "Error:".style(error_style), err),
    }
}
