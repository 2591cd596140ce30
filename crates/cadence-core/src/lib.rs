//! # Cadence Core Library
//!
//! Recurring-task generation and scheduling: users attach recurrence rules to
//! tasks, and each generation pass materializes the next due occurrence of
//! every active rule as an ordinary task, exactly once per occurrence date.
//!
//! ## Features
//!
//! - **Rule Validation**: Untyped rule payloads are checked into a closed
//!   [`models::RecurrencePattern`] before anything is stored
//! - **Timezone Awareness**: All calendar arithmetic happens in the rule's IANA
//!   zone, with explicit handling of DST gaps and overlaps
//! - **Generation Policies**: Create instances immediately, on the due day, or
//!   a fixed number of days ahead
//! - **Idempotent Materialization**: Repeated passes never duplicate an
//!   instance; a unique index backs the existence check
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures and transfer objects
//! - [`rule`]: Rule payload parsing and validation
//! - [`recurrence`]: Next-occurrence calculation
//! - [`policy`]: Generation-window decisions
//! - [`generator`]: Generation passes and the "start my day" trigger
//! - [`service`]: Rule create/update entry points
//! - [`repository`]: Data access layer with Repository pattern
//! - [`timezone`]: Timezone utilities
//! - [`clock`]: Injectable time source
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     clock::SystemClock, db, generator::InstanceGenerator, models::NewTaskData,
//!     repository::{SqliteRepository, TaskRepository}, rule::RuleInput, service::RuleService,
//! };
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::establish_connection("tasks.db").await?;
//!     let repo = SqliteRepository::new(pool);
//!     let user_id = Uuid::nil();
//!
//!     let task = repo
//!         .add_task(NewTaskData {
//!             user_id,
//!             title: "Daily standup".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let payload: RuleInput = serde_json::from_str(
//!         r#"{"type": "weekly", "weekdays": ["mon", "wed", "fri"], "time": "09:30",
//!             "timezone": "America/New_York", "generate_policy": "same"}"#,
//!     )?;
//!     RuleService::new(&repo).upsert_for_task(user_id, task.id, &payload).await?;
//!
//!     let clock = SystemClock;
//!     let summary = InstanceGenerator::new(&repo, &clock).generate(user_id).await?;
//!     println!("Created {} instance(s)", summary.created.len());
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod db;
pub mod error;
pub mod generator;
pub mod models;
pub mod policy;
pub mod recurrence;
pub mod repository;
pub mod rule;
pub mod service;
pub mod timezone;
