use thiserror::Error;

use crate::rule::ValidationError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid rule: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The storage layer already holds an instance for this rule and occurrence date.
    #[error("Instance already exists for rule {rule_id} on {date}")]
    DuplicateInstance { rule_id: uuid::Uuid, date: chrono::NaiveDate },

    #[error("Ambiguous short ID. Did you mean one of these?")]
    AmbiguousId(Vec<(String, String)>), // Vec of (ID, Title)

    #[error("Stored rule {0} is malformed: {1}")]
    CorruptRule(uuid::Uuid, String),
}
