#![allow(dead_code)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;
use uuid::Uuid;

/// Test harness for running CLI commands with temporary databases
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    /// Create a new test harness with a temporary database
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        Self { temp_dir, db_path }
    }

    /// Get a Command instance configured for testing
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");

        // Run inside the temp dir so no stray config.toml is picked up
        cmd.current_dir(self.temp_dir.path())
            .env("CADENCE_DATABASE_PATH", &self.db_path)
            .env("CADENCE_DEFAULT_TIMEZONE", "UTC")
            .env_remove("RUST_LOG");

        cmd
    }

    /// Helper to run a command and assert success
    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    /// Helper to run a command and assert failure
    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs a successful command and returns its stdout
    pub fn stdout_of(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        String::from_utf8(output).expect("stdout is not UTF-8")
    }

    /// Adds a task and returns its ID
    pub fn add_task(&self, args: &[&str]) -> Uuid {
        let mut full = vec!["task", "add"];
        full.extend_from_slice(args);
        let stdout = self.stdout_of(&full);
        id_after(&stdout, "Task ID:").expect("no task id in output")
    }

    /// Adds a repeating task and returns (task ID, rule ID)
    pub fn add_repeating_task(&self, args: &[&str]) -> (Uuid, Uuid) {
        let mut full = vec!["task", "add"];
        full.extend_from_slice(args);
        let stdout = self.stdout_of(&full);
        (
            id_after(&stdout, "Task ID:").expect("no task id in output"),
            id_after(&stdout, "Rule ID:").expect("no rule id in output"),
        )
    }
}

/// First UUID on the line containing `label`, ignoring color codes.
pub fn id_after(output: &str, label: &str) -> Option<Uuid> {
    output
        .lines()
        .filter(|line| line.contains(label))
        .flat_map(|line| line.split(|c: char| !(c.is_ascii_hexdigit() || c == '-')))
        .find_map(|token| Uuid::parse_str(token).ok())
}

/// Short prefix accepted by every ID argument
pub fn short(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Utility functions for test assertions
pub mod assertions {
    use predicates::prelude::*;

    /// Predicate to check if output contains task table headers
    pub fn has_task_table_headers() -> impl Predicate<str> {
        predicate::str::contains("ID")
            .and(predicate::str::contains("Title"))
            .and(predicate::str::contains("Status"))
    }

    /// Predicate to check for empty result set
    pub fn no_tasks() -> impl Predicate<str> {
        predicate::str::contains("No tasks found")
    }

    /// Predicate to check for error messages
    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }
}

pub fn contains(text: &str) -> impl Predicate<str> {
    predicate::str::contains(text.to_string())
}
