use cadence_core::error::CoreError;
use cadence_core::timezone::parse_timezone;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use uuid::Uuid;

/// CLI settings from `config.toml`, overridden by `CADENCE_*` environment variables.
#[derive(Deserialize, Debug)]
pub struct Config {
    /// SQLite file, created on first use
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Owner of every task and rule touched by this CLI
    #[serde(default)]
    pub user_id: Uuid,
    /// IANA timezone for new rules, date input and "today"
    #[serde(default = "detect_system_timezone")]
    pub default_timezone: String,
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            user_id: Uuid::nil(),
            default_timezone: detect_system_timezone(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("CADENCE_"))
    }

    pub fn timezone(&self) -> Result<Tz, CoreError> {
        parse_timezone(&self.default_timezone)
    }
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if !tz.is_empty() && parse_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if parse_timezone(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TZ", "Asia/Tokyo");
            let config = Config::new()?;
            assert_eq!(config.database_path, "cadence.db");
            assert_eq!(config.user_id, Uuid::nil());
            assert_eq!(config.default_timezone, "Asia/Tokyo");
            assert_eq!(config.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                database_path = "from-file.db"
                default_timezone = "Europe/Paris"
                "#,
            )?;
            jail.set_env("CADENCE_DATABASE_PATH", "from-env.db");

            let config = Config::new()?;
            assert_eq!(config.database_path, "from-env.db");
            assert_eq!(config.default_timezone, "Europe/Paris");
            assert!(config.timezone().is_ok());
            Ok(())
        });
    }
}
