use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::repository::Repository;
use cadence_core::timezone::localize;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// Who the CLI acts for and which timezone it reads dates in.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub user_id: Uuid,
    pub timezone: Tz,
}

fn check_short_id(short_id: &str) -> Result<()> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(())
}

pub async fn resolve_task_id(repo: &impl Repository, session: &Session, short_id: &str) -> Result<Uuid> {
    check_short_id(short_id)?;
    let tasks = repo.find_tasks_by_short_id_prefix(session.user_id, short_id).await?;
    match tasks.len() {
        1 => Ok(tasks[0].id),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No task found with ID prefix '{}'",
            short_id
        )))),
        _ => {
            let task_info: Vec<(String, String)> = tasks
                .into_iter()
                .map(|t| (t.id.to_string(), t.title))
                .collect();
            Err(anyhow!(CoreError::AmbiguousId(task_info)))
        }
    }
}

pub async fn resolve_rule_id(repo: &impl Repository, session: &Session, short_id: &str) -> Result<Uuid> {
    check_short_id(short_id)?;
    let rules = repo.find_rules_by_short_id_prefix(session.user_id, short_id).await?;
    match rules.len() {
        1 => Ok(rules[0].id),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No rule found with ID prefix '{}'",
            short_id
        )))),
        _ => {
            let rule_info: Vec<(String, String)> = rules
                .into_iter()
                .map(|r| (r.id.to_string(), r.rule.pattern.type_name().to_string()))
                .collect();
            Err(anyhow!(CoreError::AmbiguousId(rule_info)))
        }
    }
}

/// Parses "YYYY-MM-DD" (midnight) or "YYYY-MM-DD HH:MM" as local time in `tz`.
pub fn parse_local_datetime(input: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(localize(tz, naive.date(), naive.time()).with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(localize(tz, date, NaiveTime::MIN).with_timezone(&Utc));
    }
    Err(anyhow!(CoreError::InvalidInput(format!(
        "Could not parse date '{}'. Use YYYY-MM-DD or YYYY-MM-DD HH:MM",
        input
    ))))
}

/// Like [`parse_local_datetime`], but also accepts RFC 3339 instants.
pub fn parse_instant(input: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(input.trim()) {
        Ok(instant) => Ok(instant.with_timezone(&Utc)),
        Err(_) => parse_local_datetime(input, tz),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Tokyo;
    use rstest::rstest;

    #[rstest]
    #[case("2025-03-10 09:00", Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap())]
    #[case("2025-03-10", Utc.with_ymd_and_hms(2025, 3, 9, 15, 0, 0).unwrap())]
    #[case("2025-03-10T09:00:00+09:00", Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap())]
    #[case("2025-03-10T00:00:00Z", Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap())]
    fn test_parse_instant(#[case] input: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_instant(input, &Tokyo).unwrap(), expected);
    }

    #[rstest]
    #[case("tomorrow")]
    #[case("2025-13-01")]
    #[case("10/03/2025")]
    fn test_parse_local_datetime_rejects(#[case] input: &str) {
        assert!(parse_local_datetime(input, &Tokyo).is_err());
    }
}
