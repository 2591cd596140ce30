//! Boundary validation for recurrence rules.
//!
//! Incoming payloads are loosely typed ([`RuleInput`]); everything downstream
//! works on the canonical [`RecurrenceRule`]. All field-name leniency lives here.

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{GeneratePolicy, MonthlyRule, RecurrencePattern, RecurrenceRule};

pub const RULE_TYPES: &[&str] = &[
    "daily",
    "weekly",
    "monthly",
    "yearly",
    "after_days",
    "after_hours",
];

pub const GENERATE_POLICIES: &[&str] = &["immediate", "before", "same"];

/// Largest accepted "every N units" value.
pub const MAX_INTERVAL: u32 = 1_000;

/// First failing constraint of a rule payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown rule type '{0}', expected one of: {allowed}", allowed = RULE_TYPES.join(", "))]
    UnknownType(String),

    #[error("time '{0}' must be 24-hour HH:MM")]
    InvalidTime(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("'{field}' is required for {rule_type} rules")]
    MissingField {
        field: &'static str,
        rule_type: &'static str,
    },

    #[error("'{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("weekly rules need at least one weekday")]
    EmptyWeekdays,

    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),

    #[error("monthly rules take exactly one of day_of_month, nth + weekday, or end_of_month")]
    ConflictingMonthlyModes,

    #[error("unknown generate policy '{0}', expected one of: {allowed}", allowed = GENERATE_POLICIES.join(", "))]
    UnknownPolicy(String),
}

/// Raw rule payload as it arrives from a task-editing form or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, alias = "days")]
    pub weekdays: Vec<String>,
    #[serde(default, alias = "month_day")]
    pub day_of_month: Option<i64>,
    #[serde(default)]
    pub nth: Option<i64>,
    #[serde(default)]
    pub weekday: Option<String>,
    #[serde(default)]
    pub end_of_month: bool,
    #[serde(default)]
    pub month: Option<i64>,
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default)]
    pub n: Option<i64>,
    #[serde(default)]
    pub generate_policy: Option<String>,
    #[serde(default)]
    pub advance_days: Option<i64>,
    #[serde(default)]
    pub default_today_flag: bool,
    #[serde(default)]
    pub default_todo_flag: bool,
}

impl RuleInput {
    /// Checks every constraint and produces the canonical rule.
    ///
    /// Out-of-range integers are rejected, never clamped; clamping of
    /// valid-but-short-month days happens in the calculator.
    pub fn validate(&self) -> Result<RecurrenceRule, ValidationError> {
        let kind = self.kind.trim().to_lowercase().replace('-', "_");
        let kind = match RULE_TYPES.iter().find(|t| **t == kind) {
            Some(t) => *t,
            None => return Err(ValidationError::UnknownType(self.kind.clone())),
        };

        let interval = match self.interval {
            Some(v) => in_range("interval", v, 1, i64::from(MAX_INTERVAL))?,
            None => 1,
        };

        let time = self.time.as_deref().map(parse_time).transpose()?;

        let timezone = match self.timezone.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name
                .parse::<Tz>()
                .map_err(|_| ValidationError::UnknownTimezone(name.to_string()))?,
            _ => Tz::UTC,
        };

        let pattern = match kind {
            "daily" => RecurrencePattern::Daily,
            "weekly" => RecurrencePattern::Weekly {
                weekdays: self.parse_weekdays()?,
            },
            "monthly" => RecurrencePattern::Monthly {
                on: self.parse_monthly()?,
            },
            "yearly" => {
                let month = require(self.month, "month", "yearly")?;
                let day = require(self.day, "day", "yearly")?;
                RecurrencePattern::Yearly {
                    month: in_range("month", month, 1, 12)?,
                    day: in_range("day", day, 1, 31)?,
                }
            }
            "after_days" => RecurrencePattern::AfterDays {
                n: in_range("n", require(self.n, "n", "after_days")?, 1, 36_500)?,
            },
            _ => RecurrencePattern::AfterHours {
                n: in_range("n", require(self.n, "n", "after_hours")?, 1, 876_000)?,
            },
        };

        let policy = self.parse_policy()?;

        Ok(RecurrenceRule {
            pattern,
            interval,
            time,
            timezone,
            policy,
            default_today_flag: self.default_today_flag,
            default_todo_flag: self.default_todo_flag,
        })
    }

    fn parse_weekdays(&self) -> Result<Vec<Weekday>, ValidationError> {
        if self.weekdays.is_empty() {
            return Err(ValidationError::EmptyWeekdays);
        }
        let mut days = Vec::with_capacity(self.weekdays.len());
        for raw in &self.weekdays {
            let day = parse_weekday(raw)?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        days.sort_by_key(|d: &Weekday| d.num_days_from_monday());
        Ok(days)
    }

    fn parse_monthly(&self) -> Result<MonthlyRule, ValidationError> {
        let by_nth = self.nth.is_some() || self.weekday.is_some();
        let modes = [self.day_of_month.is_some(), by_nth, self.end_of_month];
        match modes.iter().filter(|m| **m).count() {
            0 => Err(ValidationError::MissingField {
                field: "day_of_month",
                rule_type: "monthly",
            }),
            1 => {
                if let Some(day) = self.day_of_month {
                    Ok(MonthlyRule::DayOfMonth {
                        day: in_range("day_of_month", day, 1, 31)?,
                    })
                } else if by_nth {
                    let nth = require(self.nth, "nth", "monthly")?;
                    let weekday = self.weekday.as_deref().ok_or(ValidationError::MissingField {
                        field: "weekday",
                        rule_type: "monthly",
                    })?;
                    Ok(MonthlyRule::NthWeekday {
                        nth: in_range("nth", nth, 1, 5)?,
                        weekday: parse_weekday(weekday)?,
                    })
                } else {
                    Ok(MonthlyRule::EndOfMonth)
                }
            }
            _ => Err(ValidationError::ConflictingMonthlyModes),
        }
    }

    fn parse_policy(&self) -> Result<GeneratePolicy, ValidationError> {
        let raw = self.generate_policy.as_deref().map(|p| p.trim().to_lowercase());
        let advance_days = match self.advance_days {
            Some(v) => in_range("advance_days", v, 0, 3_650)?,
            None => 0,
        };
        match raw.as_deref() {
            None | Some("") | Some("immediate") => Ok(GeneratePolicy::Immediate),
            Some("same") | Some("same_day") => Ok(GeneratePolicy::SameDay),
            Some("before") => Ok(GeneratePolicy::Before { advance_days }),
            Some(_) => Err(ValidationError::UnknownPolicy(
                self.generate_policy.clone().unwrap_or_default(),
            )),
        }
    }
}

impl From<&RecurrenceRule> for RuleInput {
    /// Renders a canonical rule back into payload form, e.g. for editing.
    fn from(rule: &RecurrenceRule) -> Self {
        let mut input = RuleInput {
            kind: rule.pattern.type_name().to_string(),
            interval: Some(i64::from(rule.interval)),
            time: rule.time.map(|t| t.format("%H:%M").to_string()),
            timezone: Some(rule.timezone.name().to_string()),
            generate_policy: Some(rule.policy.as_str().to_string()),
            advance_days: Some(i64::from(rule.policy.advance_days())),
            default_today_flag: rule.default_today_flag,
            default_todo_flag: rule.default_todo_flag,
            ..Default::default()
        };
        match &rule.pattern {
            RecurrencePattern::Daily => {}
            RecurrencePattern::Weekly { weekdays } => {
                input.weekdays = weekdays.iter().map(|d| weekday_tag(*d).to_string()).collect();
            }
            RecurrencePattern::Monthly { on } => match on {
                MonthlyRule::DayOfMonth { day } => input.day_of_month = Some(i64::from(*day)),
                MonthlyRule::NthWeekday { nth, weekday } => {
                    input.nth = Some(i64::from(*nth));
                    input.weekday = Some(weekday_tag(*weekday).to_string());
                }
                MonthlyRule::EndOfMonth => input.end_of_month = true,
            },
            RecurrencePattern::Yearly { month, day } => {
                input.month = Some(i64::from(*month));
                input.day = Some(i64::from(*day));
            }
            RecurrencePattern::AfterDays { n } | RecurrencePattern::AfterHours { n } => {
                input.n = Some(i64::from(*n));
            }
        }
        input
    }
}

/// Lowercase three-letter tag used in payloads and display.
pub fn weekday_tag(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_weekday(raw: &str) -> Result<Weekday, ValidationError> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| ValidationError::UnknownWeekday(raw.to_string()))
}

fn parse_time(raw: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = raw.trim();
    let well_formed = trimmed
        .split_once(':')
        .map(|(h, m)| {
            (1..=2).contains(&h.len())
                && m.len() == 2
                && h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit())
        })
        .unwrap_or(false);
    if !well_formed {
        return Err(ValidationError::InvalidTime(raw.to_string()));
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .map_err(|_| ValidationError::InvalidTime(raw.to_string()))
}

fn require(
    value: Option<i64>,
    field: &'static str,
    rule_type: &'static str,
) -> Result<i64, ValidationError> {
    value.ok_or(ValidationError::MissingField { field, rule_type })
}

fn in_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<u32, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value,
        min,
        max,
    })
}
