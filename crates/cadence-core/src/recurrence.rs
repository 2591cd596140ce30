//! Next-occurrence calculation.
//!
//! Every function here is pure: given a validated rule and a reference "now"
//! it returns the next due instant in the rule's timezone. All calendar
//! arithmetic happens on local dates of that zone, never on UTC dates.

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;

use crate::models::{MonthlyRule, RecurrencePattern, RecurrenceRule};
use crate::timezone::localize;

/// Upper bound on interval-week cycles inspected by the weekly scan.
const WEEKLY_SCAN_CYCLES: u64 = 8;

/// Time of day used when neither the rule nor its template names one.
pub fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Next occurrence strictly after `now`, using the rule's own time of day
/// (or [`default_time`] when it has none).
pub fn next_occurrence(rule: &RecurrenceRule, now: DateTime<Tz>) -> DateTime<Tz> {
    next_occurrence_at(rule, rule.time.unwrap_or_else(default_time), now)
}

/// Next occurrence strictly after `now` at the given local time of day.
///
/// `after_hours` rules ignore `time` and return `now + n hours`.
/// A slot exactly equal to `now` counts as passed.
pub fn next_occurrence_at(rule: &RecurrenceRule, time: NaiveTime, now: DateTime<Tz>) -> DateTime<Tz> {
    let tz = rule.timezone;
    let now = now.with_timezone(&tz);
    let today = now.date_naive();
    let interval = rule.interval.max(1);

    let computed = match &rule.pattern {
        RecurrencePattern::Daily => next_daily(&tz, today, time, interval, &now),
        RecurrencePattern::Weekly { weekdays } => {
            next_weekly(&tz, weekdays, today, time, interval, &now)
        }
        RecurrencePattern::Monthly { on } => next_monthly(&tz, on, today, time, interval, &now),
        RecurrencePattern::Yearly { month, day } => {
            next_yearly(&tz, *month, *day, today, time, interval, &now)
        }
        RecurrencePattern::AfterDays { n } => today
            .checked_add_days(Days::new(u64::from(*n)))
            .map(|date| localize(&tz, date, time)),
        RecurrencePattern::AfterHours { n } => {
            now.checked_add_signed(Duration::hours(i64::from(*n)))
        }
    };

    computed.unwrap_or_else(|| fallback(&tz, today, time, &now))
}

/// The next `count` occurrences, each computed from the previous one.
pub fn preview(
    rule: &RecurrenceRule,
    time: NaiveTime,
    from: DateTime<Tz>,
    count: usize,
) -> Vec<DateTime<Tz>> {
    let mut occurrences = Vec::with_capacity(count);
    let mut cursor = from;
    for _ in 0..count {
        let next = next_occurrence_at(rule, time, cursor);
        if next <= cursor {
            break;
        }
        occurrences.push(next);
        cursor = next;
    }
    occurrences
}

fn next_daily(
    tz: &Tz,
    today: NaiveDate,
    time: NaiveTime,
    interval: u32,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let slot = localize(tz, today, time);
    if slot > *now {
        return Some(slot);
    }
    let next = today.checked_add_days(Days::new(u64::from(interval)))?;
    Some(localize(tz, next, time))
}

/// Scans interval-week cycles starting at the Monday of `now`'s week.
fn next_weekly(
    tz: &Tz,
    weekdays: &[Weekday],
    today: NaiveDate,
    time: NaiveTime,
    interval: u32,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let monday =
        today.checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_monday())))?;
    let cycle_days = 7 * u64::from(interval);

    for cycle in 0..WEEKLY_SCAN_CYCLES {
        let week_start = monday.checked_add_days(Days::new(cycle_days * cycle))?;
        for day in weekdays {
            let date = week_start.checked_add_days(Days::new(u64::from(day.num_days_from_monday())))?;
            let slot = localize(tz, date, time);
            if slot > *now {
                return Some(slot);
            }
        }
    }

    let first = weekdays.first()?;
    let week_start = monday.checked_add_days(Days::new(cycle_days * WEEKLY_SCAN_CYCLES))?;
    let date = week_start.checked_add_days(Days::new(u64::from(first.num_days_from_monday())))?;
    Some(localize(tz, date, time))
}

fn next_monthly(
    tz: &Tz,
    on: &MonthlyRule,
    today: NaiveDate,
    time: NaiveTime,
    interval: u32,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let (year, month) = (today.year(), today.month());
    let slot = localize(tz, monthly_date(on, year, month)?, time);
    if slot > *now {
        return Some(slot);
    }
    let (year, month) = add_months(year, month, interval)?;
    Some(localize(tz, monthly_date(on, year, month)?, time))
}

fn next_yearly(
    tz: &Tz,
    month: u32,
    day: u32,
    today: NaiveDate,
    time: NaiveTime,
    interval: u32,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let year = today.year();
    let slot = localize(tz, clamped_date(year, month, day)?, time);
    if slot > *now {
        return Some(slot);
    }
    let year = year.checked_add(i32::try_from(interval).ok()?)?;
    Some(localize(tz, clamped_date(year, month, day)?, time))
}

/// Today at `time`, or tomorrow if that has already passed.
fn fallback(tz: &Tz, today: NaiveDate, time: NaiveTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let slot = localize(tz, today, time);
    if slot > *now {
        return slot;
    }
    today
        .succ_opt()
        .map(|tomorrow| localize(tz, tomorrow, time))
        .unwrap_or(slot)
}

/// Day selected by a monthly rule, always inside the given month.
pub fn monthly_date(on: &MonthlyRule, year: i32, month: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    let day = match on {
        MonthlyRule::DayOfMonth { day } => (*day).clamp(1, last),
        MonthlyRule::NthWeekday { nth, weekday } => nth_weekday_day(year, month, *nth, *weekday, last)?,
        MonthlyRule::EndOfMonth => last,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn nth_weekday_day(year: i32, month: u32, nth: u32, weekday: Weekday, last: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    let mut day = 1 + offset + (nth.max(1) - 1) * 7;
    while day > last {
        day -= 7;
    }
    Some(day)
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    next.pred_opt().map(|last| last.day())
}

fn add_months(year: i32, month: u32, delta: u32) -> Option<(i32, u32)> {
    let index = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(delta);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    Some((year, month))
}
