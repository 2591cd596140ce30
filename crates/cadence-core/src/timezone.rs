use crate::error::CoreError;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Parse an IANA timezone name
pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// Step used to walk out of a gap longer than an hour.
const GAP_STEP_MINUTES: i64 = 15;

/// Longest gap walked before giving up; covers skipped calendar days.
const MAX_GAP_HOURS: i64 = 48;

/// Resolve a local wall-clock time on `date` in `tz`.
///
/// Ambiguous times (clocks falling back) resolve to the earliest instant.
/// Times inside a spring-forward gap move forward one hour. When that still
/// lands in the gap (e.g. a skipped calendar day), the first valid local
/// time after it is used.
pub fn localize(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let target = date.and_time(time);
    if let Some(local) = tz.from_local_datetime(&target).earliest() {
        return local;
    }

    let mut shifted = target + Duration::hours(1);
    let limit = target + Duration::hours(MAX_GAP_HOURS);
    while shifted <= limit {
        if let Some(local) = tz.from_local_datetime(&shifted).earliest() {
            return local;
        }
        shifted += Duration::minutes(GAP_STEP_MINUTES);
    }

    // No zone has a gap this long; read the wall-clock time as UTC after the window
    tz.from_utc_datetime(&limit)
}

/// First instant of `date` in `tz`.
pub fn start_of_day(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date, NaiveTime::MIN)
}

/// Half-open UTC bounds `[start, end)` of the local calendar day `date` in `tz`.
pub fn day_bounds_utc(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(tz, date).with_timezone(&Utc);
    let end = match date.succ_opt() {
        Some(next) => start_of_day(tz, next).with_timezone(&Utc),
        None => start + Duration::days(1),
    };
    (start, end)
}

/// Calendar date of a UTC instant as seen in `tz`.
pub fn local_date(tz: &Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// Format datetime with timezone-aware display
pub fn format_with_timezone(datetime: DateTime<Utc>, tz: &Tz, format: &str) -> String {
    datetime.with_timezone(tz).format(format).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("UTC").is_ok());
        assert!(parse_timezone("America/New_York").is_ok());
        assert!(matches!(
            parse_timezone("Invalid/Timezone"),
            Err(CoreError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_localize_keeps_wall_clock() {
        let tokyo = chrono_tz::Asia::Tokyo;
        let dt = localize(&tokyo, date(2025, 3, 10), time(9, 0));
        assert_eq!(dt.hour(), 9);
        assert_eq!(dt.with_timezone(&Utc).hour(), 0);
    }

    #[test]
    fn test_localize_spring_forward_gap_moves_forward() {
        // 2025-03-09 02:30 does not exist in New York
        let ny = chrono_tz::America::New_York;
        let dt = localize(&ny, date(2025, 3, 9), time(2, 30));
        assert_eq!(dt.hour(), 3);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_localize_fall_back_takes_earliest() {
        // 2025-11-02 01:30 happens twice in New York; the first is EDT (UTC-4)
        let ny = chrono_tz::America::New_York;
        let dt = localize(&ny, date(2025, 11, 2), time(1, 30));
        assert_eq!(dt.with_timezone(&Utc).hour(), 5);
    }

    #[test]
    fn test_localize_skipped_day_moves_past_gap() {
        // Samoa skipped 2011-12-30 entirely when it crossed the date line
        let apia = chrono_tz::Pacific::Apia;
        let before = apia.with_ymd_and_hms(2011, 12, 29, 23, 30, 0).unwrap();
        let dt = localize(&apia, date(2011, 12, 30), time(9, 0));
        assert!(dt > before);
        assert_eq!(dt.date_naive(), date(2011, 12, 31));
        assert_eq!(dt.time(), NaiveTime::MIN);
    }

    #[test]
    fn test_day_bounds_across_dst() {
        let ny = chrono_tz::America::New_York;
        let (start, end) = day_bounds_utc(&ny, date(2025, 3, 9));
        assert_eq!(end - start, Duration::hours(23));

        let (start, end) = day_bounds_utc(&ny, date(2025, 6, 1));
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn test_local_date() {
        let tokyo = chrono_tz::Asia::Tokyo;
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap();
        assert_eq!(local_date(&tokyo, at), date(2025, 3, 11));
    }
}
