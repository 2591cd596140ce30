use chrono::{DateTime, Days};
use chrono_tz::Tz;

use crate::models::GeneratePolicy;
use crate::timezone::start_of_day;

/// Whether an instance for `next_due` should exist at `now`.
///
/// Day boundaries are taken in `next_due`'s timezone, so calendar-day
/// granularity follows the rule's zone rather than the server's.
pub fn should_generate_now(next_due: DateTime<Tz>, policy: GeneratePolicy, now: DateTime<Tz>) -> bool {
    let tz = next_due.timezone();
    let due_date = next_due.date_naive();

    let opens_on = match policy {
        GeneratePolicy::Immediate => return true,
        GeneratePolicy::SameDay => due_date,
        GeneratePolicy::Before { advance_days } => {
            match due_date.checked_sub_days(Days::new(u64::from(advance_days))) {
                Some(date) => date,
                None => return true,
            }
        }
    };

    now >= start_of_day(&tz, opens_on)
}
