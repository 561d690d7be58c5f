//! Day-boundary policy for the daily quota window.
//!
//! "Today" is the UTC calendar day. The reset is computed lazily on
//! access by comparing the stored window start against the current day
//! boundary — there is no background job, so arbitrary downtime is
//! tolerated.

use chrono::{DateTime, NaiveTime, Utc};

/// Start of the UTC calendar day containing `t`.
pub fn day_start(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// True when a counting window that started at `daily_reset_at` is
/// stale for the day containing `now`.
pub fn window_is_stale(daily_reset_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    daily_reset_at < day_start(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn day_start_truncates_to_midnight() {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(day_start(t), Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(day_start(day_start(t)), day_start(t));
    }

    #[test]
    fn same_day_window_is_fresh() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap();
        assert!(!window_is_stale(day_start(now), now));
        assert!(!window_is_stale(now - Duration::hours(1), now));
    }

    #[test]
    fn prior_day_window_is_stale() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 1).unwrap();
        // One second before midnight, the previous day.
        assert!(window_is_stale(now - Duration::seconds(2), now));
        assert!(window_is_stale(now - Duration::days(40), now));
    }
}
