//! Day arithmetic in a single, stable time zone (UTC by contract).
//!
//! No operation here touches local-timezone calendar APIs; every date in
//! the core is a [`chrono::NaiveDate`] interpreted as a UTC civil date.

use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashSet;

/// Today's civil date, in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `d` advanced by `n` civil days (negative `n` moves backward).
pub fn add_days(d: NaiveDate, n: i64) -> NaiveDate {
    d + chrono::Duration::days(n)
}

/// Canonical `YYYY-MM-DD` rendering.
pub fn format(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Normalized lowercase English day-of-week name, e.g. `monday`.
pub fn day_of_week(d: NaiveDate) -> &'static str {
    match d.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

/// The ordered list of dates, starting at `start` and spanning `horizon_days`
/// civil days, that are neither a declared off-day-of-week nor an explicit
/// blackout date.
pub fn enumerate_eligible_dates(
    start: NaiveDate,
    horizon_days: i64,
    off_days: &HashSet<String>,
    blackout_dates: &HashSet<NaiveDate>,
) -> Vec<NaiveDate> {
    (0..horizon_days.max(0))
        .map(|n| add_days(start, n))
        .filter(|d| !off_days.contains(day_of_week(*d)) && !blackout_dates.contains(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_days_advances_forward_and_backward() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(add_days(d, 1), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(
            add_days(d, -31),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn format_is_canonical() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(format(d), "2026-03-05");
    }

    #[test]
    fn day_of_week_matches_known_date() {
        // 2026-08-03 is a Monday.
        let d = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(day_of_week(d), "monday");
    }

    #[test]
    fn eligible_dates_exclude_off_days_and_blackouts() {
        let start = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(); // monday
        let mut off_days = HashSet::new();
        off_days.insert("sunday".to_string());
        let mut blackout = HashSet::new();
        blackout.insert(NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()); // wednesday

        let dates = enumerate_eligible_dates(start, 7, &off_days, &blackout);

        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2026, 8, 9).unwrap())); // sunday
        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2026, 8, 5).unwrap())); // blackout
        assert_eq!(dates.len(), 5);
    }

    #[test]
    fn eligible_dates_with_zero_horizon_is_empty() {
        let start = today();
        assert!(enumerate_eligible_dates(start, 0, &HashSet::new(), &HashSet::new()).is_empty());
    }
}
