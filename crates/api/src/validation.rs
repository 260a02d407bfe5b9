//! Shared `validator::Validate` field-level checks used across request DTOs.

use std::collections::HashSet;

use validator::ValidationError;

const VALID_WEEKDAYS: &[&str] =
    &["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];

/// Rejects strings that are empty once leading/trailing whitespace is
/// stripped — `validator`'s own `length(min = 1)` would accept `"   "`.
pub fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("non_blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Every entry must be a lowercase English weekday name.
pub fn weekdays(days: &HashSet<String>) -> Result<(), ValidationError> {
    for day in days {
        if !VALID_WEEKDAYS.contains(&day.as_str()) {
            let mut err = ValidationError::new("weekday");
            err.message = Some(format!("not a weekday: {day}").into());
            return Err(err);
        }
    }
    Ok(())
}
