use lazy_static::lazy_static;
use regex::Regex;
use time::{format_description::FormatItem, macros::format_description, Date, Duration, OffsetDateTime};

use crate::error::ApiError;

const DATE_KEY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parses a `YYYY-MM-DD` day key. Signed or widened years are rejected, so
/// every accepted key is already in canonical form.
pub fn parse_date_key(key: &str) -> Result<Date, ApiError> {
    lazy_static! {
        static ref KEY_RE: Regex = Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap();
    }
    if !KEY_RE.is_match(key) {
        return Err(ApiError::Validation(format!("invalid date: {key}")));
    }
    Date::parse(key, DATE_KEY).map_err(|_| ApiError::Validation(format!("invalid date: {key}")))
}

/// The store key for a user-supplied date.
pub fn date_key(key: &str) -> Result<String, ApiError> {
    parse_date_key(key).map(format_date_key)
}

pub fn format_date_key(date: Date) -> String {
    // Formatting a calendar date with a fixed description cannot fail for years 0..=9999.
    date.format(DATE_KEY).unwrap_or_else(|_| date.to_string())
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// `date` moved back by `days`, or a validation error past the calendar's start.
pub fn days_before(date: Date, days: i64) -> Result<Date, ApiError> {
    date.checked_sub(Duration::days(days))
        .ok_or_else(|| ApiError::Validation(format!("date out of range: {}", format_date_key(date))))
}

/// Whole calendar days between two dates, ignoring order.
pub fn span_days(start: Date, end: Date) -> i64 {
    (end - start).whole_days().abs()
}

/// An inclusive window of day keys that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    /// Validates a proposed window: both keys must be dates and their span
    /// must not exceed `max_days`. A reversed pair is allowed and selects nothing.
    pub fn validate(start: &str, end: &str, max_days: i64) -> Result<Self, ApiError> {
        let start_date = parse_date_key(start)?;
        let end_date = parse_date_key(end)?;
        if span_days(start_date, end_date) > max_days {
            return Err(ApiError::Validation(format!("Maximum {max_days} days allowed")));
        }
        Ok(Self {
            start: format_date_key(start_date),
            end: format_date_key(end_date),
        })
    }

    /// The week ending on `today`.
    pub fn last_week(today: Date) -> Result<Self, ApiError> {
        Ok(Self {
            start: format_date_key(days_before(today, 6)?),
            end: format_date_key(today),
        })
    }
}
