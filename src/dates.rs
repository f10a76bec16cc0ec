//! Calendar helpers for the fixed reporting timezone.
//!
//! Counter rows are keyed by the *local* date in one fixed offset (JST by
//! default) so that a run shortly after midnight UTC still lands on the
//! business day the operators see.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};

pub const DEFAULT_OFFSET_HOURS: i32 = 9;

/// Offset east of UTC; out-of-range hours fall back to the default.
pub fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600)
        .or_else(|| FixedOffset::east_opt(DEFAULT_OFFSET_HOURS * 3600))
        .unwrap_or_else(|| Utc.fix())
}

pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

pub fn today(offset: FixedOffset) -> NaiveDate {
    local_date(Utc::now(), offset)
}

pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// `YYYY-MM-DD HH:MM:SS` in the given offset, for human-facing notices.
pub fn display_local(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
