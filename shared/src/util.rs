//! Time helpers
//!
//! Timestamps are local wall-clock times stored as `%Y-%m-%dT%H:%M:%S` TEXT.

use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time truncated to whole seconds
pub fn now_local() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp; also accepts a space separator
pub fn parse_ts(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Parse a curfew in `HH:MM` or `HH:MM:SS`
pub fn parse_curfew(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text.trim(), "%H:%M:%S"))
        .ok()
}

pub fn format_curfew(curfew: &NaiveTime) -> String {
    curfew.format("%H:%M").to_string()
}
