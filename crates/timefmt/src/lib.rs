//! Compact human readable durations ("1h1m", "2y6mo") used by run lists and
//! task cards, plus the timestamp parsing shared by the record decoders.
//!
//! Granularity drops as the duration grows: short spans keep two units, long
//! spans keep only the dominant one until years, which carry months again.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const MONTH_DAYS: u64 = 30;
const YEAR_DAYS: u64 = 365;

/// Backend timestamps look like `2024-11-17 10:04:05.123Z`.
const BACKEND_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeFormatError {
    #[error("invalid timestamp {input:?}")]
    InvalidTimestamp { input: String },
}

/// Render a non-negative number of seconds with progressive granularity.
pub fn seconds_to_human(seconds: u64) -> String {
    if seconds == 0 {
        return "0".to_string();
    }
    if seconds < MINUTE {
        return format!("{seconds}s");
    }

    let minutes = seconds / MINUTE;
    let rem_seconds = seconds % MINUTE;
    if minutes < 5 {
        return with_remainder(minutes, "m", rem_seconds, "s");
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }

    let hours = seconds / HOUR;
    let rem_minutes = minutes % 60;
    if hours < 4 {
        return with_remainder(hours, "h", rem_minutes, "m");
    }
    if hours < 24 {
        return format!("{hours}h");
    }

    let days = seconds / DAY;
    let rem_hours = hours % 24;
    if days < 4 {
        return with_remainder(days, "d", rem_hours, "h");
    }
    if days < 2 * MONTH_DAYS {
        return format!("{days}d");
    }
    if days < YEAR_DAYS {
        return format!("{}mo", days / MONTH_DAYS);
    }

    let years = days / YEAR_DAYS;
    let rem_months = (days % YEAR_DAYS) / MONTH_DAYS;
    with_remainder(years, "y", rem_months, "mo")
}

fn with_remainder(major: u64, major_unit: &str, minor: u64, minor_unit: &str) -> String {
    if minor == 0 {
        format!("{major}{major_unit}")
    } else {
        format!("{major}{major_unit}{minor}{minor_unit}")
    }
}

/// Elapsed time between `timestamp` and now. Future timestamps render as "0".
pub fn time_ago(timestamp: DateTime<Utc>) -> String {
    time_ago_at(timestamp, Utc::now())
}

/// [`time_ago`] against an explicit clock.
pub fn time_ago_at(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    seconds_to_human(rounded_seconds(timestamp, now))
}

/// Duration of a span, e.g. a run's `created..updated`. Inverted spans clamp to "0".
pub fn time_diff(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    seconds_to_human(rounded_seconds(start, end))
}

fn rounded_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let millis = (to - from).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    // half-up on whole milliseconds
    ((millis as u64) + 500) / 1000
}

/// Accepts RFC 3339 as well as the backend's space separated form.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimeFormatError> {
    let trimmed = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(naive, BACKEND_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|_| TimeFormatError::InvalidTimestamp {
            input: input.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn zero_and_seconds() {
        assert_eq!(seconds_to_human(0), "0");
        assert_eq!(seconds_to_human(1), "1s");
        assert_eq!(seconds_to_human(59), "59s");
    }

    #[test]
    fn minutes_keep_seconds_below_five_minutes() {
        assert_eq!(seconds_to_human(60), "1m");
        assert_eq!(seconds_to_human(90), "1m30s");
        assert_eq!(seconds_to_human(120), "2m");
        assert_eq!(seconds_to_human(146), "2m26s");
        assert_eq!(seconds_to_human(299), "4m59s");
        assert_eq!(seconds_to_human(300), "5m");
        assert_eq!(seconds_to_human(599), "9m");
        assert_eq!(seconds_to_human(3599), "59m");
    }

    #[test]
    fn hours_keep_minutes_below_four_hours() {
        assert_eq!(seconds_to_human(3600), "1h");
        assert_eq!(seconds_to_human(3660), "1h1m");
        assert_eq!(seconds_to_human(3661), "1h1m");
        assert_eq!(seconds_to_human(7200), "2h");
        assert_eq!(seconds_to_human(7260), "2h1m");
        assert_eq!(seconds_to_human(14399), "3h59m");
        assert_eq!(seconds_to_human(14400), "4h");
        assert_eq!(seconds_to_human(3600 * 11 + 70), "11h");
        assert_eq!(seconds_to_human(86399), "23h");
    }

    #[test]
    fn days_keep_hours_below_four_days() {
        assert_eq!(seconds_to_human(86400), "1d");
        assert_eq!(seconds_to_human(90000), "1d1h");
        assert_eq!(seconds_to_human(86400 * 3), "3d");
        assert_eq!(seconds_to_human(345599), "3d23h");
        assert_eq!(seconds_to_human(345600), "4d");
        assert_eq!(seconds_to_human(5183999), "59d");
    }

    #[test]
    fn months_and_years() {
        assert_eq!(seconds_to_human(5184000), "2mo");
        assert_eq!(seconds_to_human(DAY * 364), "12mo");
        assert_eq!(seconds_to_human(31536000), "1y");
        assert_eq!(seconds_to_human(DAY * (365 + 30)), "1y1mo");
        assert_eq!(seconds_to_human(DAY * (365 * 2 + 185)), "2y6mo");
        assert_eq!(seconds_to_human(DAY * (365 + 29)), "1y");
    }

    #[test]
    fn time_ago_clamps_future_timestamps() {
        let now = Utc::now();
        assert_eq!(time_ago_at(now + Duration::seconds(30), now), "0");
        assert_eq!(time_ago(Utc::now() + Duration::hours(1)), "0");
    }

    #[test]
    fn time_ago_rounds_to_nearest_second() {
        let now = Utc::now();
        assert_eq!(time_ago_at(now - Duration::milliseconds(1499), now), "1s");
        assert_eq!(time_ago_at(now - Duration::milliseconds(1500), now), "2s");
        assert_eq!(time_ago_at(now - Duration::milliseconds(400), now), "0");
        assert_eq!(time_ago_at(now - Duration::seconds(90), now), "1m30s");
    }

    #[test]
    fn time_diff_handles_inverted_spans() {
        let start = Utc::now();
        assert_eq!(time_diff(start, start + Duration::seconds(3661)), "1h1m");
        assert_eq!(time_diff(start + Duration::seconds(10), start), "0");
    }

    #[test]
    fn parses_backend_and_rfc3339_timestamps() {
        let backend = parse_timestamp("2024-11-17 10:04:05.123Z").unwrap();
        let rfc = parse_timestamp("2024-11-17T10:04:05.123Z").unwrap();
        assert_eq!(backend, rfc);
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(TimeFormatError::InvalidTimestamp {
                input: "yesterday".into()
            })
        );
    }
}
