//! Scheduling and time parsing utilities
//!
//! Command-line schedule strings are parsed into the epoch-millisecond due
//! times the queue stores.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedcastError};

/// Parse a schedule string into an epoch-millisecond due time.
///
/// Supports multiple formats:
/// - Relative durations: "1h", "30m", "2d"
/// - Absolute RFC 3339 times: "2026-09-01T15:00:00Z"
/// - Natural language: "tomorrow", "next friday 10am"
///
/// # Errors
///
/// Returns `InvalidInput` if the string cannot be parsed or the resulting
/// time is in the past.
pub fn parse_schedule(input: &str) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SchedcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    let now = Utc::now();
    let due = parse_to_datetime(input, now)?;

    if due < now {
        return Err(SchedcastError::InvalidInput(format!(
            "Scheduled time {} is in the past",
            due.to_rfc3339()
        )));
    }

    Ok(due.timestamp_millis())
}

fn parse_to_datetime(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    // Absolute RFC 3339 timestamps
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Relative durations like "1h" or "30m"
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let duration = Duration::try_seconds(std_duration.as_secs() as i64)
            .ok_or_else(|| SchedcastError::InvalidInput("Duration out of range".to_string()))?;
        return Ok(now + duration);
    }

    // Natural language like "tomorrow" or "next friday 10am"
    if let Ok(dt) = chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us) {
        return Ok(dt);
    }

    Err(SchedcastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}
