//! `H:MM:SS` interval text used to persist call-out durations.
//!
//! Sub-second precision is dropped on write.

use crate::{CoreError, CoreResult};
use std::time::Duration;

pub fn format_interval(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

pub fn parse_interval(text: &str) -> CoreResult<Duration> {
    let invalid = || CoreError::InvalidInput(format!("invalid interval format: {text:?}"));

    let mut parts = text.trim().split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: u64 = s.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}
