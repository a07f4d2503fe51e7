//! Restriction durations in `1d2h3m4s` notation

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use crate::error::{Error, Result};

/// Input meaning "never expires"
pub const NEVER: &str = "-1";

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap()
});

/// Parse a duration; `None` means the restriction never expires
pub fn parse_duration(raw: &str) -> Result<Option<Duration>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NEVER {
        return Ok(None);
    }

    let invalid = || {
        Error::invalid(format!(
            "Invalid duration \"{}\". Please follow the format: 1d2h3m4s",
            raw
        ))
    };

    let lowered = raw.to_lowercase();
    let caps = DURATION_REGEX.captures(&lowered).ok_or_else(invalid)?;
    let mut total = Duration::zero();
    for (index, unit) in [(1, 86_400i64), (2, 3_600), (3, 60), (4, 1)] {
        if let Some(m) = caps.get(index) {
            let n: i64 = m.as_str().parse().map_err(|_| invalid())?;
            let span = n
                .checked_mul(unit)
                .and_then(Duration::try_seconds)
                .ok_or_else(invalid)?;
            total = total.checked_add(&span).ok_or_else(invalid)?;
        }
    }

    if total <= Duration::zero() {
        return Err(invalid());
    }
    Ok(Some(total))
}

/// Render a span as `dd:hh:mm:ss`
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().abs();
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}
