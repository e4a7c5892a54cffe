use std::time::Duration;

/// Trimmed value, or `None` when unset or blank.
pub fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse a human duration (`10s`, `1m 30s`, `250ms`). A bare number is read
/// as milliseconds to match the `*_ms` file fields.
pub fn parse_duration(
    raw: &str,
) -> Result<Duration, humantime::DurationError> {
    let trimmed = raw.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed)
}

/// Milliseconds of `duration`, saturating at `u64::MAX`.
pub fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
