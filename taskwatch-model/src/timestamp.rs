//! Timestamp parsing for backend payloads.
//!
//! The backend serializes naive local datetimes (`2024-05-01T12:30:00.123456`)
//! in both stream envelopes and task bodies. Those are read as UTC; RFC 3339
//! values with an explicit offset are converted.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{ModelError, Result};

const NAIVE_FORMATS: &[&str] =
    &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ModelError::InvalidTimestamp(raw.to_string()))
}

/// `deserialize_with` helper for optional timestamp fields.
pub fn deserialize_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let parsed =
            parse_timestamp("2024-05-01T12:30:00.250000").expect("naive");
        let expected = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
            .single()
            .expect("valid date")
            + chrono::Duration::milliseconds(250);
        assert_eq!(parsed, expected);

        let no_fraction =
            parse_timestamp("2024-05-01 12:30:00").expect("space separated");
        assert_eq!(no_fraction.timestamp(), expected.timestamp());
    }

    #[test]
    fn offsets_are_normalised() {
        let parsed =
            parse_timestamp("2024-05-01T14:30:00+02:00").expect("rfc3339");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
                .single()
                .expect("valid date")
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(ModelError::InvalidTimestamp("yesterday".into()))
        );
    }
}
