use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::AuditError;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Tolerant reader for the timestamp shapes found in history exports.
///
/// Strings with an offset (or `Z`) are exact instants; naive strings are wall
/// clock time in the processor's timezone. Numbers are Unix epoch seconds.
pub struct TimestampProcessor {
    tz: Tz,
}

impl Default for TimestampProcessor {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

/// Naive date-time layouts, tried in order.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

/// Date-only layouts, read as local midnight.
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

impl TimestampProcessor {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse a raw `HISTORYDATETIME` cell; `None` when unusable.
    pub fn parse(&self, value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => self.parse_str(s),
            Value::Number(n) => match n.as_i64() {
                Some(secs) => DateTime::from_timestamp(secs, 0),
                None => n.as_f64().and_then(epoch_from_float),
            },
            _ => None,
        }
    }

    /// Like [`parse_str`](Self::parse_str) but reports the rejected input.
    pub fn parse_required(&self, raw: &str) -> crate::error::Result<DateTime<Utc>> {
        self.parse_str(raw)
            .ok_or_else(|| AuditError::TimestampParse(raw.trim().to_string()))
    }

    pub fn parse_str(&self, raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        let exact = DateTime::parse_from_rfc3339(s).or_else(|_| DateTime::parse_from_rfc2822(s));
        if let Ok(dt) = exact {
            return Some(dt.with_timezone(&Utc));
        }

        if let Some(naive) = NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        {
            return self.localize(naive);
        }
        if let Some(date) = NAIVE_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        {
            return self.localize(date.and_hms_opt(0, 0, 0)?);
        }

        debug!("unparsable timestamp \"{}\"", s);
        None
    }

    /// Attach the processor's timezone to a naive wall-clock value.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// non-existent ones (spring-forward gap) yield `None`.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }
}

fn epoch_from_float(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let nanos = (secs.fract() * 1e9).round() as u32;
    DateTime::from_timestamp(secs.trunc() as i64, nanos.min(999_999_999))
}

// ── Lenient field decoding ────────────────────────────────────────────────────

/// Deserialize a JSON string, number or boolean into `Option<String>`.
///
/// Exported logs are inconsistent about quoting identifiers, so `100` and
/// `"100"` must decode to the same declaration id. `null` and empty strings
/// become `None`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// Render a scalar JSON value as a string, `None` for null / empty / composite.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
