//! Timestamp handling for records, tombstones and settings.
//!
//! Peers send timestamps either as ISO-8601 strings or as integer
//! milliseconds since the Unix epoch. Both are revived into
//! `DateTime<Utc>` on receipt so every comparison is chronological.
//! Output always uses RFC 3339 in UTC with millisecond precision, which keeps
//! lexical and chronological order identical.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Formats a timestamp in the wire representation.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts epoch milliseconds to a timestamp.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Parses an ISO-8601 string.
///
/// Accepts full RFC 3339 as well as offset-less date-times, which are taken
/// to be UTC.
pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parses a loosely-typed JSON value (string or epoch milliseconds).
pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_millis),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl RawTimestamp {
    fn revive<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
        let parsed = match &self {
            RawTimestamp::Millis(ms) => from_millis(*ms),
            RawTimestamp::Fractional(ms) => from_millis(*ms as i64),
            RawTimestamp::Text(s) => parse_str(s),
        };
        parsed.ok_or_else(|| match self {
            RawTimestamp::Text(s) => E::custom(format!("invalid timestamp '{}'", s)),
            _ => E::custom("timestamp out of range"),
        })
    }
}

/// Serde adapter for required timestamp fields.
pub mod required {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        RawTimestamp::deserialize(deserializer)?.revive()
    }
}

/// Serde adapter for nullable timestamp fields. `null` and absent both map to
/// `None`.
pub mod optional {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            Some(raw) => raw.revive().map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_is_fixed_width_utc() {
        let ts = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(format(&ts), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_parse_str_with_offset_normalizes_to_utc() {
        let ts = parse_str("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(format(&ts), "2024-03-01T10:00:00.000Z");
    }

    #[test]
    fn test_parse_str_without_offset() {
        let ts = parse_str("2024-03-01T12:00:00.5").unwrap();
        assert_eq!(format(&ts), "2024-03-01T12:00:00.500Z");
    }

    #[test]
    fn test_parse_value_accepts_millis_and_strings() {
        assert_eq!(parse_value(&json!(100)), from_millis(100));
        assert_eq!(
            parse_value(&json!("1970-01-01T00:00:00.100Z")),
            from_millis(100)
        );
        assert_eq!(parse_value(&json!(true)), None);
        assert_eq!(parse_value(&json!("yesterday")), None);
    }

    #[test]
    fn test_string_order_matches_chronological_order() {
        let earlier = format(&from_millis(999).unwrap());
        let later = format(&from_millis(1_000).unwrap());
        assert!(earlier < later);
    }
}
