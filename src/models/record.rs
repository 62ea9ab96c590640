use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::timestamp;

/// A single record in any collection.
///
/// Only the identity and the two timestamps carry meaning for sync; every
/// other field is kept as opaque JSON and travels through merges untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(
        default,
        with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with a fresh UUID and both timestamps set to now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            fields: Map::new(),
        }
    }

    /// Creates a record with the given id and no timestamps.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            updated_at: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn with_updated_at(mut self, ts: DateTime<Utc>) -> Self {
        self.updated_at = Some(ts);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Marks the record as modified at `now`, stamping `createdAt` too when
    /// the record never had one.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_has_uuid_and_timestamps() {
        let record = Record::new();
        assert!(Uuid::parse_str(&record.id).is_ok());
        assert!(record.created_at.is_some());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_deserialize_keeps_unknown_fields() {
        let record: Record = serde_json::from_value(json!({
            "id": "t1",
            "title": "Water plants",
            "done": false,
            "updatedAt": "2024-05-01T08:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(record.id, "t1");
        assert_eq!(record.created_at, None);
        assert_eq!(
            record.updated_at,
            timestamp::parse_str("2024-05-01T08:00:00Z")
        );
        assert_eq!(record.field("title"), Some(&json!("Water plants")));
        assert_eq!(record.field("done"), Some(&json!(false)));
        assert!(record.field("updatedAt").is_none());
    }

    #[test]
    fn test_deserialize_epoch_millis_and_null() {
        let record: Record = serde_json::from_value(json!({
            "id": "abc",
            "createdAt": null,
            "updatedAt": 200
        }))
        .unwrap();

        assert_eq!(record.created_at, None);
        assert_eq!(record.updated_at, timestamp::from_millis(200));
    }

    #[test]
    fn test_deserialize_rejects_garbage_timestamp() {
        let result: Result<Record, _> = serde_json::from_value(json!({
            "id": "abc",
            "updatedAt": "not a date"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_uses_iso_strings() {
        let record = Record::with_id("n1")
            .with_field("body", "hello")
            .with_updated_at(timestamp::from_millis(0).unwrap());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "n1",
                "updatedAt": "1970-01-01T00:00:00.000Z",
                "body": "hello"
            })
        );
    }

    #[test]
    fn test_touch_preserves_created_at() {
        let created = timestamp::from_millis(10).unwrap();
        let now = timestamp::from_millis(20).unwrap();

        let mut record = Record::with_id("x").with_created_at(created);
        record.touch(now);
        assert_eq!(record.created_at, Some(created));
        assert_eq!(record.updated_at, Some(now));

        let mut legacy = Record::with_id("y");
        legacy.touch(now);
        assert_eq!(legacy.created_at, Some(now));
    }
}
