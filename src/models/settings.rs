use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::timestamp;

/// Key holding the settings document's own modification time. It is the
/// update signal used when merging settings from two nodes.
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// Keys that configure the local node. They are readable and writable
/// locally but never merged in from a peer and never sent to one.
pub const NODE_LOCAL_KEYS: [&str; 7] = [
    "syncServerUrl",
    "syncRole",
    "syncInterval",
    "syncEnabled",
    "llmUrl",
    "llmToken",
    "llmModel",
];

/// The singleton settings document: a flat key-value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Value>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_node_local(key: &str) -> bool {
        NODE_LOCAL_KEYS.contains(&key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether the key holds a value. A `null` marks a removed shared key.
    pub fn is_set(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(value) if !value.is_null())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Modification time of the whole document, if it carries one.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0.get(UPDATED_AT_KEY).and_then(timestamp::parse_value)
    }

    /// Sets a user-facing key and stamps the document's `updatedAt`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>, now: DateTime<Utc>) {
        self.0.insert(key.into(), value.into());
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.0
            .insert(UPDATED_AT_KEY.to_string(), Value::String(timestamp::format(&now)));
    }

    /// A copy with every node-local key removed; safe to hand to a peer.
    pub fn without_node_local(&self) -> Settings {
        Settings(
            self.0
                .iter()
                .filter(|(key, _)| !Self::is_node_local(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Settings(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_without_node_local_strips_all_local_keys() {
        let mut settings = Settings::new();
        for key in NODE_LOCAL_KEYS {
            settings.insert(key, "secret");
        }
        settings.insert("theme", "dark");

        let sanitized = settings.without_node_local();
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get("theme"), Some(&json!("dark")));
        assert_eq!(settings.len(), NODE_LOCAL_KEYS.len() + 1);
    }

    #[test]
    fn test_set_stamps_updated_at() {
        let now = timestamp::from_millis(5_000).unwrap();
        let mut settings = Settings::new();
        settings.set("pomodoroMinutes", 25, now);

        assert_eq!(settings.get("pomodoroMinutes"), Some(&json!(25)));
        assert_eq!(settings.updated_at(), Some(now));
    }

    #[test]
    fn test_updated_at_accepts_millis() {
        let settings: Settings =
            serde_json::from_value(json!({"updatedAt": 100, "theme": "light"})).unwrap();
        assert_eq!(settings.updated_at(), timestamp::from_millis(100));
    }

    #[test]
    fn test_is_node_local() {
        assert!(Settings::is_node_local("llmToken"));
        assert!(Settings::is_node_local("syncRole"));
        assert!(!Settings::is_node_local("theme"));
    }

    #[test]
    fn test_null_value_is_not_set() {
        let mut settings = Settings::new();
        settings.insert("theme", "dark");
        settings.insert("font", Value::Null);

        assert!(settings.is_set("theme"));
        assert!(!settings.is_set("font"));
        assert!(settings.contains_key("font"));
        assert!(!settings.is_set("missing"));
    }
}
