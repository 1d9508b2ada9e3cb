//! Raw result records returned by the providers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder rendered for a missing or empty field
pub const NOT_AVAILABLE: &str = "N/A";

/// One result item as returned upstream: a map of field name to JSON value.
///
/// Nothing about the shape is assumed. Accessors return typed values or
/// `None`/empty, and [`RawRecord::text_or_na`] substitutes [`NOT_AVAILABLE`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; anything other than an object yields `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Collect every object of a JSON array into records, skipping the rest
    pub fn from_array(value: Option<&Value>) -> Vec<Self> {
        value
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw access to a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the record has a field with this name
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Field rendered as text. Strings are returned as-is, numbers and
    /// booleans are stringified, and null, empty or structured values yield `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        value_text(self.0.get(key)?)
    }

    /// Field rendered as text, or [`NOT_AVAILABLE`]
    pub fn text_or_na(&self, key: &str) -> String {
        self.text(key).unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    /// Array field; missing or non-array fields yield an empty slice
    pub fn list(&self, key: &str) -> &[Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Scalar members of an array field rendered as text
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.list(key).iter().filter_map(value_text).collect()
    }

    /// Nested object field as a record
    pub fn object(&self, key: &str) -> Option<RawRecord> {
        self.0.get(key).cloned().and_then(Self::from_value)
    }

    /// Copy every field of `other` into this record, overwriting duplicates
    pub fn merge(&mut self, other: RawRecord) {
        self.0.extend(other.0);
    }

    /// Copy the fields of `other` that this record does not have yet
    pub fn merge_missing(&mut self, other: RawRecord) {
        for (key, value) in other.0 {
            self.0.entry(key).or_insert(value);
        }
    }

    /// Iterate over fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Render a scalar JSON value as text; empty strings count as missing.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Join the non-empty items with ", ", or [`NOT_AVAILABLE`] when nothing is left
pub fn join_or_na<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_render_placeholder() {
        let record = RawRecord::from_value(json!({"title": "Widget", "abstract": ""})).unwrap();
        assert_eq!(record.text_or_na("title"), "Widget");
        assert_eq!(record.text_or_na("abstract"), NOT_AVAILABLE);
        assert_eq!(record.text_or_na("inventors"), NOT_AVAILABLE);
        assert!(record.list("inventors").is_empty());
    }

    #[test]
    fn test_numbers_render_as_text() {
        let record = RawRecord::new().with("year", 2021).with("open", true);
        assert_eq!(record.text("year").as_deref(), Some("2021"));
        assert_eq!(record.text("open").as_deref(), Some("true"));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
        assert!(RawRecord::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_from_array_skips_non_objects() {
        let value = json!([{"id": 1}, "noise", {"id": 2}]);
        let records = RawRecord::from_array(Some(&value));
        assert_eq!(records.len(), 2);
        assert!(RawRecord::from_array(None).is_empty());
    }

    #[test]
    fn test_merge_and_merge_missing() {
        let mut record = RawRecord::new().with("title", "old").with("id", "1");
        record.merge(RawRecord::new().with("title", "new").with("claims", "c"));
        assert_eq!(record.text_or_na("title"), "new");
        assert_eq!(record.text_or_na("claims"), "c");

        record.merge_missing(RawRecord::new().with("title", "ignored").with("legal", ""));
        assert_eq!(record.text_or_na("title"), "new");
        assert!(record.contains("legal"));
    }

    #[test]
    fn test_join_or_na() {
        assert_eq!(join_or_na(["a", " ", "b"]), "a, b");
        assert_eq!(join_or_na(Vec::<String>::new()), NOT_AVAILABLE);
    }
}
