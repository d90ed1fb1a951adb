use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

static MISSING: FieldValue = FieldValue::Missing;

/// A single field value of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Convert a raw JSON value.
    ///
    /// `null` and blank strings become [`FieldValue::Missing`]; booleans are
    /// kept as text. Arrays and objects are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(FieldValue::Missing),
            Value::String(s) if s.trim().is_empty() => Some(FieldValue::Missing),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Textual form of the value. Integral numbers render without a
    /// fractional part so `3.0` and `"3"` compare equal.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(Cow::Owned(format!("{}", *n as i64)))
            }
            FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
            FieldValue::Missing => None,
        }
    }

    /// Numeric form of the value, parsing text when possible.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Missing => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            FieldValue::Missing
        } else {
            FieldValue::Text(s.to_string())
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        if s.trim().is_empty() {
            FieldValue::Missing
        } else {
            FieldValue::Text(s)
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// Caller-chosen record key, unique within its collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        RecordKey(s)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        RecordKey(s.to_string())
    }
}

/// Which collection a record came from. Deduplication only uses `Left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Left,
    Right,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Left => write!(f, "left"),
            Source::Right => write!(f, "right"),
        }
    }
}

/// Globally unique record identity across both collections
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub source: Source,
    pub key: RecordKey,
}

impl RecordId {
    #[inline]
    #[must_use]
    pub fn new(source: Source, key: impl Into<RecordKey>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn left(key: impl Into<RecordKey>) -> Self {
        Self::new(Source::Left, key)
    }

    #[inline]
    #[must_use]
    pub fn right(key: impl Into<RecordKey>) -> Self {
        Self::new(Source::Right, key)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.key)
    }
}

/// An immutable record: a key plus named field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<RecordKey>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Value of a field; absent fields read as missing.
    #[inline]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&MISSING)
    }

    /// Build a record from a JSON object of field name to raw value.
    pub fn from_json(key: impl Into<RecordKey>, value: &Value) -> Result<Self> {
        let key = key.into();
        let object = value.as_object().ok_or_else(|| {
            Error::configuration(format!("record '{}' is not a JSON object", key))
        })?;

        let mut fields = BTreeMap::new();
        for (name, raw) in object {
            let parsed = FieldValue::from_json(raw).ok_or_else(|| {
                Error::configuration(format!(
                    "record '{}': field '{}' must be a string, number, boolean or null",
                    key, name
                ))
            })?;
            fields.insert(name.clone(), parsed);
        }

        Ok(Self { key, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_and_null_are_missing() {
        assert!(FieldValue::from_json(&json!(null)).unwrap().is_missing());
        assert!(FieldValue::from_json(&json!("   ")).unwrap().is_missing());
        assert!(FieldValue::from("").is_missing());
    }

    #[test]
    fn test_number_text_form() {
        assert_eq!(FieldValue::Number(3.0).as_text().unwrap(), "3");
        assert_eq!(FieldValue::Number(2.5).as_text().unwrap(), "2.5");
        assert_eq!(FieldValue::Text("12.5".into()).as_number(), Some(12.5));
        assert_eq!(FieldValue::Text("abc".into()).as_number(), None);
    }

    #[test]
    fn test_record_from_json() {
        let record = Record::from_json("a1", &json!({"title": "foo", "price": 9.5, "desc": null})).unwrap();
        assert_eq!(record.get("title"), &FieldValue::Text("foo".into()));
        assert_eq!(record.get("price"), &FieldValue::Number(9.5));
        assert!(record.get("desc").is_missing());
        assert!(record.get("absent").is_missing());
    }

    #[test]
    fn test_record_rejects_nested_values() {
        assert!(Record::from_json("a1", &json!({"tags": ["x"]})).is_err());
        assert!(Record::from_json("a1", &json!("not an object")).is_err());
    }

    #[test]
    fn test_record_id_ordering() {
        let mut ids = vec![RecordId::right("a"), RecordId::left("b"), RecordId::left("a")];
        ids.sort();
        assert_eq!(ids, vec![RecordId::left("a"), RecordId::left("b"), RecordId::right("a")]);
        assert_eq!(RecordId::left("a").to_string(), "left:a");
    }
}
