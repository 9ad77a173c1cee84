//! Document model.
//!
//! A document is an opaque JSON object identified by a unique `_id` string
//! within its collection. In memory the id lives outside the data map; on
//! the wire `_id` is promoted to a top-level field alongside the data
//! entries, and extracted back out on deserialization.

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single document: an id plus an arbitrary JSON object.
///
/// The `data` map never contains the reserved key `_id`; constructors strip
/// it. The id never changes after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique id within the owning collection. Empty until insert assigns one.
    pub id: String,
    /// Document fields.
    pub data: Map<String, Value>,
}

impl Document {
    /// Creates a document from a raw JSON object map.
    ///
    /// A string-valued `_id` entry is promoted to the document id; any other
    /// `_id` value is dropped. Insert assigns a UUID when the id is empty.
    pub fn new(mut data: Map<String, Value>) -> Self {
        let id = match data.remove("_id") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        Self { id, data }
    }

    /// Creates a document with an explicit id.
    pub fn with_id(id: impl Into<String>, mut data: Map<String, Value>) -> Self {
        data.remove("_id");
        Self {
            id: id.into(),
            data,
        }
    }

    /// Looks up a field value. The reserved name `_id` resolves to the id,
    /// so the automatic `_id` index and queries on `_id` see it like any
    /// other field.
    pub fn get_value(&self, field: &str) -> Option<Value> {
        if field == "_id" {
            return Some(Value::String(self.id.clone()));
        }
        self.data.get(field).cloned()
    }

    /// Serializes to the on-disk JSON form with `_id` promoted.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parses the on-disk JSON form back into a document.
    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.data.len() + 1))?;
        map.serialize_entry("_id", &self.id)?;
        for (key, value) in &self.data {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut data = Map::<String, Value>::deserialize(deserializer)?;
        let id = match data.remove("_id") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "_id must be a string, got {}",
                    type_name(&other)
                )))
            }
            None => String::new(),
        };
        Ok(Self { id, data })
    }
}

/// Canonical string form of a JSON value, used as the hash-index key and
/// for `eq`/`ne`/`in` comparisons. Scalars print literally; integral floats
/// collapse to their integer form so `30` and `30.0` index identically.
/// Composites use a stable bracketed form (object keys are already sorted
/// by the underlying map).
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i.to_string();
            }
            if let Some(u) = n.as_u64() {
                return u.to_string();
            }
            let f = n.as_f64().unwrap_or(f64::NAN);
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                format!("{}", f as i64)
            } else {
                f.to_string()
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}:{}", k, canonical_string(v)))
                .collect();
            format!("{{{}}}", parts.join(" "))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn new_promotes_id_out_of_data() {
        let doc = Document::new(map(json!({"_id": "u1", "name": "Ada"})));
        assert_eq!(doc.id, "u1");
        assert!(!doc.data.contains_key("_id"));
        assert_eq!(doc.data["name"], json!("Ada"));
    }

    #[test]
    fn new_without_id_leaves_it_empty() {
        let doc = Document::new(map(json!({"name": "Ada"})));
        assert!(doc.id.is_empty());
    }

    #[test]
    fn with_id_strips_stray_id_key() {
        let doc = Document::with_id("u2", map(json!({"_id": "other", "n": 1})));
        assert_eq!(doc.id, "u2");
        assert!(!doc.data.contains_key("_id"));
    }

    #[test]
    fn serialization_roundtrip() {
        let doc = Document::with_id("u1", map(json!({"name": "Ada", "age": 36})));
        let bytes = doc.to_json_bytes().unwrap();
        let restored = Document::from_json_bytes(&bytes).unwrap();
        assert_eq!(doc, restored);
    }

    #[test]
    fn serialized_form_has_top_level_id() {
        let doc = Document::with_id("u1", map(json!({"name": "Ada"})));
        let value: Value = serde_json::from_slice(&doc.to_json_bytes().unwrap()).unwrap();
        assert_eq!(value["_id"], json!("u1"));
        assert_eq!(value["name"], json!("Ada"));
    }

    #[test]
    fn non_string_id_rejected_on_deserialize() {
        let result = Document::from_json_bytes(br#"{"_id": 42, "name": "Ada"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn get_value_resolves_reserved_id() {
        let doc = Document::with_id("u1", map(json!({"name": "Ada"})));
        assert_eq!(doc.get_value("_id"), Some(json!("u1")));
        assert_eq!(doc.get_value("name"), Some(json!("Ada")));
        assert_eq!(doc.get_value("missing"), None);
    }

    #[test]
    fn canonical_scalars() {
        assert_eq!(canonical_string(&json!(null)), "null");
        assert_eq!(canonical_string(&json!(true)), "true");
        assert_eq!(canonical_string(&json!("a@x")), "a@x");
        assert_eq!(canonical_string(&json!(42)), "42");
        assert_eq!(canonical_string(&json!(-7)), "-7");
    }

    #[test]
    fn canonical_collapses_integral_floats() {
        assert_eq!(canonical_string(&json!(30.0)), "30");
        assert_eq!(canonical_string(&json!(30)), "30");
        assert_eq!(canonical_string(&json!(1.5)), "1.5");
    }

    #[test]
    fn canonical_composites_are_stable() {
        let a = json!({"b": 2, "a": [1, 2]});
        let b = json!({"a": [1, 2], "b": 2});
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(canonical_string(&json!([1, "x"])), "[1 x]");
    }
}
