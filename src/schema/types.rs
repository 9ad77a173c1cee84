//! Schema type definitions.
//!
//! Supported field types:
//! - string: UTF-8 string
//! - number: any numeric JSON value
//! - boolean
//! - object: nested JSON object
//! - array: JSON array
//! - date: string parsable as an RFC3339 timestamp

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Supported field types. Unknown type names fail at deserialization,
/// so a parsed schema is always drawn from this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Any numeric JSON value
    Number,
    /// Boolean
    Boolean,
    /// Nested JSON object
    Object,
    /// JSON array
    Array,
    /// RFC3339 timestamp carried as a string
    Date,
}

impl FieldType {
    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Date => "date",
        }
    }
}

/// A single field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Declared field type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field must be present
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// Creates a required field of the given type.
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
        }
    }

    /// Creates an optional field of the given type.
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
        }
    }
}

/// Complete schema definition for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Field definitions by name
    pub fields: HashMap<String, FieldDef>,
}

impl Schema {
    /// Creates a schema from field definitions.
    pub fn new(fields: HashMap<String, FieldDef>) -> Self {
        Self { fields }
    }
}
