//! Schema and document validation.

use chrono::DateTime;
use serde_json::Value;

use crate::document::Document;
use crate::error::{DbError, DbResult};

use super::types::{FieldType, Schema};

/// Validates a schema definition itself.
///
/// Rejects empty field sets, empty field names, and the reserved name
/// `_id`. Unknown types cannot occur in a parsed [`Schema`]; they are
/// rejected by serde before a value of the type exists.
pub fn validate_schema(schema: &Schema) -> DbResult<()> {
    if schema.fields.is_empty() {
        return Err(DbError::InvalidSchema(
            "schema must have at least one field".to_string(),
        ));
    }

    for field_name in schema.fields.keys() {
        if field_name.is_empty() {
            return Err(DbError::EmptyName("field"));
        }
        if field_name == "_id" {
            return Err(DbError::ReservedFieldName);
        }
    }

    Ok(())
}

/// Validates a document against a schema.
///
/// Every required field must be present; every present field that the
/// schema declares must match its declared type. Fields the schema does
/// not mention are allowed.
pub fn validate_document(doc: &Document, schema: &Schema) -> DbResult<()> {
    for (field_name, field) in &schema.fields {
        let value = doc.data.get(field_name);

        match value {
            None => {
                if field.required {
                    return Err(DbError::MissingRequiredField(field_name.clone()));
                }
            }
            Some(value) => {
                if !matches_type(value, field.field_type) {
                    return Err(DbError::InvalidFieldType {
                        field: field_name.clone(),
                        expected: field.field_type.type_name(),
                    });
                }
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
        FieldType::Date => match value.as_str() {
            Some(s) => DateTime::parse_from_rfc3339(s).is_ok(),
            None => false,
        },
    }
}
