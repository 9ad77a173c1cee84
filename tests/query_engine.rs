//! Query engine end-to-end scenarios: id assignment, schema rejection,
//! index-accelerated equality, and range filters.

use std::collections::HashMap;

use cachedb::{
    CancelToken, Database, Document, ErrorKind, FieldDef, FieldType, FilterOp, Query, QueryFilter,
    Schema,
};
use serde_json::{json, Value};
use uuid::Uuid;

// =============================================================================
// Test Utilities
// =============================================================================

fn doc(value: Value) -> Document {
    match value {
        Value::Object(m) => Document::new(m),
        other => panic!("expected object, got {:?}", other),
    }
}

fn filter(field: &str, operator: FilterOp, value: Value) -> QueryFilter {
    QueryFilter {
        field: field.to_string(),
        operator,
        value,
    }
}

fn query(filters: Vec<QueryFilter>) -> Query {
    Query {
        filters,
        ..Query::default()
    }
}

// =============================================================================
// Insert assigns id
// =============================================================================

#[test]
fn insert_without_id_assigns_uuid_v4() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    let id = users.insert(doc(json!({"name": "Ada"})), &token).unwrap();

    let parsed = Uuid::parse_str(&id).expect("assigned id must be a UUID");
    assert_eq!(parsed.get_version_num(), 4);

    let all = users.find(&Query::all()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert_eq!(all[0].data["name"], json!("Ada"));
}

// =============================================================================
// Schema rejection
// =============================================================================

#[test]
fn schema_rejection_leaves_collection_empty() {
    let mut fields = HashMap::new();
    fields.insert("email".to_string(), FieldDef::required(FieldType::String));

    let db = Database::new("app");
    let users = db
        .create_collection("users", Some(Schema::new(fields)))
        .unwrap();

    let err = users
        .insert(doc(json!({"name": "Ada"})), &CancelToken::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert!(err.to_string().contains("email"));
    assert!(users.find(&Query::all()).unwrap().is_empty());
}

// =============================================================================
// Index-accelerated equality
// =============================================================================

#[test]
fn index_accelerated_eq_returns_exact_document() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    users
        .insert(doc(json!({"_id": "u1", "email": "a@x"})), &token)
        .unwrap();
    users
        .insert(doc(json!({"_id": "u2", "email": "b@x"})), &token)
        .unwrap();
    users.create_index("by_email", "email", &token).unwrap();

    let hits = users
        .find(&query(vec![filter("email", FilterOp::Eq, json!("b@x"))]))
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "u2");
}

#[test]
fn index_miss_short_circuits_to_empty() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    users
        .insert(doc(json!({"_id": "u1", "email": "a@x"})), &token)
        .unwrap();
    users.create_index("by_email", "email", &token).unwrap();

    let hits = users
        .find(&query(vec![filter("email", FilterOp::Eq, json!("zz@x"))]))
        .unwrap();
    assert!(hits.is_empty());
}

// =============================================================================
// Range filters
// =============================================================================

#[test]
fn gte_filter_selects_numeric_range() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    for age in [20, 30, 40] {
        users
            .insert(doc(json!({"age": age})), &token)
            .unwrap();
    }

    let hits = users
        .find(&query(vec![filter("age", FilterOp::Gte, json!(30))]))
        .unwrap();

    assert_eq!(hits.len(), 2);
    let mut ages: Vec<i64> = hits
        .iter()
        .map(|d| d.data["age"].as_i64().unwrap())
        .collect();
    ages.sort();
    assert_eq!(ages, vec![30, 40]);
}

#[test]
fn numeric_comparison_is_not_lexicographic() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    // Lexicographically "9" > "10"; numerically 9 < 10.
    users.insert(doc(json!({"age": 9})), &token).unwrap();
    users.insert(doc(json!({"age": 10})), &token).unwrap();

    let hits = users
        .find(&query(vec![filter("age", FilterOp::Lt, json!(10))]))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].data["age"], json!(9));
}

// =============================================================================
// Pagination and update atomicity
// =============================================================================

#[test]
fn skip_beyond_results_returns_empty() {
    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    let token = CancelToken::new();

    users.insert(doc(json!({"n": 1})), &token).unwrap();
    users.insert(doc(json!({"n": 2})), &token).unwrap();

    let page = users
        .find(&Query {
            skip: 5,
            ..Query::default()
        })
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn failed_update_is_invisible_to_readers() {
    let mut fields = HashMap::new();
    fields.insert("email".to_string(), FieldDef::required(FieldType::String));

    let db = Database::new("app");
    let users = db
        .create_collection("users", Some(Schema::new(fields)))
        .unwrap();
    let token = CancelToken::new();

    users
        .insert(doc(json!({"_id": "u1", "email": "a@x"})), &token)
        .unwrap();

    let updates = match json!({"email": 42}) {
        Value::Object(m) => m,
        _ => unreachable!(),
    };
    let err = users.update("u1", &updates, &token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);

    let unchanged = users.find_by_id("u1").unwrap();
    assert_eq!(unchanged.data["email"], json!("a@x"));
}
