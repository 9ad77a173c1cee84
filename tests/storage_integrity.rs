//! Storage integrity: CRC verification on every read, header rejection,
//! and damage isolation between records.

use cachedb::storage::{
    BinaryCollectionReader, BinaryCollectionWriter, HEADER_SIZE, RECORD_HEADER_SIZE,
};
use cachedb::{CancelToken, Database, DbError, Document, ErrorKind, StorageManager};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn doc(value: Value) -> Document {
    match value {
        Value::Object(m) => Document::new(m),
        other => panic!("expected object, got {:?}", other),
    }
}

fn data_path(root: &std::path::Path) -> std::path::PathBuf {
    root.join("app").join("users").join("collection.data")
}

fn write_two_users(root: &std::path::Path) {
    let mut writer = BinaryCollectionWriter::create(root, "app", "users").unwrap();
    writer
        .write_document(&doc(json!({"_id": "u1", "name": "Ada"})))
        .unwrap();
    writer
        .write_document(&doc(json!({"_id": "u2", "name": "Grace"})))
        .unwrap();
    writer.flush().unwrap();
}

// =============================================================================
// CRC tamper detection
// =============================================================================

#[test]
fn flipped_payload_byte_fails_that_document_only() {
    let tmp = TempDir::new().unwrap();
    write_two_users(tmp.path());

    // Flip one byte inside the first record's payload.
    let path = data_path(tmp.path());
    let mut bytes = fs::read(&path).unwrap();
    bytes[HEADER_SIZE + RECORD_HEADER_SIZE + 3] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let mut reader = BinaryCollectionReader::open(tmp.path(), "app", "users").unwrap();

    let err = reader.read_document("u1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    match err {
        DbError::ChecksumMismatch {
            document_id,
            computed,
            stored,
        } => {
            assert_eq!(document_id, "u1");
            assert_ne!(computed, stored);
        }
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }

    // The sibling record is untouched and still readable.
    let grace = reader.read_document("u2").unwrap();
    assert_eq!(grace.data["name"], json!("Grace"));
}

#[test]
fn tampered_collection_surfaces_integrity_error_on_load() {
    let tmp = TempDir::new().unwrap();
    let token = CancelToken::new();
    let storage = StorageManager::open(tmp.path()).unwrap();

    let db = Database::new("app");
    let users = db.create_collection("users", None).unwrap();
    users
        .insert(doc(json!({"_id": "u1", "name": "Ada"})), &token)
        .unwrap();
    storage.save_database(&db, &token).unwrap();

    let path = data_path(tmp.path());
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = storage
        .load_collection("app", "users", &token)
        .unwrap_err();
    assert!(err.is_integrity());
}

// =============================================================================
// Header validation
// =============================================================================

#[test]
fn wrong_magic_rejects_whole_file() {
    let tmp = TempDir::new().unwrap();
    write_two_users(tmp.path());

    let path = data_path(tmp.path());
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = 0x00;
    fs::write(&path, &bytes).unwrap();

    let err = BinaryCollectionReader::open(tmp.path(), "app", "users").unwrap_err();
    assert!(matches!(err, DbError::BadMagic { .. }));
}

#[test]
fn wrong_version_rejects_whole_file() {
    let tmp = TempDir::new().unwrap();
    write_two_users(tmp.path());

    let path = data_path(tmp.path());
    let mut bytes = fs::read(&path).unwrap();
    // Version field lives at bytes 4..6.
    bytes[4] = 9;
    fs::write(&path, &bytes).unwrap();

    let err = BinaryCollectionReader::open(tmp.path(), "app", "users").unwrap_err();
    assert!(matches!(
        err,
        DbError::BadVersion {
            expected: 1,
            found: 9
        }
    ));
}

// =============================================================================
// Record well-formedness
// =============================================================================

#[test]
fn decompressed_size_matches_recorded_size() {
    let tmp = TempDir::new().unwrap();

    let original = doc(json!({"_id": "u1", "name": "Ada", "tags": ["a", "b", "c"]}));
    {
        let mut writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();
        writer.write_document(&original).unwrap();
        writer.flush().unwrap();
    }

    let mut reader = BinaryCollectionReader::open(tmp.path(), "app", "users").unwrap();
    let restored = reader.read_document("u1").unwrap();
    assert_eq!(restored, original);
}

#[test]
fn truncated_data_file_fails_read() {
    let tmp = TempDir::new().unwrap();
    write_two_users(tmp.path());

    let path = data_path(tmp.path());
    let bytes = fs::read(&path).unwrap();
    // Cut into the last record's payload.
    fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    let mut reader = BinaryCollectionReader::open(tmp.path(), "app", "users").unwrap();
    let ids = reader.document_ids();
    let failures = ids
        .iter()
        .filter(|id| reader.read_document(id.as_str()).is_err())
        .count();
    assert_eq!(failures, 1);
}
