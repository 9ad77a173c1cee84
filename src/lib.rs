//! cachedb - an embeddable document database
//!
//! A hierarchy of named databases, each holding named collections of
//! schema-validated JSON documents, with secondary hash indexes, a
//! compressed binary on-disk collection format, and a write-ahead log
//! for crash recovery.
//!
//! The usual write sequence is: log the operation to the WAL, apply it
//! to the in-memory collection, and eventually persist the collection
//! and checkpoint the WAL. On startup,
//! [`StorageManager::load_all_databases`](storage::StorageManager::load_all_databases)
//! reloads persisted state and replays any operations the last
//! checkpoint did not cover.

pub mod cancel;
pub mod codec;
pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod index;
pub mod manager;
pub mod query;
pub mod schema;
pub mod storage;
pub mod wal;

pub use cancel::CancelToken;
pub use collection::Collection;
pub use database::Database;
pub use document::Document;
pub use error::{DbError, DbResult, ErrorKind};
pub use index::Index;
pub use manager::DatabaseManager;
pub use query::{FilterOp, Query, QueryFilter};
pub use schema::{FieldDef, FieldType, Schema};
pub use storage::{StorageFormat, StorageManager};
