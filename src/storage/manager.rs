//! Storage manager: directory layout, format selection, save/load, WAL
//! logging helpers.
//!
//! The manager owns the root directory and the WAL handle. New data is
//! written in the binary format; collections whose metadata carries no
//! format marker load through the legacy JSON path. The production write
//! sequence is: log the operation to the WAL, apply it in memory, and
//! eventually persist with `save_collection` followed by `checkpoint`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::collection::Collection;
use crate::database::Database;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::index::{load_all_indexes, Index, ID_INDEX_NAME};
use crate::manager::DatabaseManager;
use crate::schema::Schema;
use crate::wal::{self, Checkpoint, CreateIndexPayload, WalEntry, WalManager, WalOp};

use super::reader::BinaryCollectionReader;
use super::writer::BinaryCollectionWriter;

/// On-disk collection formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Legacy `documents.json`
    Json,
    /// Compressed binary records plus offset index
    Binary,
}

/// `db.meta.json` contents.
#[derive(Debug, Serialize, Deserialize)]
struct DatabaseMeta {
    name: String,
}

/// `collection.meta.json` contents. A missing `format` reads as JSON for
/// collections written before the binary format existed.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionMeta {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<Schema>,
    /// Index name -> field name
    #[serde(default)]
    indexes: HashMap<String, String>,
    #[serde(default = "legacy_format")]
    format: StorageFormat,
}

fn legacy_format() -> StorageFormat {
    StorageFormat::Json
}

/// Owns the root directory, the WAL, and the format choice.
pub struct StorageManager {
    root_dir: PathBuf,
    wal: WalManager,
    format: StorageFormat,
}

impl StorageManager {
    /// Opens a storage manager rooted at `root_dir`, creating the
    /// directory and the WAL if needed. New data defaults to the binary
    /// format.
    pub fn open(root_dir: impl Into<PathBuf>) -> DbResult<Self> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)?;
        let wal = WalManager::open(&root_dir)?;

        Ok(Self {
            root_dir,
            wal,
            format: StorageFormat::Binary,
        })
    }

    /// Root directory of the store.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The write-ahead log.
    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    /// Overrides the format used for new saves.
    pub fn set_format(&mut self, format: StorageFormat) {
        self.format = format;
    }

    /// Format used for new saves.
    pub fn format(&self) -> StorageFormat {
        self.format
    }

    /// Saves a database: its metadata, then every collection.
    pub fn save_database(&self, db: &Database, token: &CancelToken) -> DbResult<()> {
        token.check()?;
        let db_dir = self.root_dir.join(db.name());
        fs::create_dir_all(&db_dir)?;

        write_json(
            &db_dir.join("db.meta.json"),
            &DatabaseMeta {
                name: db.name().to_string(),
            },
        )?;

        for coll in db.collections_snapshot() {
            self.save_collection(db.name(), &coll, token)?;
        }

        debug!(database = db.name(), "database saved");
        Ok(())
    }

    /// Saves one collection: metadata, the format-specific payload, and
    /// per-index snapshots.
    pub fn save_collection(
        &self,
        db_name: &str,
        coll: &Collection,
        token: &CancelToken,
    ) -> DbResult<()> {
        token.check()?;
        let coll_dir = super::collection_dir(&self.root_dir, db_name, coll.name());
        fs::create_dir_all(&coll_dir)?;

        let (documents, indexes) = coll.snapshot();

        let meta = CollectionMeta {
            name: coll.name().to_string(),
            schema: coll.schema().cloned(),
            indexes: indexes
                .iter()
                .map(|idx| (idx.name.clone(), idx.field_name.clone()))
                .collect(),
            format: self.format,
        };
        write_json(&coll_dir.join("collection.meta.json"), &meta)?;

        match self.format {
            StorageFormat::Binary => {
                let mut writer =
                    BinaryCollectionWriter::create(&self.root_dir, db_name, coll.name())?;
                for doc in &documents {
                    token.check()?;
                    writer.write_document(doc)?;
                }
                writer.flush()?;

                for index in &indexes {
                    token.check()?;
                    index.save_to_disk(&self.root_dir, db_name, coll.name())?;
                }
            }
            StorageFormat::Json => {
                write_json(&coll_dir.join("documents.json"), &documents)?;
            }
        }

        debug!(
            database = db_name,
            collection = coll.name(),
            documents = documents.len(),
            "collection saved"
        );
        Ok(())
    }

    /// Loads a database and all of its collections.
    pub fn load_database(&self, db_name: &str, token: &CancelToken) -> DbResult<Database> {
        token.check()?;
        let db_dir = self.root_dir.join(db_name);
        if !db_dir.is_dir() {
            return Err(DbError::DatabaseNotFound(db_name.to_string()));
        }

        let db = Database::new(db_name);
        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(coll_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let coll = self.load_collection(db_name, &coll_name, token)?;
            db.install_collection(std::sync::Arc::new(coll));
        }

        Ok(db)
    }

    /// Loads one collection according to its metadata.
    pub fn load_collection(
        &self,
        db_name: &str,
        coll_name: &str,
        token: &CancelToken,
    ) -> DbResult<Collection> {
        token.check()?;
        let coll_dir = super::collection_dir(&self.root_dir, db_name, coll_name);
        let meta: CollectionMeta = match read_json(&coll_dir.join("collection.meta.json")) {
            Ok(meta) => meta,
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DbError::CollectionNotFound(coll_name.to_string()))
            }
            Err(e) => return Err(e),
        };

        let coll = match meta.format {
            StorageFormat::Binary => self.load_binary_collection(db_name, &meta, token)?,
            StorageFormat::Json => self.load_json_collection(db_name, &meta, token)?,
        };

        debug!(
            database = db_name,
            collection = coll_name,
            documents = coll.count(),
            "collection loaded"
        );
        Ok(coll)
    }

    /// Binary path: documents come from the data file via the offset
    /// index; user indexes are overlaid from their snapshots, and the
    /// `_id` index is rebuilt from documents if no snapshot existed.
    fn load_binary_collection(
        &self,
        db_name: &str,
        meta: &CollectionMeta,
        token: &CancelToken,
    ) -> DbResult<Collection> {
        token.check()?;
        let documents = match BinaryCollectionReader::open(&self.root_dir, db_name, &meta.name) {
            Ok(mut reader) => reader.read_all()?,
            // No data file yet: the collection was created but never
            // saved with documents.
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        let doc_map: HashMap<String, Document> =
            documents.into_iter().map(|d| (d.id.clone(), d)).collect();

        token.check()?;
        let indexes = load_all_indexes(&self.root_dir, db_name, &meta.name)?;

        Ok(Collection::from_parts(
            meta.name.clone(),
            meta.schema.clone(),
            doc_map,
            indexes,
        ))
    }

    /// Legacy path: documents come from `documents.json` and user indexes
    /// are rebuilt from the metadata's name -> field mapping.
    fn load_json_collection(
        &self,
        db_name: &str,
        meta: &CollectionMeta,
        token: &CancelToken,
    ) -> DbResult<Collection> {
        token.check()?;
        let coll_dir = super::collection_dir(&self.root_dir, db_name, &meta.name);
        let documents: Vec<Document> = match read_json(&coll_dir.join("documents.json")) {
            Ok(docs) => docs,
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        let doc_map: HashMap<String, Document> =
            documents.into_iter().map(|d| (d.id.clone(), d)).collect();

        let mut indexes = HashMap::new();
        for (index_name, field_name) in &meta.indexes {
            if index_name == ID_INDEX_NAME {
                continue;
            }
            let mut index = Index::new(index_name, field_name);
            for doc in doc_map.values() {
                index.add(doc);
            }
            indexes.insert(index_name.clone(), index);
        }

        Ok(Collection::from_parts(
            meta.name.clone(),
            meta.schema.clone(),
            doc_map,
            indexes,
        ))
    }

    /// Whether a database directory exists on disk.
    pub fn database_exists(&self, db_name: &str) -> bool {
        self.root_dir.join(db_name).is_dir()
    }

    /// Removes a database directory recursively. Removing a database that
    /// does not exist on disk is a no-op.
    pub fn delete_database(&self, db_name: &str) -> DbResult<()> {
        match fs::remove_dir_all(self.root_dir.join(db_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads every database under the root (skipping `wal/`), then
    /// replays the WAL so operations logged but not yet persisted are
    /// re-applied.
    pub fn load_all_databases(&self, token: &CancelToken) -> DbResult<DatabaseManager> {
        token.check()?;
        let manager = DatabaseManager::new();

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(db_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if db_name == "wal" {
                continue;
            }

            let db = self.load_database(&db_name, token)?;
            manager.install_database(std::sync::Arc::new(db));
        }

        let pending = self.wal.pending_entries()?;
        let stats = wal::replay(&manager, pending)?;
        if stats.entries_applied > 0 {
            info!(
                entries = stats.entries_applied,
                "re-applied WAL entries on startup"
            );
        }

        Ok(manager)
    }

    /// Saves every database in a manager.
    pub fn save_all_databases(
        &self,
        manager: &DatabaseManager,
        token: &CancelToken,
    ) -> DbResult<()> {
        for db in manager.databases_snapshot() {
            self.save_database(&db, token)?;
        }
        Ok(())
    }

    /// Logs a document insert. The payload is the full document.
    pub fn log_insert(
        &self,
        db_name: &str,
        coll_name: &str,
        doc: &Document,
        token: &CancelToken,
    ) -> DbResult<u64> {
        token.check()?;
        self.wal.append(
            WalEntry::new(WalOp::Insert, db_name)
                .with_collection(coll_name)
                .with_document_id(&doc.id)
                .with_payload(encode_document(doc)?),
        )
    }

    /// Logs a document update. The payload is the full post-update image.
    pub fn log_update(
        &self,
        db_name: &str,
        coll_name: &str,
        doc: &Document,
        token: &CancelToken,
    ) -> DbResult<u64> {
        token.check()?;
        self.wal.append(
            WalEntry::new(WalOp::Update, db_name)
                .with_collection(coll_name)
                .with_document_id(&doc.id)
                .with_payload(encode_document(doc)?),
        )
    }

    /// Logs a document delete.
    pub fn log_delete(
        &self,
        db_name: &str,
        coll_name: &str,
        doc_id: &str,
        token: &CancelToken,
    ) -> DbResult<u64> {
        token.check()?;
        self.wal.append(
            WalEntry::new(WalOp::Delete, db_name)
                .with_collection(coll_name)
                .with_document_id(doc_id),
        )
    }

    /// Logs a database creation.
    pub fn log_create_database(&self, db_name: &str, token: &CancelToken) -> DbResult<u64> {
        token.check()?;
        self.wal.append(WalEntry::new(WalOp::CreateDatabase, db_name))
    }

    /// Logs a database drop.
    pub fn log_delete_database(&self, db_name: &str, token: &CancelToken) -> DbResult<u64> {
        token.check()?;
        self.wal.append(WalEntry::new(WalOp::DeleteDatabase, db_name))
    }

    /// Logs a collection creation. The payload is the schema, when one is
    /// declared.
    pub fn log_create_collection(
        &self,
        db_name: &str,
        coll_name: &str,
        schema: Option<&Schema>,
        token: &CancelToken,
    ) -> DbResult<u64> {
        token.check()?;
        let mut entry = WalEntry::new(WalOp::CreateCollection, db_name).with_collection(coll_name);
        if let Some(schema) = schema {
            let payload = serde_json::to_vec(schema)
                .map_err(|e| DbError::Corruption(format!("failed to serialize schema: {}", e)))?;
            entry = entry.with_payload(payload);
        }
        self.wal.append(entry)
    }

    /// Logs an index creation.
    pub fn log_create_index(
        &self,
        db_name: &str,
        coll_name: &str,
        index_name: &str,
        field_name: &str,
        token: &CancelToken,
    ) -> DbResult<u64> {
        token.check()?;
        let payload = serde_json::to_vec(&CreateIndexPayload {
            index_name: index_name.to_string(),
            field_name: field_name.to_string(),
        })
        .map_err(|e| DbError::Corruption(format!("failed to serialize index payload: {}", e)))?;

        self.wal.append(
            WalEntry::new(WalOp::CreateIndex, db_name)
                .with_collection(coll_name)
                .with_payload(payload),
        )
    }

    /// Writes a WAL checkpoint at the current offset. Call after the
    /// collections affected by the logged operations have been saved.
    pub fn checkpoint(&self) -> DbResult<Checkpoint> {
        self.wal.checkpoint()
    }
}

fn encode_document(doc: &Document) -> DbResult<Vec<u8>> {
    doc.to_json_bytes()
        .map_err(|e| DbError::Corruption(format!("failed to serialize document: {}", e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> DbResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| DbError::Corruption(format!("failed to encode {}: {}", path.display(), e)))?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> DbResult<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DbError::Corruption(format!("malformed {}: {}", path.display(), e)))
}
