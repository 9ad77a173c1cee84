//! Equality hash indexes.
//!
//! An index maps the canonical string form of one field's value to a
//! document id. Lookups are equality-only; last writer wins when two
//! documents share a value, so at most one id is retrievable per distinct
//! key. Each index snapshots to `<root>/<db>/<coll>/indexes/<name>.json`
//! and loads back symmetrically.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{canonical_string, Document};
use crate::error::{DbError, DbResult};

/// Name of the automatic per-collection id index.
pub const ID_INDEX_NAME: &str = "_id";

/// In-memory hash index over one document field.
///
/// Always accessed under the owning collection's lock, so it carries no
/// lock of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name, unique within the collection
    pub name: String,
    /// Document field this index covers
    pub field_name: String,
    /// Canonical value string -> document id
    pub data: HashMap<String, String>,
}

impl Index {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_name: field_name.into(),
            data: HashMap::new(),
        }
    }

    /// Creates the automatic `_id` index.
    pub fn id_index() -> Self {
        Self::new(ID_INDEX_NAME, ID_INDEX_NAME)
    }

    /// Adds a document's entry. A document without the indexed field is
    /// skipped.
    pub fn add(&mut self, doc: &Document) {
        if let Some(value) = doc.get_value(&self.field_name) {
            self.data.insert(canonical_string(&value), doc.id.clone());
        }
    }

    /// Removes a document's entry. Symmetric with [`Index::add`].
    pub fn remove(&mut self, doc: &Document) {
        if let Some(value) = doc.get_value(&self.field_name) {
            self.data.remove(&canonical_string(&value));
        }
    }

    /// Looks up the document id indexed under a value, if any.
    pub fn find(&self, value: &Value) -> Option<&String> {
        self.data.get(&canonical_string(value))
    }

    /// Number of distinct indexed values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no values are indexed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes the index snapshot to its JSON file, creating the `indexes/`
    /// directory if needed.
    pub fn save_to_disk(&self, root: &Path, db_name: &str, coll_name: &str) -> DbResult<()> {
        let index_dir = indexes_dir(root, db_name, coll_name);
        fs::create_dir_all(&index_dir)?;

        let path = index_dir.join(format!("{}.json", self.name));
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| DbError::Corruption(format!("failed to serialize index: {}", e)))?;
        fs::write(path, json)?;

        Ok(())
    }
}

/// Loads one index snapshot by name.
pub fn load_index_from_disk(
    root: &Path,
    db_name: &str,
    coll_name: &str,
    index_name: &str,
) -> DbResult<Index> {
    let path = indexes_dir(root, db_name, coll_name).join(format!("{}.json", index_name));
    let bytes = fs::read(&path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        DbError::Corruption(format!(
            "malformed index snapshot '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Loads every index snapshot for a collection. A missing `indexes/`
/// directory means no persisted indexes.
pub fn load_all_indexes(
    root: &Path,
    db_name: &str,
    coll_name: &str,
) -> DbResult<HashMap<String, Index>> {
    let index_dir = indexes_dir(root, db_name, coll_name);
    if !index_dir.exists() {
        return Ok(HashMap::new());
    }

    let mut indexes = HashMap::new();
    for entry in fs::read_dir(&index_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(index_name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let index = load_index_from_disk(root, db_name, coll_name, index_name)?;
        indexes.insert(index.name.clone(), index);
    }

    Ok(indexes)
}

fn indexes_dir(root: &Path, db_name: &str, coll_name: &str) -> PathBuf {
    root.join(db_name).join(coll_name).join("indexes")
}
