//! A named database: a set of collections behind a readers-writer lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::collection::Collection;
use crate::error::{DbError, DbResult};
use crate::schema::{validate_schema, Schema};

/// A database owning its collections exclusively. Callers receive shared
/// handles to collections; the collections synchronize themselves.
#[derive(Debug)]
pub struct Database {
    name: String,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a collection, validating the schema definition first.
    pub fn create_collection(
        &self,
        name: &str,
        schema: Option<Schema>,
    ) -> DbResult<Arc<Collection>> {
        if name.is_empty() {
            return Err(DbError::EmptyName("collection"));
        }
        if let Some(schema) = &schema {
            validate_schema(schema)?;
        }

        let mut collections = self.collections.write().expect("database lock poisoned");
        if collections.contains_key(name) {
            return Err(DbError::CollectionExists(name.to_string()));
        }

        let collection = Arc::new(Collection::new(name, schema));
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Drops a collection and everything in it.
    pub fn drop_collection(&self, name: &str) -> DbResult<()> {
        let mut collections = self.collections.write().expect("database lock poisoned");
        if collections.remove(name).is_none() {
            return Err(DbError::CollectionNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Returns a shared handle to a collection.
    pub fn get_collection(&self, name: &str) -> DbResult<Arc<Collection>> {
        let collections = self.collections.read().expect("database lock poisoned");
        collections
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::CollectionNotFound(name.to_string()))
    }

    /// Whether a collection with the given name exists.
    pub fn has_collection(&self, name: &str) -> bool {
        let collections = self.collections.read().expect("database lock poisoned");
        collections.contains_key(name)
    }

    /// Snapshot of the collection names, in unspecified order.
    pub fn list_collections(&self) -> Vec<String> {
        let collections = self.collections.read().expect("database lock poisoned");
        collections.keys().cloned().collect()
    }

    /// Installs an already-built collection, replacing any existing one.
    /// Used when loading from disk.
    pub(crate) fn install_collection(&self, collection: Arc<Collection>) {
        let mut collections = self.collections.write().expect("database lock poisoned");
        collections.insert(collection.name().to_string(), collection);
    }

    /// Snapshot of the collection handles, for persistence.
    pub(crate) fn collections_snapshot(&self) -> Vec<Arc<Collection>> {
        let collections = self.collections.read().expect("database lock poisoned");
        collections.values().cloned().collect()
    }
}
