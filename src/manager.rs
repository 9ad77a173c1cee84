//! The database manager: the root of the in-memory hierarchy.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::database::Database;
use crate::error::{DbError, DbResult};

/// Top-level registry of databases by name.
#[derive(Default)]
pub struct DatabaseManager {
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl DatabaseManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database, rejecting duplicates.
    pub fn create_database(&self, name: &str) -> DbResult<Arc<Database>> {
        if name.is_empty() {
            return Err(DbError::EmptyName("database"));
        }

        let mut databases = self.databases.write().expect("manager lock poisoned");
        if databases.contains_key(name) {
            return Err(DbError::DatabaseExists(name.to_string()));
        }

        let database = Arc::new(Database::new(name));
        databases.insert(name.to_string(), database.clone());
        Ok(database)
    }

    /// Removes a database and all of its collections from memory. Pairing
    /// this with on-disk removal is the storage manager's job.
    pub fn delete_database(&self, name: &str) -> DbResult<()> {
        let mut databases = self.databases.write().expect("manager lock poisoned");
        if databases.remove(name).is_none() {
            return Err(DbError::DatabaseNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Returns a shared handle to a database.
    pub fn get_database(&self, name: &str) -> DbResult<Arc<Database>> {
        let databases = self.databases.read().expect("manager lock poisoned");
        databases
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::DatabaseNotFound(name.to_string()))
    }

    /// Whether a database with the given name exists.
    pub fn has_database(&self, name: &str) -> bool {
        let databases = self.databases.read().expect("manager lock poisoned");
        databases.contains_key(name)
    }

    /// Snapshot of database names, in unspecified order.
    pub fn list_databases(&self) -> Vec<String> {
        let databases = self.databases.read().expect("manager lock poisoned");
        databases.keys().cloned().collect()
    }

    /// Installs an already-built database, replacing any existing one.
    /// Used when loading from disk.
    pub(crate) fn install_database(&self, database: Arc<Database>) {
        let mut databases = self.databases.write().expect("manager lock poisoned");
        databases.insert(database.name().to_string(), database);
    }

    /// Snapshot of the database handles, for persistence.
    pub(crate) fn databases_snapshot(&self) -> Vec<Arc<Database>> {
        let databases = self.databases.read().expect("manager lock poisoned");
        databases.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn create_get_delete_cycle() {
        let manager = DatabaseManager::new();
        manager.create_database("app").unwrap();

        assert!(manager.has_database("app"));
        assert_eq!(manager.get_database("app").unwrap().name(), "app");

        manager.delete_database("app").unwrap();
        assert!(!manager.has_database("app"));
    }

    #[test]
    fn duplicate_database_rejected() {
        let manager = DatabaseManager::new();
        manager.create_database("app").unwrap();

        let err = manager.create_database("app").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn missing_database_is_not_found() {
        let manager = DatabaseManager::new();
        assert_eq!(
            manager.get_database("ghost").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            manager.delete_database("ghost").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn delete_drops_non_empty_database() {
        let manager = DatabaseManager::new();
        let db = manager.create_database("app").unwrap();
        db.create_collection("users", None).unwrap();

        manager.delete_database("app").unwrap();
        assert!(manager.list_databases().is_empty());
    }

    #[test]
    fn list_databases_snapshots_names() {
        let manager = DatabaseManager::new();
        manager.create_database("a").unwrap();
        manager.create_database("b").unwrap();

        let mut names = manager.list_databases();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
