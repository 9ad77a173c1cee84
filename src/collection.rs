//! Collections: documents, indexes, and the query path.
//!
//! A single readers-writer lock protects the document map and the index
//! map together, so every index always agrees with the documents it was
//! built from. Mutations take the lock exclusively; reads take it shared
//! and hand back deep clones, never aliases into the store.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::index::{Index, ID_INDEX_NAME};
use crate::query::{matches_all_filters, FilterOp, Query};
use crate::schema::{validate_document, Schema};

/// A named set of documents with optional schema and hash indexes.
#[derive(Debug)]
pub struct Collection {
    name: String,
    schema: Option<Schema>,
    inner: RwLock<CollectionInner>,
}

#[derive(Debug)]
struct CollectionInner {
    documents: HashMap<String, Document>,
    indexes: HashMap<String, Index>,
}

impl Collection {
    /// Creates an empty collection. The automatic `_id` index is installed
    /// immediately and cannot be dropped.
    pub fn new(name: impl Into<String>, schema: Option<Schema>) -> Self {
        let mut indexes = HashMap::new();
        indexes.insert(ID_INDEX_NAME.to_string(), Index::id_index());

        Self {
            name: name.into(),
            schema,
            inner: RwLock::new(CollectionInner {
                documents: HashMap::new(),
                indexes,
            }),
        }
    }

    /// Reassembles a collection from persisted parts. The `_id` index is
    /// rebuilt from the documents when no snapshot supplied it.
    pub(crate) fn from_parts(
        name: impl Into<String>,
        schema: Option<Schema>,
        documents: HashMap<String, Document>,
        mut indexes: HashMap<String, Index>,
    ) -> Self {
        if !indexes.contains_key(ID_INDEX_NAME) {
            let mut id_index = Index::id_index();
            for doc in documents.values() {
                id_index.add(doc);
            }
            indexes.insert(ID_INDEX_NAME.to_string(), id_index);
        }

        Self {
            name: name.into(),
            schema,
            inner: RwLock::new(CollectionInner { documents, indexes }),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema constraining this collection's documents, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Inserts a document, assigning a UUID v4 id when none is supplied.
    /// Returns the id under which the document was stored.
    pub fn insert(&self, mut doc: Document, token: &CancelToken) -> DbResult<String> {
        token.check()?;
        let mut inner = self.inner.write().expect("collection lock poisoned");

        if doc.id.is_empty() {
            doc.id = Uuid::new_v4().to_string();
        }
        if doc.data.contains_key("_id") {
            return Err(DbError::ReservedFieldName);
        }
        if inner.documents.contains_key(&doc.id) {
            return Err(DbError::DocumentExists(doc.id));
        }

        if let Some(schema) = &self.schema {
            validate_document(&doc, schema)?;
        }

        let id = doc.id.clone();
        for index in inner.indexes.values_mut() {
            index.add(&doc);
        }
        inner.documents.insert(id.clone(), doc);

        Ok(id)
    }

    /// Returns a deep clone of the document with the given id.
    pub fn find_by_id(&self, id: &str) -> DbResult<Document> {
        let inner = self.inner.read().expect("collection lock poisoned");
        inner
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::DocumentNotFound(id.to_string()))
    }

    /// Runs a query and returns deep clones of the matching documents.
    ///
    /// When the first filter is an equality test on an indexed field, the
    /// index resolves the candidate set without a scan: a miss returns
    /// empty immediately, a hit narrows the candidates to one document.
    /// Candidate indexes on the same field are considered in ascending
    /// name order so planning is deterministic. All filters, including the
    /// first, are then applied, followed by skip and limit.
    pub fn find(&self, query: &Query) -> DbResult<Vec<Document>> {
        let inner = self.inner.read().expect("collection lock poisoned");

        let mut results: Vec<Document> = if query.filters.is_empty() {
            inner.documents.values().cloned().collect()
        } else {
            let first = &query.filters[0];
            let index = if first.operator == FilterOp::Eq {
                let mut covering: Vec<&Index> = inner
                    .indexes
                    .values()
                    .filter(|idx| idx.field_name == first.field)
                    .collect();
                covering.sort_by(|a, b| a.name.cmp(&b.name));
                covering.into_iter().next()
            } else {
                None
            };

            let matching = |doc: &Document| matches_all_filters(doc, &query.filters);
            match index {
                Some(index) => match index.find(&first.value) {
                    None => Vec::new(),
                    Some(doc_id) => inner
                        .documents
                        .get(doc_id)
                        .filter(|doc| matching(doc))
                        .cloned()
                        .into_iter()
                        .collect(),
                },
                None => inner
                    .documents
                    .values()
                    .filter(|doc| matching(doc))
                    .cloned()
                    .collect(),
            }
        };

        if query.skip > 0 {
            if query.skip >= results.len() {
                return Ok(Vec::new());
            }
            results.drain(..query.skip);
        }
        if query.limit > 0 && query.limit < results.len() {
            results.truncate(query.limit);
        }

        Ok(results)
    }

    /// Applies field updates to a document and returns the new image.
    ///
    /// `_id` cannot be updated. A rejected update leaves the stored
    /// document untouched: the new image is validated against the schema
    /// before it replaces the pre-image.
    pub fn update(
        &self,
        id: &str,
        updates: &Map<String, Value>,
        token: &CancelToken,
    ) -> DbResult<Document> {
        token.check()?;
        if updates.contains_key("_id") {
            return Err(DbError::CannotUpdateId);
        }

        let mut inner = self.inner.write().expect("collection lock poisoned");

        let old_doc = inner
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::DocumentNotFound(id.to_string()))?;

        let mut new_doc = old_doc.clone();
        for (key, value) in updates {
            new_doc.data.insert(key.clone(), value.clone());
        }

        if let Some(schema) = &self.schema {
            // The document map still holds the pre-image; nothing to roll
            // back yet.
            validate_document(&new_doc, schema)?;
        }

        for index in inner.indexes.values_mut() {
            index.remove(&old_doc);
            index.add(&new_doc);
        }
        inner.documents.insert(id.to_string(), new_doc.clone());

        Ok(new_doc)
    }

    /// Deletes a document, removing its entries from every index first.
    pub fn delete(&self, id: &str, token: &CancelToken) -> DbResult<()> {
        token.check()?;
        let mut inner = self.inner.write().expect("collection lock poisoned");

        let doc = inner
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::DocumentNotFound(id.to_string()))?;

        for index in inner.indexes.values_mut() {
            index.remove(&doc);
        }
        inner.documents.remove(id);

        Ok(())
    }

    /// Creates a hash index over a field, built from the current documents.
    pub fn create_index(
        &self,
        index_name: &str,
        field_name: &str,
        token: &CancelToken,
    ) -> DbResult<()> {
        token.check()?;
        if index_name.is_empty() {
            return Err(DbError::EmptyName("index"));
        }
        if field_name.is_empty() {
            return Err(DbError::EmptyName("field"));
        }

        let mut inner = self.inner.write().expect("collection lock poisoned");

        if inner.indexes.contains_key(index_name) {
            return Err(DbError::IndexExists(index_name.to_string()));
        }

        let mut index = Index::new(index_name, field_name);
        for doc in inner.documents.values() {
            index.add(doc);
        }
        inner.indexes.insert(index_name.to_string(), index);

        Ok(())
    }

    /// Drops a user index. The automatic `_id` index cannot be dropped.
    pub fn drop_index(&self, index_name: &str) -> DbResult<()> {
        let mut inner = self.inner.write().expect("collection lock poisoned");

        if index_name == ID_INDEX_NAME {
            return Err(DbError::CannotDropIdIndex);
        }
        if inner.indexes.remove(index_name).is_none() {
            return Err(DbError::IndexNotFound(index_name.to_string()));
        }

        Ok(())
    }

    /// Number of documents in the collection.
    pub fn count(&self) -> usize {
        let inner = self.inner.read().expect("collection lock poisoned");
        inner.documents.len()
    }

    /// Index-name to field-name mapping, for collection metadata.
    pub fn index_fields(&self) -> HashMap<String, String> {
        let inner = self.inner.read().expect("collection lock poisoned");
        inner
            .indexes
            .values()
            .map(|idx| (idx.name.clone(), idx.field_name.clone()))
            .collect()
    }

    /// Clones documents and indexes under one shared lock, for persistence.
    pub(crate) fn snapshot(&self) -> (Vec<Document>, Vec<Index>) {
        let inner = self.inner.read().expect("collection lock poisoned");
        (
            inner.documents.values().cloned().collect(),
            inner.indexes.values().cloned().collect(),
        )
    }

    /// Upserts a full document image, refreshing every index. Used by WAL
    /// replay, where payloads carry the complete post-operation state and
    /// were validated before logging.
    pub(crate) fn apply_full_document(&self, doc: Document) {
        let mut inner = self.inner.write().expect("collection lock poisoned");

        if let Some(old_doc) = inner.documents.get(&doc.id).cloned() {
            for index in inner.indexes.values_mut() {
                index.remove(&old_doc);
            }
        }
        for index in inner.indexes.values_mut() {
            index.add(&doc);
        }
        inner.documents.insert(doc.id.clone(), doc);
    }

    /// Whether a document with the given id exists.
    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().expect("collection lock poisoned");
        inner.documents.contains_key(id)
    }
}
