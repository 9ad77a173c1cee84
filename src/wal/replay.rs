//! WAL replay.
//!
//! Applies logged operations, in sequence order, onto an in-memory
//! database manager. Every application is guarded so that re-applying an
//! already-persisted operation is a no-op: creates check existence,
//! inserts skip present ids, updates and deletes are id-keyed. Replaying
//! the same entries twice therefore converges to the same state.

use tracing::info;

use crate::cancel::CancelToken;
use crate::document::Document;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::manager::DatabaseManager;
use crate::schema::Schema;

use super::record::{CreateIndexPayload, WalEntry, WalOp};

/// Counters describing one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entries processed
    pub entries_applied: u64,
    /// Documents inserted
    pub inserts: u64,
    /// Documents updated
    pub updates: u64,
    /// Documents deleted
    pub deletes: u64,
    /// Databases created
    pub databases_created: u64,
    /// Databases deleted
    pub databases_deleted: u64,
    /// Collections created
    pub collections_created: u64,
    /// Indexes created
    pub indexes_created: u64,
    /// Sequence number of the last entry applied
    pub final_sequence: u64,
}

/// Replays entries onto a database manager.
pub fn replay(manager: &DatabaseManager, entries: Vec<WalEntry>) -> DbResult<ReplayStats> {
    let mut stats = ReplayStats::default();

    for entry in entries {
        apply_entry(manager, &entry, &mut stats)?;
        stats.entries_applied += 1;
        stats.final_sequence = entry.sequence;
    }

    if stats.entries_applied > 0 {
        info!(
            entries = stats.entries_applied,
            final_sequence = stats.final_sequence,
            "WAL replay complete"
        );
    }
    Ok(stats)
}

fn apply_entry(
    manager: &DatabaseManager,
    entry: &WalEntry,
    stats: &mut ReplayStats,
) -> DbResult<()> {
    match entry.op {
        WalOp::CreateDatabase => {
            if !manager.has_database(&entry.database) {
                manager.create_database(&entry.database)?;
                stats.databases_created += 1;
            }
        }

        WalOp::DeleteDatabase => {
            if manager.has_database(&entry.database) {
                manager.delete_database(&entry.database)?;
                stats.databases_deleted += 1;
            }
        }

        WalOp::CreateCollection => {
            let db = manager.get_database(&entry.database)?;
            let coll_name = required_collection(entry)?;
            if !db.has_collection(coll_name) {
                let schema: Option<Schema> = match &entry.payload {
                    Some(bytes) => Some(serde_json::from_slice(bytes).map_err(|e| {
                        replay_corruption(entry, format!("unparsable schema payload: {}", e))
                    })?),
                    None => None,
                };
                db.create_collection(coll_name, schema)?;
                stats.collections_created += 1;
            }
        }

        WalOp::CreateIndex => {
            let db = manager.get_database(&entry.database)?;
            let coll = db.get_collection(required_collection(entry)?)?;
            let payload = entry.payload.as_ref().ok_or_else(|| {
                replay_corruption(entry, "create_index entry has no payload".to_string())
            })?;
            let descriptor: CreateIndexPayload = serde_json::from_slice(payload)
                .map_err(|e| replay_corruption(entry, format!("unparsable index payload: {}", e)))?;

            match coll.create_index(
                &descriptor.index_name,
                &descriptor.field_name,
                &CancelToken::new(),
            ) {
                Ok(()) => stats.indexes_created += 1,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        WalOp::Insert => {
            let db = manager.get_database(&entry.database)?;
            let coll = db.get_collection(required_collection(entry)?)?;
            let doc = document_payload(entry)?;
            if !coll.contains(&doc.id) {
                coll.apply_full_document(doc);
                stats.inserts += 1;
            }
        }

        WalOp::Update => {
            let db = manager.get_database(&entry.database)?;
            let coll = db.get_collection(required_collection(entry)?)?;
            // The payload is the full post-update image; upserting it is
            // correct whether or not the pre-image was persisted.
            coll.apply_full_document(document_payload(entry)?);
            stats.updates += 1;
        }

        WalOp::Delete => {
            let db = manager.get_database(&entry.database)?;
            let coll = db.get_collection(required_collection(entry)?)?;
            let doc_id = entry.document_id.as_deref().ok_or_else(|| {
                replay_corruption(entry, "delete entry has no document id".to_string())
            })?;

            match coll.delete(doc_id, &CancelToken::new()) {
                Ok(()) => stats.deletes += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

fn required_collection(entry: &WalEntry) -> DbResult<&str> {
    entry
        .collection
        .as_deref()
        .ok_or_else(|| replay_corruption(entry, "entry has no collection name".to_string()))
}

fn document_payload(entry: &WalEntry) -> DbResult<Document> {
    let payload = entry
        .payload
        .as_ref()
        .ok_or_else(|| replay_corruption(entry, "entry has no document payload".to_string()))?;
    let doc = Document::from_json_bytes(payload)
        .map_err(|e| replay_corruption(entry, format!("unparsable document payload: {}", e)))?;
    if doc.id.is_empty() {
        return Err(replay_corruption(
            entry,
            "document payload has no _id".to_string(),
        ));
    }
    Ok(doc)
}

fn replay_corruption(entry: &WalEntry, reason: String) -> DbError {
    DbError::Corruption(format!(
        "replay of sequence {} ({:?}): {}",
        entry.sequence, entry.op, reason
    ))
}
