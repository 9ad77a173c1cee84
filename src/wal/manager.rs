//! WAL manager: append cursor, fsync discipline, checkpoint marker.
//!
//! An operation is logged once its record has been appended to
//! `wal/wal.log` and fsynced; only then may the in-memory mutation
//! proceed. The append cursor and file handle live behind a
//! readers-writer lock: appends take it exclusively, offset reads take
//! it shared.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

use super::reader::WalReader;
use super::record::WalEntry;

/// Checkpoint marker, stored as `wal/checkpoint.json`. All operations at
/// offsets below `offset` are durably reflected in collection files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// WAL byte offset covered by this checkpoint
    pub offset: u64,
    /// Sequence number of the last covered operation
    pub sequence: u64,
    /// RFC3339 timestamp of checkpoint creation
    pub created_at: String,
}

struct WalState {
    file: File,
    offset: u64,
    next_sequence: u64,
}

/// Owns the WAL directory and the append handle.
pub struct WalManager {
    wal_dir: PathBuf,
    state: RwLock<WalState>,
}

impl WalManager {
    /// Opens or creates the WAL under `<root>/wal/`.
    ///
    /// The existing log is scanned to recover the append position and the
    /// next sequence number. A torn record at the tail is physically
    /// truncated away so a later append cannot bury it mid-file.
    pub fn open(root: &Path) -> DbResult<Self> {
        let wal_dir = root.join("wal");
        fs::create_dir_all(&wal_dir)?;
        let wal_path = wal_dir.join("wal.log");

        let (valid_end, last_sequence) = match WalReader::open(&wal_path) {
            Ok(mut reader) => {
                while reader.read_next()?.is_some() {}
                (reader.current_offset(), reader.last_sequence())
            }
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => (0, 0),
            Err(e) => return Err(e),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_end {
            warn!(
                valid_end,
                file_len, "truncating torn records from WAL tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        Ok(Self {
            wal_dir,
            state: RwLock::new(WalState {
                file,
                offset: valid_end,
                next_sequence: last_sequence + 1,
            }),
        })
    }

    /// Path of the log file.
    pub fn wal_path(&self) -> PathBuf {
        self.wal_dir.join("wal.log")
    }

    /// Path of the checkpoint marker.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.wal_dir.join("checkpoint.json")
    }

    /// Appends an entry, assigning its sequence number, and fsyncs before
    /// returning. The returned sequence is the one written.
    pub fn append(&self, mut entry: WalEntry) -> DbResult<u64> {
        let mut state = self.state.write().expect("WAL lock poisoned");

        entry.sequence = state.next_sequence;
        let bytes = entry.serialize();

        state.file.write_all(&bytes)?;
        state.file.sync_all()?;

        state.offset += bytes.len() as u64;
        state.next_sequence += 1;

        debug!(
            sequence = entry.sequence,
            op = ?entry.op,
            database = %entry.database,
            "WAL append"
        );
        Ok(entry.sequence)
    }

    /// Current end-of-log offset.
    pub fn current_offset(&self) -> u64 {
        self.state.read().expect("WAL lock poisoned").offset
    }

    /// Sequence number of the last appended entry, 0 when none.
    pub fn last_sequence(&self) -> u64 {
        self.state.read().expect("WAL lock poisoned").next_sequence - 1
    }

    /// Writes a checkpoint marker at the current offset: every logged
    /// operation so far is declared durably reflected in collection
    /// files, and replay will start after it.
    pub fn checkpoint(&self) -> DbResult<Checkpoint> {
        let (offset, sequence) = {
            let state = self.state.read().expect("WAL lock poisoned");
            (state.offset, state.next_sequence - 1)
        };

        let marker = Checkpoint {
            offset,
            sequence,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let json = serde_json::to_vec_pretty(&marker)
            .map_err(|e| DbError::Corruption(format!("checkpoint encode: {}", e)))?;
        let mut file = File::create(self.checkpoint_path())?;
        file.write_all(&json)?;
        file.sync_all()?;

        info!(offset, sequence, "WAL checkpoint written");
        Ok(marker)
    }

    /// Reads the last checkpoint marker. A missing or unparsable marker
    /// reads as none; replay from the start is always safe because
    /// entries are idempotent.
    pub fn read_checkpoint(&self) -> Option<Checkpoint> {
        let bytes = fs::read(self.checkpoint_path()).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(error = %e, "ignoring unparsable checkpoint marker");
                None
            }
        }
    }

    /// Returns the entries logged after the last checkpoint, in sequence
    /// order. These are the operations replay must re-apply.
    pub fn pending_entries(&self) -> DbResult<Vec<WalEntry>> {
        let mut reader = match WalReader::open(&self.wal_path()) {
            Ok(reader) => reader,
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if let Some(checkpoint) = self.read_checkpoint() {
            reader.seek_to(checkpoint.offset)?;
        }

        reader.read_remaining()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;

    use tempfile::TempDir;

    use super::super::record::WalOp;
    use super::*;

    fn insert_entry(doc_id: &str) -> WalEntry {
        WalEntry::new(WalOp::Insert, "app")
            .with_collection("users")
            .with_document_id(doc_id)
            .with_payload(format!(r#"{{"_id":"{}"}}"#, doc_id).into_bytes())
    }

    #[test]
    fn append_assigns_ascending_sequences() {
        let tmp = TempDir::new().unwrap();
        let wal = WalManager::open(tmp.path()).unwrap();

        assert_eq!(wal.append(insert_entry("u1")).unwrap(), 1);
        assert_eq!(wal.append(insert_entry("u2")).unwrap(), 2);
        assert_eq!(wal.last_sequence(), 2);
        assert!(wal.current_offset() > 0);
    }

    #[test]
    fn sequences_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let wal = WalManager::open(tmp.path()).unwrap();
            wal.append(insert_entry("u1")).unwrap();
            wal.append(insert_entry("u2")).unwrap();
        }

        let wal = WalManager::open(tmp.path()).unwrap();
        assert_eq!(wal.append(insert_entry("u3")).unwrap(), 3);
    }

    #[test]
    fn torn_tail_truncated_on_open() {
        let tmp = TempDir::new().unwrap();
        let wal_path = {
            let wal = WalManager::open(tmp.path()).unwrap();
            wal.append(insert_entry("u1")).unwrap();
            wal.wal_path()
        };
        let valid_len = fs::metadata(&wal_path).unwrap().len();

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[0xAB; 11]).unwrap();
        drop(file);

        let wal = WalManager::open(tmp.path()).unwrap();
        assert_eq!(fs::metadata(&wal_path).unwrap().len(), valid_len);
        assert_eq!(wal.current_offset(), valid_len);

        // The log keeps working after truncation.
        assert_eq!(wal.append(insert_entry("u2")).unwrap(), 2);
        let entries = wal.pending_entries().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn checkpoint_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let wal = WalManager::open(tmp.path()).unwrap();
        wal.append(insert_entry("u1")).unwrap();

        let written = wal.checkpoint().unwrap();
        let read = wal.read_checkpoint().unwrap();
        assert_eq!(written, read);
        assert_eq!(read.offset, wal.current_offset());
        assert_eq!(read.sequence, 1);
    }

    #[test]
    fn pending_entries_start_after_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let wal = WalManager::open(tmp.path()).unwrap();

        wal.append(insert_entry("u1")).unwrap();
        wal.checkpoint().unwrap();
        wal.append(insert_entry("u2")).unwrap();
        wal.append(insert_entry("u3")).unwrap();

        let pending = wal.pending_entries().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].document_id.as_deref(), Some("u2"));
    }

    #[test]
    fn no_checkpoint_replays_everything() {
        let tmp = TempDir::new().unwrap();
        let wal = WalManager::open(tmp.path()).unwrap();
        wal.append(insert_entry("u1")).unwrap();
        wal.append(insert_entry("u2")).unwrap();

        assert_eq!(wal.pending_entries().unwrap().len(), 2);
    }

    #[test]
    fn missing_log_has_no_pending_entries() {
        let tmp = TempDir::new().unwrap();
        let wal = WalManager::open(tmp.path()).unwrap();
        // Remove the (empty) log file created on open.
        fs::remove_file(wal.wal_path()).unwrap();

        assert!(wal.pending_entries().unwrap().is_empty());
    }
}
