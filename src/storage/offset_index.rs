//! Sidecar offset index: document id -> record location.
//!
//! `collection.idx` makes random reads O(1): `u32 count`, then per entry
//! `u32 id_len | id bytes | u64 offset | u32 size | u32 compressed_size |
//! u32 checksum`, all little-endian. A missing file means an empty index.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{DbError, DbResult};

use super::record::{RecordEntry, RECORD_HEADER_SIZE};

/// Maps document ids to their record locations in the data file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetIndex {
    /// Record locations by document id
    pub entries: HashMap<String, RecordEntry>,
}

impl OffsetIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the index to its sidecar file, replacing any previous one.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for (doc_id, entry) in &self.entries {
            writer.write_all(&(doc_id.len() as u32).to_le_bytes())?;
            writer.write_all(doc_id.as_bytes())?;
            writer.write_all(&entry.encode())?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Loads the index from its sidecar file. A missing file yields an
    /// empty index; a short or garbled file is a corruption error.
    pub fn load(path: &Path) -> DbResult<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let mut count_buf = [0u8; 4];
        match reader.read_exact(&mut count_buf) {
            Ok(()) => {}
            // Zero-length sidecar: nothing saved yet.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        }
        let count = u32::from_le_bytes(count_buf);

        let mut entries = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .map_err(|e| truncated(path, e))?;
            let id_len = u32::from_le_bytes(len_buf) as usize;

            let mut id_buf = vec![0u8; id_len];
            reader
                .read_exact(&mut id_buf)
                .map_err(|e| truncated(path, e))?;
            let doc_id = String::from_utf8(id_buf).map_err(|e| {
                DbError::Corruption(format!(
                    "offset index '{}' has non-UTF-8 document id: {}",
                    path.display(),
                    e
                ))
            })?;

            let mut entry_buf = [0u8; RECORD_HEADER_SIZE];
            reader
                .read_exact(&mut entry_buf)
                .map_err(|e| truncated(path, e))?;

            entries.insert(doc_id, RecordEntry::decode(&entry_buf));
        }

        Ok(Self { entries })
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn truncated(path: &Path, err: io::Error) -> DbError {
    DbError::Corruption(format!(
        "offset index '{}' is truncated: {}",
        path.display(),
        err
    ))
}
