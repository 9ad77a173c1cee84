//! Binary collection writer.
//!
//! A save rewrites the data file from scratch: header first, then one
//! record per live document, appended in call order. `flush` fsyncs the
//! data file and replaces the sidecar offset index, in that order, so an
//! index entry never points at bytes that might not survive a crash.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::document::Document;
use crate::error::{DbError, DbResult};

use super::checksum::compute_checksum;
use super::offset_index::OffsetIndex;
use super::record::{BinaryHeader, RecordEntry, HEADER_SIZE, RECORD_HEADER_SIZE};

/// Writes a collection's documents into `collection.data` and tracks
/// their locations for the sidecar index.
pub struct BinaryCollectionWriter {
    data_file: File,
    idx_path: PathBuf,
    offset: u64,
    index: OffsetIndex,
}

impl BinaryCollectionWriter {
    /// Creates the collection directory if needed and starts a fresh data
    /// file with a compressed-payload header.
    pub fn create(root: &Path, db_name: &str, coll_name: &str) -> DbResult<Self> {
        let coll_dir = super::collection_dir(root, db_name, coll_name);
        fs::create_dir_all(&coll_dir)?;

        let mut data_file = File::create(super::data_path(root, db_name, coll_name))?;
        data_file.write_all(&BinaryHeader::new_compressed().encode())?;

        Ok(Self {
            data_file,
            idx_path: super::idx_path(root, db_name, coll_name),
            offset: HEADER_SIZE as u64,
            index: OffsetIndex::new(),
        })
    }

    /// Appends one document record: compressed JSON payload preceded by
    /// the self-describing record header.
    pub fn write_document(&mut self, doc: &Document) -> DbResult<()> {
        let json = doc
            .to_json_bytes()
            .map_err(|e| DbError::Corruption(format!("failed to serialize document: {}", e)))?;
        let compressed = codec::compress(&json)?;

        let entry = RecordEntry {
            offset: self.offset,
            size: json.len() as u32,
            compressed_size: compressed.len() as u32,
            checksum: compute_checksum(&compressed),
        };

        self.data_file.write_all(&entry.encode())?;
        self.data_file.write_all(&compressed)?;

        self.index.entries.insert(doc.id.clone(), entry);
        self.offset += (RECORD_HEADER_SIZE + compressed.len()) as u64;

        Ok(())
    }

    /// Fsyncs the data file and saves the sidecar offset index.
    pub fn flush(&mut self) -> DbResult<()> {
        self.data_file.sync_all()?;
        self.index.save(&self.idx_path)?;
        Ok(())
    }

    /// Number of records written so far.
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Current end-of-file offset.
    pub fn current_offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn doc(id: &str, value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(m) => Document::with_id(id, m),
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn create_writes_header() {
        let tmp = TempDir::new().unwrap();
        let writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();
        assert_eq!(writer.current_offset(), HEADER_SIZE as u64);

        let bytes = fs::read(super::super::data_path(tmp.path(), "app", "users")).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let header = BinaryHeader::decode(&bytes.try_into().unwrap());
        assert!(header.validate().is_ok());
        assert!(header.compressed());
    }

    #[test]
    fn write_advances_offset_and_tracks_entry() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();

        writer.write_document(&doc("u1", json!({"name": "Ada"}))).unwrap();
        assert_eq!(writer.record_count(), 1);
        assert!(writer.current_offset() > HEADER_SIZE as u64);

        let entry = writer.index.entries["u1"];
        assert_eq!(entry.offset, HEADER_SIZE as u64);
        assert!(entry.compressed_size > 0);
    }

    #[test]
    fn flush_persists_sidecar() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();
        writer.write_document(&doc("u1", json!({"name": "Ada"}))).unwrap();
        writer.flush().unwrap();

        let sidecar =
            OffsetIndex::load(&super::super::idx_path(tmp.path(), "app", "users")).unwrap();
        assert_eq!(sidecar.len(), 1);
        assert_eq!(sidecar.entries["u1"], writer.index.entries["u1"]);
    }

    #[test]
    fn create_truncates_previous_save() {
        let tmp = TempDir::new().unwrap();

        {
            let mut writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();
            writer.write_document(&doc("u1", json!({"n": 1}))).unwrap();
            writer.write_document(&doc("u2", json!({"n": 2}))).unwrap();
            writer.flush().unwrap();
        }

        let first_len = fs::metadata(super::super::data_path(tmp.path(), "app", "users"))
            .unwrap()
            .len();

        {
            let mut writer = BinaryCollectionWriter::create(tmp.path(), "app", "users").unwrap();
            writer.write_document(&doc("u1", json!({"n": 1}))).unwrap();
            writer.flush().unwrap();
        }

        let second_len = fs::metadata(super::super::data_path(tmp.path(), "app", "users"))
            .unwrap()
            .len();
        assert!(second_len < first_len);
    }
}
