//! Binary collection reader.
//!
//! Opening validates the 8-byte header; magic or version mismatch rejects
//! the file outright. Individual reads locate the record through the
//! sidecar offset index, cross-check the record's self-describing header
//! against its position, and verify the CRC32 before decompressing. A
//! damaged record fails alone; the rest of the file stays readable.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec;
use crate::document::Document;
use crate::error::{DbError, DbResult};

use super::checksum::compute_checksum;
use super::offset_index::OffsetIndex;
use super::record::{BinaryHeader, RecordEntry, HEADER_SIZE, RECORD_HEADER_SIZE};

/// Reads documents out of a collection's binary data file.
#[derive(Debug)]
pub struct BinaryCollectionReader {
    data_file: File,
    header: BinaryHeader,
    index: OffsetIndex,
}

impl BinaryCollectionReader {
    /// Opens a collection's data file and its offset index. Fails with an
    /// I/O not-found error when the data file does not exist, and with an
    /// integrity error when the header does not identify a supported file.
    pub fn open(root: &Path, db_name: &str, coll_name: &str) -> DbResult<Self> {
        let mut data_file = File::open(super::data_path(root, db_name, coll_name))?;

        let mut header_buf = [0u8; HEADER_SIZE];
        data_file.read_exact(&mut header_buf).map_err(|e| {
            DbError::Corruption(format!("collection data file too short for header: {}", e))
        })?;
        let header = BinaryHeader::decode(&header_buf);
        header.validate()?;

        let index = OffsetIndex::load(&super::idx_path(root, db_name, coll_name))?;

        Ok(Self {
            data_file,
            header,
            index,
        })
    }

    /// Whether this file stores compressed payloads.
    pub fn compressed(&self) -> bool {
        self.header.compressed()
    }

    /// Document ids present in the offset index.
    pub fn document_ids(&self) -> Vec<String> {
        self.index.entries.keys().cloned().collect()
    }

    /// Reads one document by id.
    pub fn read_document(&mut self, doc_id: &str) -> DbResult<Document> {
        let entry = *self
            .index
            .entries
            .get(doc_id)
            .ok_or_else(|| DbError::DocumentNotFound(doc_id.to_string()))?;

        self.data_file.seek(SeekFrom::Start(entry.offset))?;

        let mut header_buf = [0u8; RECORD_HEADER_SIZE];
        self.data_file.read_exact(&mut header_buf).map_err(|e| {
            DbError::Corruption(format!(
                "record for document '{}' is truncated: {}",
                doc_id, e
            ))
        })?;
        let stored = RecordEntry::decode(&header_buf);

        // The record carries its own offset; disagreement with the sidecar
        // means one of the two files is stale.
        if stored.offset != entry.offset || stored.compressed_size != entry.compressed_size {
            return Err(DbError::Corruption(format!(
                "record header for document '{}' disagrees with offset index",
                doc_id
            )));
        }

        let mut payload = vec![0u8; entry.compressed_size as usize];
        self.data_file.read_exact(&mut payload).map_err(|e| {
            DbError::Corruption(format!(
                "record payload for document '{}' is truncated: {}",
                doc_id, e
            ))
        })?;

        let computed = compute_checksum(&payload);
        if computed != entry.checksum {
            return Err(DbError::ChecksumMismatch {
                document_id: doc_id.to_string(),
                computed,
                stored: entry.checksum,
            });
        }

        let json = if self.header.compressed() {
            codec::decompress(&payload)?
        } else {
            payload
        };

        if json.len() != entry.size as usize {
            return Err(DbError::Corruption(format!(
                "document '{}' decompressed to {} bytes, expected {}",
                doc_id,
                json.len(),
                entry.size
            )));
        }

        Document::from_json_bytes(&json).map_err(|e| {
            DbError::Corruption(format!("document '{}' is not valid JSON: {}", doc_id, e))
        })
    }

    /// Reads every document in the file, in offset order.
    pub fn read_all(&mut self) -> DbResult<Vec<Document>> {
        let mut ids: Vec<(u64, String)> = self
            .index
            .entries
            .iter()
            .map(|(id, entry)| (entry.offset, id.clone()))
            .collect();
        ids.sort();

        let mut documents = Vec::with_capacity(ids.len());
        for (_, id) in ids {
            documents.push(self.read_document(&id)?);
        }
        Ok(documents)
    }
}
