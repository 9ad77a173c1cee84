//! Sequential WAL reader.
//!
//! Records are read in file order with checksum validation and strict
//! sequence-number ascension. A malformed record whose extent reaches the
//! end of the file is treated as a torn write and discarded; a malformed
//! record with valid data after it is fatal.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::warn;

use crate::error::{DbError, DbResult};

use super::record::{WalEntry, MIN_RECORD_SIZE};

/// Reads WAL entries in order from `wal.log`.
pub struct WalReader {
    reader: BufReader<File>,
    offset: u64,
    file_size: u64,
    last_sequence: u64,
}

impl WalReader {
    /// Opens a WAL file for sequential reading.
    pub fn open(path: &Path) -> DbResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
            file_size,
            last_sequence: 0,
        })
    }

    /// Positions the reader at a byte offset, normally a checkpoint
    /// offset. An offset beyond the end of the file means the checkpoint
    /// and the log disagree.
    pub fn seek_to(&mut self, offset: u64) -> DbResult<()> {
        if offset > self.file_size {
            return Err(DbError::WalCorruption {
                offset,
                reason: format!(
                    "checkpoint offset beyond end of WAL ({} bytes)",
                    self.file_size
                ),
            });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Byte offset of the next unread record; after reading stops, the
    /// end of the valid prefix.
    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    /// Sequence number of the last record read, 0 before any.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` at a clean end of file and when the trailing
    /// bytes are a torn record; the reader's offset then marks the end of
    /// the valid prefix. Malformed records before the tail are fatal.
    pub fn read_next(&mut self) -> DbResult<Option<WalEntry>> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            warn!(
                offset = self.offset,
                remaining, "discarding torn record at WAL tail"
            );
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 {
            return Err(DbError::WalCorruption {
                offset: self.offset,
                reason: format!("invalid record length {}", record_length),
            });
        }
        if record_length > remaining {
            warn!(
                offset = self.offset,
                record_length, remaining, "discarding torn record at WAL tail"
            );
            return Ok(None);
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..])?;

        let (entry, _) = match WalEntry::deserialize(&record_buf) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A bad record that runs exactly to EOF is a torn write.
                if self.offset + record_length == self.file_size {
                    warn!(offset = self.offset, error = %e, "discarding torn record at WAL tail");
                    return Ok(None);
                }
                return Err(DbError::WalCorruption {
                    offset: self.offset,
                    reason: e.to_string(),
                });
            }
        };

        if entry.sequence <= self.last_sequence {
            return Err(DbError::WalCorruption {
                offset: self.offset,
                reason: format!(
                    "sequence {} not ascending (last was {})",
                    entry.sequence, self.last_sequence
                ),
            });
        }

        self.offset += record_length;
        self.last_sequence = entry.sequence;
        Ok(Some(entry))
    }

    /// Reads every remaining entry.
    pub fn read_remaining(&mut self) -> DbResult<Vec<WalEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
