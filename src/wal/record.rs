//! WAL record types and wire format.
//!
//! Each record is length-prefixed and checksummed:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, includes this field)
//! +------------------+
//! | Operation        | (u8)
//! +------------------+
//! | Sequence Number  | (u64 LE)
//! +------------------+
//! | Database Name    | (length-prefixed string)
//! +------------------+
//! | Collection Name  | (length-prefixed string, may be empty)
//! +------------------+
//! | Document ID      | (length-prefixed string, may be empty)
//! +------------------+
//! | Payload          | (length-prefixed bytes, may be empty)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! The checksum covers all bytes except itself. Payloads are JSON: the
//! full document for insert/update, the schema for create_collection,
//! and an index descriptor for create_index.

use std::io::{self, Cursor, Read};

use serde::{Deserialize, Serialize};

use crate::storage::compute_checksum;

/// Logical operation kinds recorded in the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// Database created
    CreateDatabase = 0,
    /// Database dropped
    DeleteDatabase = 1,
    /// Collection created (payload: schema, when present)
    CreateCollection = 2,
    /// Index created (payload: index descriptor)
    CreateIndex = 3,
    /// Document inserted (payload: full document)
    Insert = 4,
    /// Document updated (payload: full post-update document)
    Update = 5,
    /// Document deleted
    Delete = 6,
}

impl WalOp {
    /// Converts from the wire byte; `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WalOp::CreateDatabase),
            1 => Some(WalOp::DeleteDatabase),
            2 => Some(WalOp::CreateCollection),
            3 => Some(WalOp::CreateIndex),
            4 => Some(WalOp::Insert),
            5 => Some(WalOp::Update),
            6 => Some(WalOp::Delete),
            _ => None,
        }
    }

    /// Converts to the wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Payload of a create_index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexPayload {
    /// Name for the new index
    pub index_name: String,
    /// Field the index covers
    pub field_name: String,
}

/// One logical operation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Monotonic sequence number, assigned at append time
    pub sequence: u64,
    /// Operation kind
    pub op: WalOp,
    /// Target database
    pub database: String,
    /// Target collection, absent for database-level operations
    pub collection: Option<String>,
    /// Target document, present for document operations
    pub document_id: Option<String>,
    /// JSON payload, present where the operation carries state
    pub payload: Option<Vec<u8>>,
}

/// Minimum bytes a record can occupy: length + op + sequence + four
/// empty length-prefixed fields + checksum.
pub(crate) const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 4 * 4 + 4;

impl WalEntry {
    /// Creates an entry targeting a database. The sequence number is
    /// assigned when the entry is appended.
    pub fn new(op: WalOp, database: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            op,
            database: database.into(),
            collection: None,
            document_id: None,
            payload: None,
        }
    }

    /// Sets the target collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the target document id.
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    /// Attaches a JSON payload.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Serializes the record body: everything between the length prefix
    /// and the checksum.
    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.op.as_u8());
        buf.extend_from_slice(&self.sequence.to_le_bytes());

        write_lp_bytes(&mut buf, self.database.as_bytes());
        write_lp_bytes(
            &mut buf,
            self.collection.as_deref().unwrap_or_default().as_bytes(),
        );
        write_lp_bytes(
            &mut buf,
            self.document_id.as_deref().unwrap_or_default().as_bytes(),
        );
        write_lp_bytes(&mut buf, self.payload.as_deref().unwrap_or_default());

        buf
    }

    /// Serializes the complete record: length prefix, body, checksum.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        let mut checksum_data = Vec::with_capacity(4 + body.len());
        checksum_data.extend_from_slice(&record_length.to_le_bytes());
        checksum_data.extend_from_slice(&body);
        let checksum = compute_checksum(&checksum_data);

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Deserializes a record, verifying length and checksum. Returns the
    /// entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[0..checksum_offset]);
        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let op_byte = data[4];
        let op = WalOp::from_u8(op_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid operation: {}", op_byte),
            )
        })?;

        let sequence = u64::from_le_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);

        let mut cursor = Cursor::new(&data[13..checksum_offset]);
        let database = read_lp_string(&mut cursor)?;
        let collection = read_lp_string(&mut cursor)?;
        let document_id = read_lp_string(&mut cursor)?;
        let payload = read_lp_bytes(&mut cursor)?;

        Ok((
            Self {
                sequence,
                op,
                database,
                collection: (!collection.is_empty()).then_some(collection),
                document_id: (!document_id.is_empty()).then_some(document_id),
                payload: (!payload.is_empty()).then_some(payload),
            },
            record_length,
        ))
    }
}

fn write_lp_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_lp_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_lp_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_lp_bytes(reader)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {}", e)))
}
