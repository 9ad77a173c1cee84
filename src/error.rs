//! Unified error type for the storage engine.
//!
//! Every failure carries the offending name or id so the request surface
//! can build a structured response without re-parsing messages. `kind()`
//! collapses the concrete variants into the coarse categories callers
//! dispatch on.

use std::io;

use thiserror::Error;

/// Result type used throughout the engine.
pub type DbResult<T> = Result<T, DbError>;

/// Coarse error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing database, collection, document, or index
    NotFound,
    /// Duplicate name or id
    AlreadyExists,
    /// Schema definition or document validation failure
    SchemaViolation,
    /// Empty name, reserved field, malformed query
    InvalidArgument,
    /// Magic/version mismatch, CRC mismatch, malformed WAL record
    Integrity,
    /// Underlying filesystem failure
    Io,
    /// Unrecoverable on-disk inconsistency
    Corruption,
    /// Operation cancelled via its token
    Cancelled,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database '{0}' does not exist")]
    DatabaseNotFound(String),

    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("document with ID '{0}' not found")]
    DocumentNotFound(String),

    #[error("index '{0}' does not exist")]
    IndexNotFound(String),

    #[error("database '{0}' already exists")]
    DatabaseExists(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("document with ID '{0}' already exists")]
    DocumentExists(String),

    #[error("index '{0}' already exists")]
    IndexExists(String),

    #[error("required field '{0}' is missing")]
    MissingRequiredField(String),

    #[error("field '{field}' has invalid type, expected {expected}")]
    InvalidFieldType {
        /// Offending field name
        field: String,
        /// Declared schema type
        expected: &'static str,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("{0} name cannot be empty")]
    EmptyName(&'static str),

    #[error("field name '_id' is reserved")]
    ReservedFieldName,

    #[error("cannot update the _id field")]
    CannotUpdateId,

    #[error("cannot drop the automatic _id index")]
    CannotDropIdIndex,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid magic number: expected {expected:#010x}, got {found:#010x}")]
    BadMagic {
        /// Expected magic constant
        expected: u32,
        /// Magic found in the file
        found: u32,
    },

    #[error("unsupported format version: expected {expected}, got {found}")]
    BadVersion {
        /// Supported version
        expected: u16,
        /// Version found in the file
        found: u16,
    },

    #[error("checksum mismatch for document '{document_id}': computed {computed:#010x}, stored {stored:#010x}")]
    ChecksumMismatch {
        /// Document whose record failed verification
        document_id: String,
        /// CRC32 computed over the stored payload
        computed: u32,
        /// CRC32 recorded in the offset index
        stored: u32,
    },

    #[error("WAL corruption at offset {offset}: {reason}")]
    WalCorruption {
        /// Byte offset of the malformed record
        offset: u64,
        /// What failed to validate
        reason: String,
    },

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl DbError {
    /// Returns the coarse category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::DatabaseNotFound(_)
            | DbError::CollectionNotFound(_)
            | DbError::DocumentNotFound(_)
            | DbError::IndexNotFound(_) => ErrorKind::NotFound,

            DbError::DatabaseExists(_)
            | DbError::CollectionExists(_)
            | DbError::DocumentExists(_)
            | DbError::IndexExists(_) => ErrorKind::AlreadyExists,

            DbError::MissingRequiredField(_)
            | DbError::InvalidFieldType { .. }
            | DbError::InvalidSchema(_) => ErrorKind::SchemaViolation,

            DbError::EmptyName(_)
            | DbError::ReservedFieldName
            | DbError::CannotUpdateId
            | DbError::CannotDropIdIndex
            | DbError::InvalidQuery(_) => ErrorKind::InvalidArgument,

            DbError::BadMagic { .. }
            | DbError::BadVersion { .. }
            | DbError::ChecksumMismatch { .. }
            | DbError::WalCorruption { .. } => ErrorKind::Integrity,

            DbError::Corruption(_) => ErrorKind::Corruption,
            DbError::Io(_) => ErrorKind::Io,
            DbError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for errors that indicate on-disk damage rather than caller mistakes.
    pub fn is_integrity(&self) -> bool {
        matches!(self.kind(), ErrorKind::Integrity | ErrorKind::Corruption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_categories() {
        assert_eq!(
            DbError::DocumentNotFound("d1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DbError::CollectionExists("users".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            DbError::MissingRequiredField("email".into()).kind(),
            ErrorKind::SchemaViolation
        );
        assert_eq!(DbError::CannotDropIdIndex.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            DbError::ChecksumMismatch {
                document_id: "d1".into(),
                computed: 1,
                stored: 2
            }
            .kind(),
            ErrorKind::Integrity
        );
        assert_eq!(DbError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn display_carries_offending_name() {
        let err = DbError::CollectionNotFound("users".into());
        assert!(err.to_string().contains("users"));

        let err = DbError::MissingRequiredField("email".into());
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn integrity_errors_flagged() {
        assert!(DbError::BadMagic {
            expected: 0x43414348,
            found: 0
        }
        .is_integrity());
        assert!(DbError::Corruption("bad".into()).is_integrity());
        assert!(!DbError::DocumentNotFound("d1".into()).is_integrity());
    }
}
