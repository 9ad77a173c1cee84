//! On-disk persistence: the binary collection format and the storage
//! manager.
//!
//! Layout rooted at the storage manager's directory:
//!
//! ```text
//! <root>/
//!   wal/                              WAL and checkpoint marker
//!   <db_name>/
//!     db.meta.json                    {"name": ...}
//!     <coll_name>/
//!       collection.meta.json          name, schema, indexes, format
//!       collection.data               binary records (format = "binary")
//!       collection.idx                offset index sidecar
//!       documents.json                legacy JSON (format = "json")
//!       indexes/<index_name>.json     per-index snapshots
//! ```

mod checksum;
mod manager;
mod offset_index;
mod reader;
mod record;
mod writer;

pub use checksum::compute_checksum;
pub use manager::{StorageFormat, StorageManager};
pub use offset_index::OffsetIndex;
pub use reader::BinaryCollectionReader;
pub use record::{
    BinaryHeader, RecordEntry, COLLECTION_MAGIC, FLAG_COMPRESSED, FORMAT_VERSION, HEADER_SIZE,
    RECORD_HEADER_SIZE,
};
pub use writer::BinaryCollectionWriter;

use std::path::{Path, PathBuf};

/// Path of a collection's directory.
pub(crate) fn collection_dir(root: &Path, db_name: &str, coll_name: &str) -> PathBuf {
    root.join(db_name).join(coll_name)
}

/// Path of a collection's binary data file.
pub(crate) fn data_path(root: &Path, db_name: &str, coll_name: &str) -> PathBuf {
    collection_dir(root, db_name, coll_name).join("collection.data")
}

/// Path of a collection's offset index sidecar.
pub(crate) fn idx_path(root: &Path, db_name: &str, coll_name: &str) -> PathBuf {
    collection_dir(root, db_name, coll_name).join("collection.idx")
}
