//! Write-ahead log.
//!
//! Logical operations are appended to `<root>/wal/wal.log` and fsynced
//! before the in-memory mutation they describe. A checkpoint marker
//! records the offset through which state is durably reflected in
//! collection files; replay starts after the last checkpoint and applies
//! the remaining entries in sequence order. Every entry is idempotent on
//! replay by construction, so a crash between append and mutation
//! converges to the same logical state on next startup.

mod manager;
mod reader;
mod record;
mod replay;

pub use manager::{Checkpoint, WalManager};
pub use reader::WalReader;
pub use record::{CreateIndexPayload, WalEntry, WalOp};
pub use replay::{replay, ReplayStats};
