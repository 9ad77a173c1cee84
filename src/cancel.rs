//! Cooperative per-operation cancellation.
//!
//! A `CancelToken` is cloned into an operation at the API boundary and
//! checked before the collection lock is acquired and before each I/O call
//! is initiated. In-flight writes are never interrupted; a cancellation
//! observed after a WAL append but before the in-memory mutation surfaces
//! as `DbError::Cancelled`, and replay reconciles state on next startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DbError, DbResult};

/// Shared cancellation flag for a single logical operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(DbError::Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> DbResult<()> {
        if self.is_cancelled() {
            Err(DbError::Cancelled)
        } else {
            Ok(())
        }
    }
}
