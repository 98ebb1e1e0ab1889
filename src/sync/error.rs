//! Synchronizer error types

use thiserror::Error;

use crate::source::SourceError;

/// Errors surfaced by the series synchronizer
#[derive(Error, Debug)]
pub enum SyncError {
    /// Bulk query or subscription setup failed
    #[error("Transport error: {0}")]
    Transport(#[from] SourceError),

    /// Operation attempted after teardown
    #[error("Synchronizer is closed")]
    Closed,
}

/// Result type alias for synchronizer operations
pub type SyncResult<T> = Result<T, SyncError>;
