//! # Store Error Types
//!
//! Error types for durable cache operations.
//!
//! Only writes surface errors. A body or index that cannot be read is a
//! cache miss, never an error (see [`crate::LocalStore::read_index`]).

use std::path::PathBuf;
use thiserror::Error;

use qconfig_core::CoreError;

/// Durable cache errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Creating the cache directory or writing a file failed.
    ///
    /// ## When This Occurs
    /// - Base directory not writable
    /// - Disk full
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The version index could not be serialized.
    #[error("Failed to serialize version index: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The item name cannot be mapped to a cache file.
    #[error(transparent)]
    InvalidName(#[from] CoreError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
