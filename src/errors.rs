/*!
This module contains error types for modification logs and version controllers as well as `From`
implementations for common errors to enable error propagation.
*/

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Alias for a [`Result`] that wraps a [`StorageError`].
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the durability primitives.
#[derive(Debug)]
pub enum StorageError {
    /// Variant for errors stemming from file system operations.
    IO(io::Error),

    /**
    Variant for records whose encoded size exceeds the configured limit. Nothing is written to the
    backing store when this is returned.
    */
    RecordTooLarge {
        /// The encoded size of the rejected record in bytes.
        size: usize,
        /// The maximum accepted record size in bytes.
        limit: usize,
    },

    /// Variant for modifications that cannot be represented in the record format.
    InvalidRecord(String),

    /**
    Variant for a version controller that could not restore a trustworthy baseline from its
    checkpoint. The storage directory owning the controller must not come online.
    */
    Recovery(String),

    /// Variant for writes to a modification log whose backing store was deleted.
    LogRemoved(PathBuf),
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IO(base_err) => Some(base_err),
            _ => None,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::IO(base_err) => write!(f, "{}", base_err),
            StorageError::RecordTooLarge { size, limit } => write!(
                f,
                "The modification record is {size} bytes which exceeds the limit of {limit} bytes."
            ),
            StorageError::InvalidRecord(reason) => write!(f, "{}", reason),
            StorageError::Recovery(reason) => {
                write!(f, "Failed to recover the version checkpoint. {}", reason)
            }
            StorageError::LogRemoved(file_path) => write!(
                f,
                "The modification log at {:?} was removed and no longer accepts writes.",
                file_path
            ),
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::IO(err)
    }
}
