/*!
This module holds the options that are passed when opening modification logs and version
controllers.
*/

use std::sync::Arc;

use crate::config::MAX_RECORD_SIZE_BYTES;
use crate::fs::{FileSystem, InMemoryFileSystem, OsFileSystem};

/// Holds options that control how modification logs and version controllers perform I/O.
#[derive(Clone, Debug)]
pub struct StorageOptions {
    /**
    A wrapper around a particular file system to use.

    **This defaults to [`OsFileSystem`](crate::fs::OsFileSystem).**
    */
    pub filesystem_provider: Arc<dyn FileSystem>,

    /**
    The maximum size in bytes of one encoded modification record.

    **This defaults to 64 KiB.**
    */
    pub max_record_size: usize,
}

/// Public methods
impl StorageOptions {
    /// Create options that use an in-memory file system. This is mainly useful for tests.
    pub fn with_memory_env() -> Self {
        StorageOptions {
            filesystem_provider: Arc::new(InMemoryFileSystem::new()),
            ..StorageOptions::default()
        }
    }

    /// Get a strong reference to the file system provider.
    pub fn filesystem_provider(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.filesystem_provider)
    }

    /// Get the maximum encoded record size.
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            filesystem_provider: Arc::new(OsFileSystem::new()),
            max_record_size: MAX_RECORD_SIZE_BYTES,
        }
    }
}
