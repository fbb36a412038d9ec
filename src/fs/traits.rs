use core::fmt::Debug;
use std::io::{Read, Result, Seek, Write};
use std::path::{Path, PathBuf};

/**
Supertrait that wraps a source of binary content that is readonly.

Modification stores are always read front to back so only sequential reads are required.
*/
pub trait ReadonlyRandomAccessFile: Read + Seek + Send + Sync {
    /// Get the length of the file.
    fn len(&self) -> Result<u64>;

    /// Return true if the file is empty. Otherwise, false.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/**
Supertrait that wraps a source of binary content that is readable and writable and can be grown
and shrunk.
*/
pub trait RandomAccessFile: ReadonlyRandomAccessFile + Write {
    /// Append the buffer `buf` to the end of this writer.
    fn append(&mut self, buf: &[u8]) -> Result<usize>;

    /**
    Truncate or extend the file to `size` bytes.

    This corresponds to [`std::fs::File::set_len`] for disk-based implementations.
    */
    fn set_len(&mut self, size: u64) -> Result<()>;

    /**
    Force all written data and metadata to reach the underlying storage medium.

    This corresponds to [`std::fs::File::sync_all`] for disk-based implementations.
    */
    fn sync_all(&self) -> Result<()>;
}

/// An interface for common file system operations.
pub trait FileSystem: Send + Sync {
    /// Return the name of file system wrapper being used.
    fn get_name(&self) -> String;

    /// Recursively create a directory and all of its parent components if they are missing.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// List the contents of the given `path`.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file in read-only mode.
    fn open_file(&self, path: &Path) -> Result<Box<dyn ReadonlyRandomAccessFile>>;

    /**
    Rename a file. It will attempt to replace a file if it already exists at the destination
    name.

    This corresponds to the [`std::fs::rename`] function when used for disk-based implementations.
    It has the same caveats for platform-specific behavior.
    */
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /**
    Open a file in read/write mode.

    This function will create the file if it doesn't exist. Setting the `append` parameter to true
    will start appending to an existing file, otherwise an existing file is truncated to length 0.
    */
    fn create_file(&self, path: &Path, append: bool) -> Result<Box<dyn RandomAccessFile>>;

    /// Remove a file from the filesystem.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Get the size of the file at the specified path.
    fn get_file_size(&self, path: &Path) -> Result<u64>;

    /**
    Place an exclusive lock on the file at the specified path. The file is created if it does not
    exist.

    This lock can only be relied on to be advisory. For POSIX, an `flock()` is used.
    */
    fn lock_file(&self, path: &Path) -> Result<FileLock>;
}

impl Debug for dyn FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

/**
An opaque handle for locked files.

The underlying file will be unlocked when the handle is dropped.
*/
pub struct FileLock {
    inner: Box<dyn UnlockableFile>,
}

impl FileLock {
    /// Create a new instance of [`FileLock`].
    pub fn new(file: Box<dyn UnlockableFile>) -> Self {
        Self { inner: file }
    }
}

impl Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock").finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(unlock_error) = self.inner.unlock() {
            log::error!(
                "There was an error trying to release a directory lock. Error: {error}",
                error = unlock_error
            );
        }
    }
}

/// A file that can be unlocked.
pub trait UnlockableFile: Send + Sync {
    /// Unlock the file.
    fn unlock(&self) -> Result<()>;
}
