/*!
This module contains file system wrappers for disk-based file systems.
*/

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::traits::{FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile};
use super::FileLock;

impl ReadonlyRandomAccessFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl RandomAccessFile for File {
    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Seek to the end first
        self.seek(SeekFrom::End(0))?;
        self.write_all(buf)?;

        Ok(buf.len())
    }

    fn set_len(&mut self, size: u64) -> io::Result<()> {
        File::set_len(self, size)?;
        // Keep the cursor inside the file so that a following read does not start past the end
        let cursor = self.stream_position()?;
        if cursor > size {
            self.seek(SeekFrom::Start(size))?;
        }

        Ok(())
    }

    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }
}

impl UnlockableFile for File {
    fn unlock(&self) -> io::Result<()> {
        fs2::FileExt::unlock(self)
    }
}

/// Open `path` for reading and writing with the semantics of [`FileSystem::create_file`].
fn open_read_write(path: &Path, append: bool) -> io::Result<File> {
    let mut open_options = OpenOptions::new();
    open_options.create(true).write(true).read(true);

    if append {
        open_options.append(true);
    } else {
        open_options.truncate(true);
    }

    open_options.open(path)
}

/// Create the file at `path` if necessary and take an exclusive advisory lock on it.
fn lock_disk_file(path: &Path) -> io::Result<FileLock> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.try_lock_exclusive()?;

    Ok(FileLock::new(Box::new(file)))
}

/// List a directory on disk with entries sorted by path.
fn list_disk_dir(path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(path)?
        .map(|maybe_entry| maybe_entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, io::Error>>()?;
    entries.sort();
    Ok(entries)
}

/// File system implementation that delegates I/O to the operating system.
#[derive(Debug)]
pub struct OsFileSystem {}

/// Public methods.
impl OsFileSystem {
    /// Create an instance of [`OsFileSystem`].
    pub fn new() -> Self {
        OsFileSystem {}
    }
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for OsFileSystem {
    fn get_name(&self) -> String {
        "OsFileSystem".to_string()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        list_disk_dir(path)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        Ok(Box::new(File::open(path)?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        Ok(Box::new(open_read_write(path, append)?))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        lock_disk_file(path)
    }
}

/**
A file system implementation built on `tempfile` crate structures. Relative paths are resolved
against the root directory and absolute paths under the root are used as is.

Only the root directory is backed by `tempfile` to take advantage of the auto-cleanup mechanism.
File creation is not used so that control over file naming is retained.
*/
#[derive(Debug)]
pub struct TmpFileSystem {
    root_dir: TempDir,
}

/// Public methods
impl TmpFileSystem {
    /// Create a new instance of [`TmpFileSystem`] where all files are created in the provided root.
    pub fn new(root_path: Option<&Path>) -> io::Result<Self> {
        let root_dir = match root_path {
            Some(path) => TempDir::new_in(path)?,
            None => TempDir::new()?,
        };

        Ok(TmpFileSystem { root_dir })
    }

    /**
    Get the root path of this temporary file system.

    All methods will operate relatively to this root path.
    */
    pub fn get_root_path(&self) -> PathBuf {
        self.root_dir.path().to_owned()
    }
}

/// Private methods.
impl TmpFileSystem {
    /// Get a path rooted by the root path of this file system.
    fn get_rooted_path(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(self.root_dir.path()) {
            Ok(relative_path) => self.root_dir.path().join(relative_path),
            // Joining an absolute path would replace the root
            Err(_) => self
                .root_dir
                .path()
                .join(path.strip_prefix("/").unwrap_or(path)),
        }
    }
}

impl FileSystem for TmpFileSystem {
    fn get_name(&self) -> String {
        "TmpFileSystem".to_string()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.get_rooted_path(path))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        list_disk_dir(&self.get_rooted_path(path))
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        Ok(Box::new(File::open(self.get_rooted_path(path))?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.get_rooted_path(from), self.get_rooted_path(to))
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        Ok(Box::new(open_read_write(
            &self.get_rooted_path(path),
            append,
        )?))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.get_rooted_path(path))
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(self.get_rooted_path(path))?.len())
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        lock_disk_file(&self.get_rooted_path(path))
    }
}
