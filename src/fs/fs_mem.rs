/*!
This module contains a wrapper for an in-memory file system implementation.
*/

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::traits::{FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile};
use super::FileLock;

/// File system implementation that is backed by memory.
#[derive(Default)]
pub struct InMemoryFileSystem {
    /**
    The files on the file system.

    Directories have no concrete representation. They exist implicitly through the paths of the
    files beneath them.
    */
    files: Arc<RwLock<HashMap<PathBuf, SharedContents>>>,

    /// Paths of the files that are currently locked.
    held_locks: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InMemoryFileSystem {
    /// Create a new instance of the in-memory file system.
    pub fn new() -> Self {
        InMemoryFileSystem {
            files: Arc::new(RwLock::new(HashMap::new())),
            held_locks: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

/// Private methods.
impl InMemoryFileSystem {
    /// Get a new handle to the contents of the file at `path`.
    fn open_mem_file(&self, path: &Path) -> io::Result<InMemoryFile> {
        let files = self.files.read();
        match files.get(path) {
            Some(contents) => Ok(InMemoryFile::new(Arc::clone(contents))),
            None => Err(not_found(path)),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    let error_message = format!(
        "Could not find the file with path {path}",
        path = path.to_string_lossy()
    );
    io::Error::new(io::ErrorKind::NotFound, error_message)
}

impl FileSystem for InMemoryFileSystem {
    fn get_name(&self) -> String {
        "InMemoryFileSystem".to_string()
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read();
        let mut children: HashSet<PathBuf> = HashSet::new();
        for file_path in files.keys() {
            let relative_path = match file_path.strip_prefix(path) {
                Ok(relative_path) => relative_path,
                Err(_) => continue,
            };

            // Only report direct children. Deeper files show up as their top-level directory.
            if let Some(first_component) = relative_path.components().next() {
                children.insert(path.join(first_component));
            }
        }

        let mut results: Vec<PathBuf> = children.into_iter().collect();
        results.sort();

        Ok(results)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        Ok(Box::new(self.open_mem_file(path)?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files.write();
        match files.remove(from) {
            Some(contents) => {
                files.insert(to.to_path_buf(), contents);
                Ok(())
            }
            None => Err(not_found(from)),
        }
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        let mut files = self.files.write();
        let contents = files
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(vec![])));

        let mut file = InMemoryFile::new(Arc::clone(contents));
        if append {
            file.cursor = file.contents.read().len() as u64;
        } else {
            file.contents.write().clear();
        }

        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.write();
        match files.remove(path) {
            Some(_removed_file) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        self.open_mem_file(path)?.len()
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        let mut held_locks = self.held_locks.lock();
        if held_locks.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "The file with path {path} is already locked",
                    path = path.to_string_lossy()
                ),
            ));
        }

        self.files
            .write()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(vec![])));
        held_locks.insert(path.to_path_buf());

        Ok(FileLock::new(Box::new(InMemoryLock {
            path: path.to_path_buf(),
            held_locks: Arc::clone(&self.held_locks),
        })))
    }
}

/// The bytes of a file shared between all open handles to it.
type SharedContents = Arc<RwLock<Vec<u8>>>;

/// A handle to a file in the in-memory file system. Each handle keeps its own cursor.
struct InMemoryFile {
    /// The contents of the file.
    contents: SharedContents,

    /// The current position of this handle in the file.
    cursor: u64,
}

impl InMemoryFile {
    /// Create a handle positioned at the start of the file.
    fn new(contents: SharedContents) -> Self {
        Self {
            contents,
            cursor: 0,
        }
    }
}

impl Read for InMemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let contents = self.contents.read();
        let start = (self.cursor as usize).min(contents.len());
        let num_bytes_to_read = buf.len().min(contents.len() - start);
        buf[..num_bytes_to_read].copy_from_slice(&contents[start..start + num_bytes_to_read]);
        self.cursor = (start + num_bytes_to_read) as u64;

        Ok(num_bytes_to_read)
    }
}

impl Write for InMemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut contents = self.contents.write();
        let start = self.cursor as usize;
        if start > contents.len() {
            contents.resize(start, 0);
        }

        let overlap = buf.len().min(contents.len() - start);
        contents[start..start + overlap].copy_from_slice(&buf[..overlap]);
        contents.extend_from_slice(&buf[overlap..]);
        self.cursor += buf.len() as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for InMemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.contents.read().len() as i128;
        let new_position = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => self.cursor as i128 + offset as i128,
            SeekFrom::End(offset) => len + offset as i128,
        };

        if new_position < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cannot seek to a negative position ({new_position})."),
            ));
        }

        self.cursor = new_position as u64;
        Ok(self.cursor)
    }
}

impl ReadonlyRandomAccessFile for InMemoryFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.contents.read().len() as u64)
    }
}

impl RandomAccessFile for InMemoryFile {
    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut contents = self.contents.write();
        contents.extend_from_slice(buf);
        self.cursor = contents.len() as u64;

        Ok(buf.len())
    }

    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.contents.write().resize(size as usize, 0);
        self.cursor = self.cursor.min(size);

        Ok(())
    }

    fn sync_all(&self) -> io::Result<()> {
        Ok(())
    }
}

/// An exclusive lock on a file of the in-memory file system.
struct InMemoryLock {
    /// The locked path.
    path: PathBuf,

    /// The lock table of the file system that handed out this lock.
    held_locks: Arc<Mutex<HashSet<PathBuf>>>,
}

impl UnlockableFile for InMemoryLock {
    fn unlock(&self) -> io::Result<()> {
        self.held_locks.lock().remove(&self.path);
        Ok(())
    }
}
