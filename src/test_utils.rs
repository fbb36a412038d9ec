/*!
Utilities shared by unit tests.
*/

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::fs::{
    FileLock, FileSystem, InMemoryFileSystem, RandomAccessFile, ReadonlyRandomAccessFile,
};
use crate::StorageOptions;

/// Install a logger that captures every event for `cargo test`.
pub(crate) fn setup() {
    let _ = env_logger::builder()
        // Include all events in tests
        .filter_level(log::LevelFilter::max())
        // Ensure events are captured by `cargo test`
        .is_test(true)
        // Ignore errors initializing the logger if tests race to configure it
        .try_init();
}

fn injected_failure(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("Injected failure while attempting to {operation}."),
    )
}

/// Switches that make operations of a [`FaultyFileSystem`] fail.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Appends write half of the buffer and then fail.
    pub(crate) fail_appends: AtomicBool,

    /// Truncating a file fails.
    pub(crate) fail_truncates: AtomicBool,

    /// Syncing a file to storage fails.
    pub(crate) fail_syncs: AtomicBool,

    /// Renaming a file fails.
    pub(crate) fail_renames: AtomicBool,

    /// Creating or opening a file for writing fails.
    pub(crate) fail_creates: AtomicBool,
}

impl Faults {
    pub(crate) fn set(flag: &AtomicBool, should_fail: bool) {
        flag.store(should_fail, Ordering::SeqCst);
    }

    fn is_set(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

/// An [`InMemoryFileSystem`] whose operations can be made to fail on demand.
pub(crate) struct FaultyFileSystem {
    inner: InMemoryFileSystem,
    faults: Arc<Faults>,
}

impl FaultyFileSystem {
    /// Create a file system and the switches controlling it.
    pub(crate) fn new() -> (Arc<FaultyFileSystem>, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let fs = Arc::new(FaultyFileSystem {
            inner: InMemoryFileSystem::new(),
            faults: Arc::clone(&faults),
        });

        (fs, faults)
    }

    /// Create options backed by a new faulty file system.
    pub(crate) fn options() -> (StorageOptions, Arc<Faults>) {
        let (fs, faults) = FaultyFileSystem::new();
        let options = StorageOptions {
            filesystem_provider: fs,
            ..StorageOptions::default()
        };

        (options, faults)
    }
}

impl FileSystem for FaultyFileSystem {
    fn get_name(&self) -> String {
        "FaultyFileSystem".to_string()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_dir(path)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        self.inner.open_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if Faults::is_set(&self.faults.fail_renames) {
            return Err(injected_failure("rename a file"));
        }

        self.inner.rename(from, to)
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        if Faults::is_set(&self.faults.fail_creates) {
            return Err(injected_failure("create a file"));
        }

        Ok(Box::new(FaultyFile {
            inner: self.inner.create_file(path, append)?,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path)
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        self.inner.get_file_size(path)
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        self.inner.lock_file(path)
    }
}

/// A writable file of a [`FaultyFileSystem`].
struct FaultyFile {
    inner: Box<dyn RandomAccessFile>,
    faults: Arc<Faults>,
}

impl Read for FaultyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for FaultyFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Write for FaultyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ReadonlyRandomAccessFile for FaultyFile {
    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }
}

impl RandomAccessFile for FaultyFile {
    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        if Faults::is_set(&self.faults.fail_appends) {
            // Leave a torn record behind like a crash in the middle of a write would
            self.inner.append(&buf[..buf.len() / 2])?;
            return Err(injected_failure("append to a file"));
        }

        self.inner.append(buf)
    }

    fn set_len(&mut self, size: u64) -> io::Result<()> {
        if Faults::is_set(&self.faults.fail_truncates) {
            return Err(injected_failure("truncate a file"));
        }

        self.inner.set_len(size)
    }

    fn sync_all(&self) -> io::Result<()> {
        if Faults::is_set(&self.faults.fail_syncs) {
            return Err(injected_failure("sync a file"));
        }

        self.inner.sync_all()
    }
}

/// Read the whole file at `path`.
pub(crate) fn read_file(fs: &dyn FileSystem, path: &Path) -> Vec<u8> {
    let mut buf = vec![];
    fs.open_file(path).unwrap().read_to_end(&mut buf).unwrap();

    buf
}

/// Replace the contents of the file at `path` with `contents`.
pub(crate) fn write_file(fs: &dyn FileSystem, path: &Path, contents: &[u8]) {
    let mut file = fs.create_file(path, false).unwrap();
    file.append(contents).unwrap();
}
