use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{StorageError, StorageResult};
use crate::file_names::get_modification_file_path;
use crate::StorageOptions;

use super::accessor::{ModificationAccessor, TextModificationAccessor};
use super::model::Modification;

/**
The modifications recorded against one data file.

The modifications are kept in memory after the first access and every change is written to the
backing store before it is applied in memory, so the cached sequence never contains an entry that
is not durable.

# Concurrency

All operations, including the lazy load, run under one lock per log. Operations against different
data files never contend.
*/
pub struct ModificationLog {
    /// The path of the backing store.
    file_path: PathBuf,

    /// State guarded by the log's lock.
    inner: Mutex<LogState>,
}

struct LogState {
    /// Reader and writer of the backing store.
    accessor: Box<dyn ModificationAccessor>,

    /**
    The cached modifications in store order.

    This is `None` until the store is first read and again after the log is closed.
    */
    modifications: Option<Vec<Modification>>,

    /// Set once the backing store is deleted. A removed log never recreates its store.
    removed: bool,
}

/// Public methods
impl ModificationLog {
    /**
    Create the log of the data file at `data_file_path`.

    The backing store lives next to the data file. Nothing is read or created until the log is
    first used.
    */
    pub fn new<P: AsRef<Path>>(options: &StorageOptions, data_file_path: P) -> Self {
        let file_path = get_modification_file_path(data_file_path);
        let accessor = TextModificationAccessor::new(options, &file_path);

        ModificationLog::with_accessor(file_path, Box::new(accessor))
    }

    /// Create a log that stores its modifications through `accessor`.
    pub fn with_accessor<P: AsRef<Path>>(
        file_path: P,
        accessor: Box<dyn ModificationAccessor>,
    ) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            inner: Mutex::new(LogState {
                accessor,
                modifications: None,
                removed: false,
            }),
        }
    }

    /// Get the path of the backing store.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /**
    Durably record `modification`.

    If writing to the backing store fails the error is returned and the log is unchanged. Returns
    [`StorageError::LogRemoved`] if the log was removed.
    */
    pub fn append(&self, modification: Modification) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if state.removed {
            return Err(StorageError::LogRemoved(self.file_path.clone()));
        }

        state.load_if_needed()?;
        state.accessor.write(&modification)?;
        if let Some(modifications) = state.modifications.as_mut() {
            modifications.push(modification);
        }

        Ok(())
    }

    /// Get a copy of all modifications in the order they were recorded. A removed log is empty.
    pub fn list(&self) -> StorageResult<Vec<Modification>> {
        let mut state = self.inner.lock();
        if state.removed {
            return Ok(vec![]);
        }

        Ok(state.load_if_needed()?.clone())
    }

    /**
    Take back the most recently recorded modification.

    This is used to roll back a delete that failed at a later stage. It is a no-op if the log is
    empty.
    */
    pub fn discard_last(&self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if state.removed {
            return Err(StorageError::LogRemoved(self.file_path.clone()));
        }

        if state.load_if_needed()?.is_empty() {
            return Ok(());
        }

        state.accessor.abort()?;
        if let Some(modifications) = state.modifications.as_mut() {
            modifications.pop();
        }

        Ok(())
    }

    /**
    Release the backing store and drop the cached modifications.

    The log stays usable. The next operation reloads it from the backing store.
    */
    pub fn close(&self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.modifications = None;
        state.accessor.close()
    }

    /**
    Release the backing store and delete it. Used when the data file itself is deleted.

    The log is retired afterwards. It lists as empty and rejects appends and discards, including
    those made through handles obtained before the removal.
    */
    pub fn remove(&self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.modifications = None;
        state.removed = true;
        state.accessor.remove()
    }
}

/// Private methods
impl LogState {
    /// Read the backing store if the modifications are not cached yet.
    fn load_if_needed(&mut self) -> StorageResult<&mut Vec<Modification>> {
        let modifications = match self.modifications.take() {
            Some(modifications) => modifications,
            None => self.accessor.read()?,
        };

        Ok(self.modifications.insert(modifications))
    }
}

impl fmt::Debug for ModificationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModificationLog")
            .field("file_path", &self.file_path)
            .finish()
    }
}

/**
Record `modification` in every log of `logs`, all or nothing.

Logs are written in order. If one of them fails, the modification is discarded from every log
written before it and the original error is returned.

# Concurrency

Rolling back removes the last entry of a log. Callers must make sure no other modification is
appended to the same logs while this runs, e.g. by serializing deletes per storage directory.
*/
pub fn append_to_all(
    logs: &[Arc<ModificationLog>],
    modification: &Modification,
) -> StorageResult<()> {
    for (num_written, modification_log) in logs.iter().enumerate() {
        if let Err(append_err) = modification_log.append(modification.clone()) {
            log::error!(
                "Failed to record a modification in {:?}. Rolling back {} logs. Error: {}",
                modification_log.file_path(),
                num_written,
                append_err
            );

            for written_log in logs[..num_written].iter().rev() {
                if let Err(rollback_err) = written_log.discard_last() {
                    log::error!(
                        "Failed to roll back the modification recorded in {:?}. Error: {}",
                        written_log.file_path(),
                        rollback_err
                    );
                }
            }

            return Err(append_err);
        }
    }

    Ok(())
}
