/*!
This module provides a thread-safe registry of modification logs.
*/

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::StorageResult;
use crate::StorageOptions;

use super::modification_log::ModificationLog;

/**
Hands out one shared [`ModificationLog`] per data file.

Every component touching the tombstones of a data file has to go through the same log instance so
that its lock serializes all access to the backing store.
*/
pub struct ModificationLogRegistry {
    /// Options used when creating new logs.
    options: StorageOptions,

    /// Open logs keyed by the path of the data file they belong to.
    logs: RwLock<HashMap<PathBuf, Arc<ModificationLog>>>,
}

/// Public methods
impl ModificationLogRegistry {
    /// Create a new instance of a [`ModificationLogRegistry`].
    pub fn new(options: StorageOptions) -> Self {
        Self {
            options,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Get the log of the data file at `data_file_path`, creating it if necessary.
    pub fn get_or_create<P: AsRef<Path>>(&self, data_file_path: P) -> Arc<ModificationLog> {
        let data_file_path = data_file_path.as_ref();
        if let Some(modification_log) = self.logs.read().get(data_file_path) {
            return Arc::clone(modification_log);
        }

        let mut logs = self.logs.write();
        let modification_log = logs
            .entry(data_file_path.to_path_buf())
            .or_insert_with(|| {
                log::debug!("Creating the modification log for {:?}", data_file_path);
                Arc::new(ModificationLog::new(&self.options, data_file_path))
            });

        Arc::clone(modification_log)
    }

    /// Get the log of the data file at `data_file_path` if one was created.
    pub fn get<P: AsRef<Path>>(&self, data_file_path: P) -> Option<Arc<ModificationLog>> {
        self.logs.read().get(data_file_path.as_ref()).cloned()
    }

    /**
    Close and forget the log of a data file that is no longer served, e.g. on shutdown. The backing
    store is kept.

    Handles obtained before the release stay usable and reopen the store on their next operation.
    Later calls to [`ModificationLogRegistry::get_or_create`] hand out a new log, so callers must
    drop old handles first to keep all access to the store under one lock.
    */
    pub fn release<P: AsRef<Path>>(&self, data_file_path: P) -> StorageResult<()> {
        let maybe_log = self.logs.write().remove(data_file_path.as_ref());
        match maybe_log {
            Some(modification_log) => modification_log.close(),
            None => Ok(()),
        }
    }

    /**
    Forget the log of a data file that was deleted, e.g. after a merge made it obsolete, and delete
    its backing store.

    Handles obtained before the removal are retired and reject further writes. See
    [`ModificationLog::remove`].
    */
    pub fn remove<P: AsRef<Path>>(&self, data_file_path: P) -> StorageResult<()> {
        let data_file_path = data_file_path.as_ref();
        let maybe_log = self.logs.write().remove(data_file_path);
        match maybe_log {
            Some(modification_log) => modification_log.remove(),
            None => ModificationLog::new(&self.options, data_file_path).remove(),
        }
    }

    /**
    Close every open log.

    All logs are closed even if some fail. The first error encountered is returned.
    */
    pub fn close_all(&self) -> StorageResult<()> {
        let logs: Vec<Arc<ModificationLog>> = self.logs.write().drain().map(|(_, l)| l).collect();
        log::info!("Closing {} modification logs.", logs.len());

        let mut first_error = None;
        for modification_log in logs {
            if let Err(close_err) = modification_log.close() {
                log::error!(
                    "Failed to close the modification log at {:?}. Error: {}",
                    modification_log.file_path(),
                    close_err
                );
                first_error.get_or_insert(close_err);
            }
        }

        match first_error {
            Some(close_err) => Err(close_err),
            None => Ok(()),
        }
    }

    /// The number of open logs.
    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    /// Returns true if no log is open.
    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }
}

impl fmt::Debug for ModificationLogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModificationLogRegistry")
            .field("options", &self.options)
            .field("num_logs", &self.len())
            .finish()
    }
}
