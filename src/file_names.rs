/*!
This module contains utilities for managing file names used by the durability primitives.

Files (and their name formats) are as follows:

- Modification stores: `<data file path>.mods`, next to the data file they describe
- Version checkpoint markers: `<storage dir>/Version-[0-9]+`, empty
- Version controller lock file: `<storage dir>/version.lock`
*/

use std::ffi::OsString;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

/// Suffix appended to a data file path to get the path of its modification store.
pub const MODIFICATION_FILE_SUFFIX: &str = ".mods";

/// Prefix of version checkpoint marker files. The rest of the name is the checkpointed version.
pub const VERSION_FILE_PREFIX: &str = "Version-";

/// The name of the lock file held by a version controller for its storage directory.
pub(crate) const VERSION_LOCK_FILE: &str = "version.lock";

/// Resolve the path of the modification store for the data file at `data_file_path`.
pub fn get_modification_file_path<P: AsRef<Path>>(data_file_path: P) -> PathBuf {
    let mut path = OsString::from(data_file_path.as_ref().as_os_str());
    path.push(MODIFICATION_FILE_SUFFIX);

    PathBuf::from(path)
}

/**
Parse the version encoded in a checkpoint marker file name.

Returns `None` if the name does not belong to a marker file and an error if it does but the encoded
version is not a valid decimal `u64`.
*/
pub(crate) fn parse_version_file_name(file_name: &str) -> Option<Result<u64, ParseIntError>> {
    file_name
        .strip_prefix(VERSION_FILE_PREFIX)
        .map(|encoded_version| encoded_version.parse::<u64>())
}

/// Various utilities for managing the names of files kept in a storage directory.
#[derive(Debug)]
pub(crate) struct FileNameHandler {
    directory: PathBuf,
}

impl FileNameHandler {
    /// Create a new instance of the [`FileNameHandler`].
    pub fn new(directory: PathBuf) -> Self {
        FileNameHandler { directory }
    }

    /// Resolve the path to the checkpoint marker encoding `version`.
    pub fn get_version_file_path(&self, version: u64) -> PathBuf {
        self.directory
            .join(format!("{}{}", VERSION_FILE_PREFIX, version))
    }

    /// Resolve the path to the lock file of the storage directory.
    pub fn get_lock_file_path(&self) -> PathBuf {
        self.directory.join(VERSION_LOCK_FILE)
    }
}
