/*!
tsmods provides the two durability primitives that let a time-series storage engine delete data
without rewriting its immutable data files.

- A [`ModificationLog`] sits next to every data file and records tombstones for it. A tombstone
  names a path pattern, a time range and the version under which the delete was issued.
- A [`VersionController`] per storage directory hands out the strictly increasing versions stamped
  on data files and tombstones. [`FileVersionController`] survives crashes by checkpointing every
  few versions and skipping ahead on recovery.

Both primitives perform I/O through the [`FileSystem`](fs::FileSystem) abstraction so they can be
run against the OS, a temporary directory or memory. We have configured the project such that
`rustdoc` generates output even for private methods.
*/

#![warn(missing_debug_implementations, missing_docs)]

mod config;

mod errors;
pub use errors::{StorageError, StorageResult};

pub mod file_names;

pub mod fs;

pub mod modification;
pub use modification::{
    append_to_all, Deletion, Modification, ModificationLog, ModificationLogRegistry, PathPattern,
};

pub mod options;
pub use options::StorageOptions;

pub mod version;
pub use version::{FileVersionController, VersionController};

#[cfg(test)]
mod test_utils;
