/*!
This module contains global configuration constants for the modification logs and version
controllers.

These values are fixed because they shape durable state: changing them between restarts of the same
storage directory changes how far recovery advances versions and which records writers accept.
*/

/**
The number of versions that can be issued before the version controller persists a new checkpoint.

Every time `curr_version - prev_version >= SAVE_INTERVAL` the current version is persisted. When
recovering, the version is advanced by this amount so that no version issued before a crash can be
issued again. Up to `SAVE_INTERVAL - 1` version numbers are skipped per restart.
*/
pub(crate) const SAVE_INTERVAL: u64 = 100;

/**
The maximum size of a single encoded modification record, including its line terminator.

Records larger than this are rejected before anything is written to the backing store.

**This is 64 KiB.**
*/
pub(crate) const MAX_RECORD_SIZE_BYTES: usize = 64 * 1024;
