/*!
Generators of the version numbers stamped on data files and modifications.

Versions order data files and tombstones within a storage directory. A data chunk is affected by a
tombstone only if the version of the chunk is lower than the version of the tombstone, so versions
must never be handed out twice, not even across restarts.
*/

mod file_version_controller;
pub use file_version_controller::FileVersionController;

/// A source of strictly increasing versions for one storage directory.
pub trait VersionController: Send + Sync {
    /**
    Issue a new version.

    The returned value is greater than every value previously returned by this controller and by
    every controller that owned the same storage directory before it.
    */
    fn next_version(&self) -> u64;

    /// Get the most recently issued version without issuing a new one.
    fn current_version(&self) -> u64;
}
