/*!
Out-of-place tombstones for immutable data files.

Data files are never rewritten to delete data. Instead a deletion is recorded as a [`Modification`]
in a [`ModificationLog`] next to the data file, and readers filter the contents of the data file
through the log before returning results.

Every modification carries the version issued for the delete by the
[version controller](crate::version) of the storage directory. Only data chunks with a lower
version are affected, so data written after the delete stays visible.

# Layering

- [`Modification`] and [`PathPattern`] are the data model
- The record codec turns modifications into lines of text and back
- [`ModificationAccessor`] implementations read, append and truncate one store
- [`ModificationLog`] caches the store contents and serializes access to it
- [`ModificationLogRegistry`] hands out one log per data file
*/

mod accessor;
pub use accessor::{
    ModificationAccessor, ModificationReader, ModificationWriter, TextModificationAccessor,
};

mod model;
pub use model::{Deletion, Modification};

mod modification_log;
pub use modification_log::{append_to_all, ModificationLog};

mod path_pattern;
pub use path_pattern::PathPattern;

mod record;

mod registry;
pub use registry::ModificationLogRegistry;
