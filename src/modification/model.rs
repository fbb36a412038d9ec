use crate::errors::{StorageError, StorageResult};

use super::path_pattern::PathPattern;

/**
A tombstone recorded against an immutable data file.

The set of modification kinds is part of the durable record format so it is a closed enum. New
kinds are added as new variants and every encoder/decoder match has to handle them.
*/
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Modification {
    /// Deletion of a time range of every series matching a path pattern.
    Deletion(Deletion),
}

/// Public methods
impl Modification {
    /// The version this modification was created under.
    pub fn version(&self) -> u64 {
        match self {
            Modification::Deletion(deletion) => deletion.version(),
        }
    }

    /// The path pattern selecting the series this modification applies to.
    pub fn path(&self) -> &PathPattern {
        match self {
            Modification::Deletion(deletion) => deletion.path(),
        }
    }

    /**
    Returns true if the data point of `series_path` at `timestamp`, stored in a chunk written under
    `chunk_version`, is hidden by this modification.
    */
    pub fn covers(&self, series_path: &str, timestamp: i64, chunk_version: u64) -> bool {
        match self {
            Modification::Deletion(deletion) => {
                deletion.covers(series_path, timestamp, chunk_version)
            }
        }
    }
}

impl From<Deletion> for Modification {
    fn from(deletion: Deletion) -> Self {
        Modification::Deletion(deletion)
    }
}

/**
Deletion of the inclusive time range `[start_time, end_time]` for every series matching `path`.

Only data written before the deletion was requested is affected. That is decided by comparing the
version of a data chunk with the version of the deletion.
*/
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Deletion {
    /// The series the deletion applies to.
    path: PathPattern,

    /// The first deleted timestamp (inclusive).
    start_time: i64,

    /// The last deleted timestamp (inclusive).
    end_time: i64,

    /// The version issued for the delete operation.
    version: u64,
}

/// Public methods
impl Deletion {
    /**
    Create a new [`Deletion`].

    Returns an error if the time range is empty i.e. `start_time > end_time`.
    */
    pub fn new(
        path: PathPattern,
        start_time: i64,
        end_time: i64,
        version: u64,
    ) -> StorageResult<Self> {
        if start_time > end_time {
            return Err(StorageError::InvalidRecord(format!(
                "The start time of a deletion ({start_time}) cannot be after its end time \
                ({end_time})."
            )));
        }

        Ok(Deletion {
            path,
            start_time,
            end_time,
            version,
        })
    }

    /// Create a deletion of all data of `path` up to and including `timestamp`.
    pub fn up_to(path: PathPattern, timestamp: i64, version: u64) -> Self {
        Deletion {
            path,
            start_time: i64::MIN,
            end_time: timestamp,
            version,
        }
    }

    /// Get the path pattern.
    pub fn path(&self) -> &PathPattern {
        &self.path
    }

    /// Get the first deleted timestamp.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Get the last deleted timestamp.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Get the version of the deletion.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// See [`Modification::covers`].
    pub fn covers(&self, series_path: &str, timestamp: i64, chunk_version: u64) -> bool {
        chunk_version < self.version
            && (self.start_time..=self.end_time).contains(&timestamp)
            && self.path.matches(series_path)
    }
}
