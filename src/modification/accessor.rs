/*!
Readers and writers of modification stores.

A store is a file next to the data file it describes holding one text record per modification (see
[`super::record`]). Writes are appended and synced before they are acknowledged. The most recent
record can be taken back by truncating the file to the offset where the record starts.
*/

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{StorageError, StorageResult};
use crate::fs::{FileSystem, RandomAccessFile};
use crate::StorageOptions;

use super::model::Modification;
use super::record::{decode_records, DecodedRecords};

/// Reads the committed modifications of a store.
pub trait ModificationReader: Send {
    /**
    Read every well-formed record of the store in order.

    A malformed or incomplete final record marks the end of the log and is not reported as an
    error. A store that does not exist yet reads as empty.
    */
    fn read(&mut self) -> StorageResult<Vec<Modification>>;
}

/// Appends modifications to a store and takes them back.
pub trait ModificationWriter: Send {
    /// Durably append one record for `modification`.
    fn write(&mut self, modification: &Modification) -> StorageResult<()>;

    /**
    Remove the most recently appended record by truncating the store to the start of that record.

    This is a no-op if the store is empty.
    */
    fn abort(&mut self) -> StorageResult<()>;

    /// Release the underlying file handle. Calling this more than once is allowed.
    fn close(&mut self) -> StorageResult<()>;

    /// Release the underlying file handle and delete the store.
    fn remove(&mut self) -> StorageResult<()>;
}

/// A reader and writer of the same store.
pub trait ModificationAccessor: ModificationReader + ModificationWriter {}

impl<T: ModificationReader + ModificationWriter> ModificationAccessor for T {}

/// Accessor for stores using the line-oriented text record format.
pub struct TextModificationAccessor {
    /// A reference to the file system provider in use.
    filesystem_provider: Arc<dyn FileSystem>,

    /// The path to the store.
    file_path: PathBuf,

    /// The maximum size of an encoded record.
    max_record_size: usize,

    /// Handle used for appends and truncation. Opened on the first write or abort.
    writer: Option<Box<dyn RandomAccessFile>>,

    /**
    The boundaries of the committed records in the store.

    This is `None` until the store has been scanned and is reset whenever the on-disk state may no
    longer match it.
    */
    committed: Option<RecordBoundaries>,

    /**
    The length the store has to be truncated to before it is used again.

    This is set when a failed write could not be rolled back. The record left behind may be complete
    and would otherwise be read back as committed.
    */
    pending_rollback: Option<u64>,
}

/// Offsets describing the committed records of a store.
#[derive(Debug)]
struct RecordBoundaries {
    /// The byte offset at which each committed record starts.
    record_offsets: Vec<u64>,

    /// The length of the committed part of the store.
    length: u64,
}

impl From<&DecodedRecords> for RecordBoundaries {
    fn from(decoded: &DecodedRecords) -> Self {
        RecordBoundaries {
            record_offsets: decoded.record_offsets.clone(),
            length: decoded.valid_length,
        }
    }
}

/// Public methods
impl TextModificationAccessor {
    /// Create a new accessor for the store at `file_path`. No I/O is performed until first use.
    pub fn new<P: AsRef<Path>>(options: &StorageOptions, file_path: P) -> Self {
        Self {
            filesystem_provider: options.filesystem_provider(),
            file_path: file_path.as_ref().to_path_buf(),
            max_record_size: options.max_record_size(),
            writer: None,
            committed: None,
            pending_rollback: None,
        }
    }

    /// Get the path of the store.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Private methods
impl TextModificationAccessor {
    /// Read and decode the whole store.
    fn scan(&self) -> StorageResult<DecodedRecords> {
        let mut file = match self.filesystem_provider.open_file(&self.file_path) {
            Ok(file) => file,
            Err(io_err) if io_err.kind() == ErrorKind::NotFound => {
                return Ok(DecodedRecords::default());
            }
            Err(io_err) => return Err(io_err.into()),
        };

        let mut buf: Vec<u8> = vec![];
        file.read_to_end(&mut buf)?;
        let decoded = decode_records(&buf);
        if decoded.valid_length < buf.len() as u64 {
            log::warn!(
                "Ignoring {} trailing bytes of the modification file {:?} that do not form a \
                complete record.",
                buf.len() as u64 - decoded.valid_length,
                self.file_path
            );
        }

        Ok(decoded)
    }

    /**
    Truncate away a record whose write failed and could not be rolled back at the time.

    The store stays unusable until this succeeds.
    */
    fn finish_pending_rollback(&mut self) -> StorageResult<()> {
        let rollback_length = match self.pending_rollback {
            Some(rollback_length) => rollback_length,
            None => return Ok(()),
        };

        log::warn!(
            "Truncating the modification file {:?} to {} bytes to remove a failed write.",
            self.file_path,
            rollback_length
        );
        let mut file = self
            .filesystem_provider
            .create_file(&self.file_path, true)?;
        if file.len()? > rollback_length {
            file.set_len(rollback_length)?;
            file.sync_all()?;
        }

        self.pending_rollback = None;
        self.committed = None;
        self.writer = Some(file);

        Ok(())
    }

    /// Scan the store for record boundaries unless they are already known.
    fn load_boundaries(&mut self) -> StorageResult<()> {
        self.finish_pending_rollback()?;
        if self.committed.is_none() {
            let decoded = self.scan()?;
            self.committed = Some(RecordBoundaries::from(&decoded));
        }

        Ok(())
    }

    /**
    Take the write handle out of the accessor, opening it if necessary. Callers put it back once
    they are done with it.

    Record boundaries are loaded first. If the store ends with a partial record, e.g. because a
    previous process crashed in the middle of a write, the store is truncated back to its committed
    length. Otherwise records appended after the partial one would never be read back.
    */
    fn take_writer(&mut self) -> StorageResult<Box<dyn RandomAccessFile>> {
        self.load_boundaries()?;

        if let Some(writer) = self.writer.take() {
            return Ok(writer);
        }

        log::info!(
            "Opening the modification file at {:?} for appending.",
            self.file_path
        );
        let mut file = self
            .filesystem_provider
            .create_file(&self.file_path, true)?;
        let committed_length = self.committed_length();
        let file_length = file.len()?;
        if file_length > committed_length {
            log::warn!(
                "Truncating the modification file {:?} from {} to {} bytes to drop an \
                incomplete record.",
                self.file_path,
                file_length,
                committed_length
            );
            file.set_len(committed_length)?;
            file.sync_all()?;
        }

        Ok(file)
    }

    fn committed_length(&self) -> u64 {
        self.committed
            .as_ref()
            .map_or(0, |boundaries| boundaries.length)
    }

    /**
    Forget the open handle and the known record boundaries so that the next operation starts from
    the on-disk state.
    */
    fn reset(&mut self) {
        self.writer = None;
        self.committed = None;
    }

    /// Append and sync `buf`.
    fn append_durably(writer: &mut dyn RandomAccessFile, buf: &[u8]) -> io::Result<()> {
        writer.append(buf)?;
        writer.flush()?;
        writer.sync_all()
    }
}

impl ModificationReader for TextModificationAccessor {
    fn read(&mut self) -> StorageResult<Vec<Modification>> {
        log::info!("Reading the modification file at {:?}", self.file_path);
        self.finish_pending_rollback()?;
        let decoded = self.scan()?;
        self.committed = Some(RecordBoundaries::from(&decoded));

        Ok(decoded.modifications)
    }
}

impl ModificationWriter for TextModificationAccessor {
    fn write(&mut self, modification: &Modification) -> StorageResult<()> {
        let buf = Vec::<u8>::from(modification);
        if buf.len() > self.max_record_size {
            return Err(StorageError::RecordTooLarge {
                size: buf.len(),
                limit: self.max_record_size,
            });
        }

        let mut writer = self.take_writer()?;
        let record_offset = self.committed_length();
        if let Err(write_err) = TextModificationAccessor::append_durably(writer.as_mut(), &buf) {
            // Take back whatever part of the record made it to the file
            match writer
                .set_len(record_offset)
                .and_then(|_| writer.sync_all())
            {
                Ok(()) => self.writer = Some(writer),
                Err(rollback_err) => {
                    log::error!(
                        "Failed to remove a failed record from {:?}. The removal will be retried \
                        before the next access. Error: {}",
                        self.file_path,
                        rollback_err
                    );
                    self.reset();
                    self.pending_rollback = Some(record_offset);
                }
            }

            return Err(write_err.into());
        }
        self.writer = Some(writer);

        log::debug!(
            "Wrote a {} byte record to the modification file {:?} at offset {}.",
            buf.len(),
            self.file_path,
            record_offset
        );
        if let Some(boundaries) = self.committed.as_mut() {
            boundaries.record_offsets.push(record_offset);
            boundaries.length = record_offset + buf.len() as u64;
        }

        Ok(())
    }

    fn abort(&mut self) -> StorageResult<()> {
        self.load_boundaries()?;
        let last_record_offset = match self
            .committed
            .as_ref()
            .and_then(|boundaries| boundaries.record_offsets.last())
        {
            Some(&offset) => offset,
            None => return Ok(()),
        };

        let mut writer = self.take_writer()?;
        if let Err(truncate_err) = writer
            .set_len(last_record_offset)
            .and_then(|_| writer.sync_all())
        {
            self.reset();
            return Err(truncate_err.into());
        }
        self.writer = Some(writer);

        log::debug!(
            "Removed the last record of the modification file {:?} starting at offset {}.",
            self.file_path,
            last_record_offset
        );
        if let Some(boundaries) = self.committed.as_mut() {
            boundaries.record_offsets.pop();
            boundaries.length = last_record_offset;
        }

        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(writer) = self.writer.take() {
            log::info!("Closing the modification file at {:?}", self.file_path);
            writer.sync_all()?;
        }
        self.committed = None;

        Ok(())
    }

    fn remove(&mut self) -> StorageResult<()> {
        self.reset();
        self.pending_rollback = None;
        log::info!("Removing the modification file at {:?}", self.file_path);
        match self.filesystem_provider.remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(io_err) if io_err.kind() == ErrorKind::NotFound => Ok(()),
            Err(io_err) => Err(io_err.into()),
        }
    }
}

impl fmt::Debug for TextModificationAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextModificationAccessor")
            .field("file_path", &self.file_path)
            .field("committed", &self.committed)
            .field("pending_rollback", &self.pending_rollback)
            .finish()
    }
}
