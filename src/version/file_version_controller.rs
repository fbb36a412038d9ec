use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SAVE_INTERVAL;
use crate::errors::{StorageError, StorageResult};
use crate::file_names::{parse_version_file_name, FileNameHandler};
use crate::fs::{FileLock, FileSystem};
use crate::StorageOptions;

use super::VersionController;

/// Counters guarded by the lock of a [`FileVersionController`].
#[derive(Debug)]
struct VersionState {
    /// The version encoded in the checkpoint marker on disk.
    prev_version: u64,

    /// The last version handed out.
    curr_version: u64,

    /**
    The path of the checkpoint marker on disk. A marker left by an older process may not use the
    canonical spelling of its version, e.g. `Version-0100`.
    */
    marker_path: PathBuf,
}

/**
A version controller that checkpoints its progress as an empty marker file in the storage
directory.

The marker `Version-<n>` records the recovery baseline. It is only rewritten once every
[`SAVE_INTERVAL`] versions. On startup the controller assumes that up to `SAVE_INTERVAL` versions
were issued after the last checkpoint and skips ahead by that amount, so a crash can never cause a
version to be issued twice.

The controller holds a lock on the storage directory for its whole lifetime.
*/
pub struct FileVersionController {
    /// A reference to the file system provider.
    filesystem_provider: Arc<dyn FileSystem>,

    /// Resolves the paths of the files kept in the storage directory.
    file_name_handler: FileNameHandler,

    /// The storage directory.
    directory: PathBuf,

    /// The version counters. The checkpoint is written while holding this lock.
    state: Mutex<VersionState>,

    /// Released when the controller is dropped.
    _directory_lock: FileLock,
}

/// Public methods
impl FileVersionController {
    /**
    Open the version controller of the storage directory at `directory`.

    The directory is created if it does not exist. Recovery from an existing checkpoint happens
    before this returns and any failure to recover is fatal.
    */
    pub fn open<P: AsRef<Path>>(options: &StorageOptions, directory: P) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        let filesystem_provider = options.filesystem_provider();
        let file_name_handler = FileNameHandler::new(directory.clone());

        log::info!("Opening the version controller for {:?}.", directory);
        filesystem_provider.create_dir_all(&directory)?;

        let lock_file_path = file_name_handler.get_lock_file_path();
        let directory_lock = filesystem_provider
            .lock_file(&lock_file_path)
            .map_err(|lock_err| {
                StorageError::Recovery(format!(
                    "Failed to lock the storage directory at {:?}. Is it owned by another \
                    version controller? Error: {}",
                    directory, lock_err
                ))
            })?;

        let controller = Self {
            filesystem_provider,
            file_name_handler,
            directory,
            state: Mutex::new(VersionState {
                prev_version: 0,
                curr_version: 0,
                marker_path: PathBuf::new(),
            }),
            _directory_lock: directory_lock,
        };
        controller.restore()?;

        Ok(controller)
    }

    /// Get the storage directory owned by this controller.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Private methods
impl FileVersionController {
    /**
    Restore the counters from the checkpoint marker and persist a new baseline.

    Only the greatest marker is trusted. Others are left over from an interrupted checkpoint and are
    deleted.
    */
    fn restore(&self) -> StorageResult<()> {
        let mut markers = self.find_version_markers()?;
        markers.sort_unstable();

        let (prev_version, marker_path) = match markers.pop() {
            Some(latest_marker) => {
                for (_, stale_path) in markers {
                    log::warn!("Removing stale version checkpoint at {:?}.", stale_path);
                    match self.filesystem_provider.remove_file(&stale_path) {
                        Ok(()) => {}
                        Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {
                            log::warn!("The stale checkpoint at {:?} is already gone.", stale_path);
                        }
                        Err(remove_err) => {
                            return Err(StorageError::Recovery(format!(
                                "Failed to remove the stale checkpoint at {:?}. Error: {}",
                                stale_path, remove_err
                            )));
                        }
                    }
                }

                latest_marker
            }
            None => {
                let initial_path = self.file_name_handler.get_version_file_path(0);
                log::info!("Creating the initial version checkpoint at {:?}.", initial_path);
                self.filesystem_provider
                    .create_file(&initial_path, false)
                    .map_err(|create_err| {
                        StorageError::Recovery(format!(
                            "Failed to create the initial checkpoint at {:?}. Error: {}",
                            initial_path, create_err
                        ))
                    })?;

                (0, initial_path)
            }
        };

        let curr_version = prev_version.checked_add(SAVE_INTERVAL).ok_or_else(|| {
            StorageError::Recovery(format!(
                "The checkpointed version {} is too large to advance.",
                prev_version
            ))
        })?;

        let mut state = self.state.lock();
        state.prev_version = prev_version;
        state.curr_version = curr_version;
        state.marker_path = marker_path;
        self.persist(&mut state).map_err(|persist_err| {
            StorageError::Recovery(format!(
                "Failed to checkpoint the recovered version {}. Error: {}",
                curr_version, persist_err
            ))
        })?;

        log::info!(
            "Recovered the version controller for {:?}. The last checkpoint was {} and versions \
            will resume after {}.",
            self.directory,
            prev_version,
            curr_version
        );

        Ok(())
    }

    /// Get the checkpoint markers in the storage directory along with the versions they encode.
    fn find_version_markers(&self) -> StorageResult<Vec<(u64, PathBuf)>> {
        let entries = self
            .filesystem_provider
            .list_dir(&self.directory)
            .map_err(|list_err| {
                StorageError::Recovery(format!(
                    "Failed to list the storage directory at {:?}. Error: {}",
                    self.directory, list_err
                ))
            })?;

        let mut markers = vec![];
        for entry in entries {
            let file_name = match entry.file_name().and_then(|name| name.to_str()) {
                Some(file_name) => file_name,
                None => continue,
            };

            match parse_version_file_name(file_name) {
                Some(Ok(version)) => markers.push((version, entry)),
                Some(Err(parse_err)) => {
                    return Err(StorageError::Recovery(format!(
                        "The checkpoint marker {:?} does not encode a valid version. Error: {}",
                        entry, parse_err
                    )));
                }
                None => {}
            }
        }

        Ok(markers)
    }

    /// Persist a checkpoint if enough versions were issued since the last one.
    fn checkpoint_if_due(&self, state: &mut VersionState) {
        if state.curr_version - state.prev_version < SAVE_INTERVAL {
            return;
        }

        if let Err(persist_err) = self.persist(state) {
            log::error!(
                "Failed to checkpoint version {} for {:?}. The checkpoint will be retried on the \
                next issued version. Error: {}",
                state.curr_version,
                self.directory,
                persist_err
            );
        }
    }

    /**
    Move the checkpoint marker to the name encoding `curr_version`.

    A rename keeps exactly one marker in the directory at every point in time.
    */
    fn persist(&self, state: &mut VersionState) -> io::Result<()> {
        let prev_path = state.marker_path.clone();
        let curr_path = self
            .file_name_handler
            .get_version_file_path(state.curr_version);

        match self.filesystem_provider.rename(&prev_path, &curr_path) {
            Ok(()) => {}
            Err(rename_err) if rename_err.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    "The version checkpoint at {:?} is missing. Creating {:?} directly.",
                    prev_path,
                    curr_path
                );
                self.filesystem_provider.create_file(&curr_path, false)?;
            }
            Err(rename_err) => return Err(rename_err),
        }

        log::debug!("Checkpointed version {}.", state.curr_version);
        state.prev_version = state.curr_version;
        state.marker_path = curr_path;

        Ok(())
    }
}

impl VersionController for FileVersionController {
    fn next_version(&self) -> u64 {
        let mut state = self.state.lock();
        state.curr_version += 1;
        self.checkpoint_if_due(&mut state);

        state.curr_version
    }

    fn current_version(&self) -> u64 {
        self.state.lock().curr_version
    }
}

impl fmt::Debug for FileVersionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileVersionController")
            .field("filesystem_provider", &self.filesystem_provider)
            .field("directory", &self.directory)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::thread;

    use crate::fs::TmpFileSystem;
    use crate::test_utils::{setup, write_file, FaultyFileSystem, Faults};

    use super::*;

    const STORAGE_DIR: &str = "/data/root.sg1";

    fn marker_names(options: &StorageOptions) -> Vec<String> {
        options
            .filesystem_provider()
            .list_dir(Path::new(STORAGE_DIR))
            .unwrap()
            .into_iter()
            .filter_map(|path| {
                let file_name = path.file_name()?.to_str()?.to_string();
                file_name.starts_with("Version-").then_some(file_name)
            })
            .collect()
    }

    #[test]
    fn fresh_directory_starts_after_the_first_interval() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        assert_eq!(controller.current_version(), 100);
        assert_eq!(marker_names(&options), vec!["Version-100".to_string()]);
        assert_eq!(controller.next_version(), 101);
        assert_eq!(controller.current_version(), 101);
    }

    #[test]
    fn marker_moves_once_every_interval() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        let versions: Vec<u64> = (0..100).map(|_| controller.next_version()).collect();

        assert_eq!(versions, (101..=200).collect::<Vec<u64>>());
        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);

        controller.next_version();
        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);
    }

    #[test]
    fn restart_never_reissues_a_version() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        let mut issued: Vec<u64> = (0..250).map(|_| controller.next_version()).collect();
        drop(controller);

        let restarted = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        issued.extend((0..250).map(|_| restarted.next_version()));

        assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn crash_between_checkpoints_skips_ahead() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        let last_issued = (0..50).map(|_| controller.next_version()).last().unwrap();
        assert_eq!(last_issued, 150);
        drop(controller);

        let restarted = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        let first_after_restart = restarted.next_version();

        assert!(first_after_restart > last_issued);
        assert_eq!(first_after_restart, 201);
        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);
    }

    #[test]
    fn recovery_keeps_the_greatest_marker_and_removes_the_others() {
        setup();

        let options = StorageOptions::with_memory_env();
        let fs = options.filesystem_provider();
        for version in [5, 300, 42] {
            write_file(
                fs.as_ref(),
                &Path::new(STORAGE_DIR).join(format!("Version-{version}")),
                b"",
            );
        }

        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        assert_eq!(marker_names(&options), vec!["Version-400".to_string()]);
        assert_eq!(controller.next_version(), 401);
    }

    #[test]
    fn markers_with_non_canonical_names_are_recovered_by_their_listed_path() {
        setup();

        let options = StorageOptions::with_memory_env();
        let fs = options.filesystem_provider();
        write_file(fs.as_ref(), &Path::new(STORAGE_DIR).join("Version-0100"), b"");

        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);
        assert_eq!(controller.next_version(), 201);
        drop(controller);

        let restarted = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        assert_eq!(marker_names(&options), vec!["Version-300".to_string()]);
        assert_eq!(restarted.next_version(), 301);
    }

    #[test]
    fn stale_markers_with_the_same_version_are_removed() {
        setup();

        let options = StorageOptions::with_memory_env();
        let fs = options.filesystem_provider();
        for file_name in ["Version-100", "Version-0100", "Version-+42"] {
            write_file(fs.as_ref(), &Path::new(STORAGE_DIR).join(file_name), b"");
        }

        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);
        assert_eq!(controller.next_version(), 201);
    }

    #[test]
    fn corrupt_marker_fails_recovery() {
        setup();

        let options = StorageOptions::with_memory_env();
        write_file(
            options.filesystem_provider().as_ref(),
            &Path::new(STORAGE_DIR).join("Version-12ab"),
            b"",
        );

        let result = FileVersionController::open(&options, STORAGE_DIR);

        assert!(matches!(result, Err(StorageError::Recovery(_))));
    }

    #[test]
    fn failed_checkpoint_does_not_interrupt_version_issuance() {
        setup();

        let (options, faults) = FaultyFileSystem::options();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        Faults::set(&faults.fail_renames, true);
        let versions: Vec<u64> = (0..101).map(|_| controller.next_version()).collect();
        assert_eq!(versions, (101..=201).collect::<Vec<u64>>());
        assert_eq!(marker_names(&options), vec!["Version-100".to_string()]);

        Faults::set(&faults.fail_renames, false);
        assert_eq!(controller.next_version(), 202);
        assert_eq!(marker_names(&options), vec!["Version-202".to_string()]);
    }

    #[test]
    fn failed_post_recovery_checkpoint_is_fatal() {
        setup();

        let (options, faults) = FaultyFileSystem::options();
        Faults::set(&faults.fail_renames, true);

        let result = FileVersionController::open(&options, STORAGE_DIR);

        assert!(matches!(result, Err(StorageError::Recovery(_))));
    }

    #[test]
    fn missing_marker_is_recreated_on_checkpoint() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        options
            .filesystem_provider()
            .remove_file(&Path::new(STORAGE_DIR).join("Version-100"))
            .unwrap();

        for _ in 0..100 {
            controller.next_version();
        }

        assert_eq!(marker_names(&options), vec!["Version-200".to_string()]);
    }

    #[test]
    fn concurrent_callers_get_unique_versions() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = Arc::new(FileVersionController::open(&options, STORAGE_DIR).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| controller.next_version())
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut issued = HashSet::new();
        for handle in handles {
            for version in handle.join().unwrap() {
                assert!(issued.insert(version), "version {version} was issued twice");
            }
        }

        assert_eq!(issued.len(), 1000);
        assert_eq!(controller.current_version(), 1100);
        assert_eq!(marker_names(&options), vec!["Version-1100".to_string()]);
    }

    #[test]
    fn a_directory_can_only_be_owned_by_one_controller_in_memory() {
        setup();

        let options = StorageOptions::with_memory_env();
        let controller = FileVersionController::open(&options, STORAGE_DIR).unwrap();

        let second = FileVersionController::open(&options, STORAGE_DIR);
        assert!(matches!(second, Err(StorageError::Recovery(_))));
        assert_eq!(controller.next_version(), 101);

        drop(controller);
        let reopened = FileVersionController::open(&options, STORAGE_DIR).unwrap();
        assert_eq!(reopened.next_version(), 201);
    }

    #[test]
    fn a_directory_can_only_be_owned_by_one_controller() {
        setup();

        let tmp_fs = TmpFileSystem::new(None).unwrap();
        let directory = tmp_fs.get_root_path().join("root.sg1");
        let options = StorageOptions {
            filesystem_provider: Arc::new(tmp_fs),
            ..StorageOptions::default()
        };

        let controller = FileVersionController::open(&options, &directory).unwrap();
        let second = FileVersionController::open(&options, &directory);
        assert!(matches!(second, Err(StorageError::Recovery(_))));

        let last_issued = controller.next_version();
        drop(controller);

        let reopened = FileVersionController::open(&options, &directory).unwrap();
        assert!(reopened.next_version() > last_issued);
    }
}
