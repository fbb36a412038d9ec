/*!
File system wrappers to enable different implementations of file systems to be used.

The primary purpose of this wrapper is to enable testing with temp file based or in-memory file
systems, and to let tests inject failures underneath the modification logs and version
controllers.
*/

mod traits;
pub use self::traits::{
    FileLock, FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile,
};

mod fs_disk;
pub use self::fs_disk::{OsFileSystem, TmpFileSystem};

mod fs_mem;
pub use self::fs_mem::InMemoryFileSystem;
