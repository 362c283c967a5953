/* 📖 # Why have pathfs_base as a core library?
pathfs_base holds the error type, the tracing setup and the virtual file system host
layer. The facade crate and the CLI both build on it, and providers can be written
against it without pulling in the facade.
*/

pub mod error;
mod error_tests;
pub mod tracing;
pub mod vfs;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, PathfsError, PathfsResult, ResultExt};
pub use vfs::{
    CopyOptions, DeleteOptions, DirectoryEntry, FileChange, FileChangeKind, FileStat,
    FileSystemProvider, FileSystemWatcher, FileType, GlobPattern, LocalProvider, Locator,
    MemoryProvider, Vfs, VfsHandle, WatchOptions,
};
