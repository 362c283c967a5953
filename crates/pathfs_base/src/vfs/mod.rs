/* 📖 # What is the vfs module?

The host layer the facade delegates to. A `Locator` names an entry by scheme, authority
and path. The `Vfs` registry maps each scheme to a `FileSystemProvider` and enforces the
rules every provider shares. `LocalProvider` serves the real filesystem (optionally below
a root directory) and `MemoryProvider` keeps everything in memory, which is what most
tests run against.
*/

mod glob;
pub mod local;
mod locator;
pub mod memory;
mod metadata;
mod registry;
mod traits;
mod watcher;

pub use glob::GlobPattern;
pub use local::LocalProvider;
pub use locator::{FILE_SCHEME, Locator};
pub use memory::MemoryProvider;
pub use metadata::{DirectoryEntry, FileStat, FileType};
pub use registry::{Vfs, VfsHandle};
pub use traits::{
    CopyOptions, DeleteOptions, FileChange, FileChangeCallback, FileChangeKind,
    FileSystemProvider, ProviderCapabilities, WatchRegistration,
};
pub use watcher::{FileSystemWatcher, WatchOptions};
