use std::any::Any;
use std::fmt;

use async_trait::async_trait;

use crate::PathfsResult;

use super::locator::Locator;
use super::metadata::{DirectoryEntry, FileStat};

/// Options for deleting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Remove directories together with their children.
    pub recursive: bool,
    /// Move the entry to the provider's trash when it has one.
    pub use_trash: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            use_trash: true,
        }
    }
}

impl DeleteOptions {
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_trash(mut self, use_trash: bool) -> Self {
        self.use_trash = use_trash;
        self
    }
}

/// Options for rename and copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Replace an existing target instead of failing with `AlreadyExists`.
    pub overwrite: bool,
}

impl CopyOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// What a provider can do beyond reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub readonly: bool,
    pub trash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A single change reported by a provider watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: FileChangeKind,
    pub locator: Locator,
}

impl FileChange {
    pub fn new(kind: FileChangeKind, locator: Locator) -> Self {
        Self { kind, locator }
    }
}

/// Callback invoked when watched entries change.
pub type FileChangeCallback = Box<dyn Fn(FileChange) + Send + Sync>;

/// Keeps a provider watch alive; the watch stops when this is dropped.
pub struct WatchRegistration {
    _guard: Box<dyn Any + Send>,
}

impl WatchRegistration {
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for WatchRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistration").finish_non_exhaustive()
    }
}

/* 📖 # What does a provider have to implement?

A provider is the raw store for one scheme. It only has to do the single step asked of
it: create one directory whose parent exists, write one file whose parent exists, move
an entry to a target that is known to be free. The `Vfs` registry layers the shared
rules on top (mkdir -p, overwrite checks, readonly enforcement, cross-provider moves),
so those rules behave the same for every scheme.
*/

/// Backing store for one locator scheme.
///
/// Two implementations are provided:
/// - `LocalProvider`: the real filesystem via `tokio::fs`
/// - `MemoryProvider`: in-memory, for tests and scratch mounts
#[async_trait]
pub trait FileSystemProvider: fmt::Debug + Send + Sync + 'static {
    fn capabilities(&self) -> ProviderCapabilities;

    /// Metadata of the entry; `NotFound` when there is none.
    async fn stat(&self, locator: &Locator) -> PathfsResult<FileStat>;

    /// Immediate children of a directory.
    async fn read_directory(&self, locator: &Locator) -> PathfsResult<Vec<DirectoryEntry>>;

    /// Create a single directory. The parent exists and the target does not.
    async fn create_directory(&self, locator: &Locator) -> PathfsResult<()>;

    async fn read_file(&self, locator: &Locator) -> PathfsResult<Vec<u8>>;

    /// Create or replace a file. The parent directory exists.
    async fn write_file(&self, locator: &Locator, content: &[u8]) -> PathfsResult<()>;

    /// Remove an entry. `use_trash` is only passed when `capabilities().trash` is set.
    async fn delete(&self, locator: &Locator, options: DeleteOptions) -> PathfsResult<()>;

    /// Move an entry. The target does not exist and its parent does.
    async fn rename(&self, source: &Locator, target: &Locator) -> PathfsResult<()>;

    /// Copy an entry recursively. The target does not exist and its parent does.
    async fn copy(&self, source: &Locator, target: &Locator) -> PathfsResult<()>;

    /// Report changes at or below `base` until the registration is dropped.
    fn watch(
        &self,
        base: &Locator,
        callback: FileChangeCallback,
    ) -> PathfsResult<WatchRegistration>;
}
