use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::{PathfsError, PathfsResult};
use crate::error::ErrorKind;

use super::glob::GlobPattern;
use super::locator::Locator;
use super::metadata::{DirectoryEntry, FileStat};
use super::traits::{CopyOptions, DeleteOptions, FileSystemProvider};
use super::watcher::{FileSystemWatcher, WatchOptions};

/* 📖 # What does the Vfs add on top of the providers?

Providers implement single steps. The Vfs routes each locator to the provider registered
for its scheme and turns those steps into the operations callers see: `create_directory`
creates missing ancestors, `write_file` creates missing parents, `rename` and `copy` check
the target and fall back to a read/write copy when source and target live in different
providers. Readonly providers are rejected here, before any provider call.
*/

#[derive(Debug, Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn verb(self) -> &'static str {
        match self {
            Transfer::Copy => "copy",
            Transfer::Move => "move",
        }
    }
}

/// Registry of file system providers keyed by locator scheme.
#[derive(Debug, Default)]
pub struct Vfs {
    providers: RwLock<HashMap<String, Arc<dyn FileSystemProvider>>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` for `scheme`. Each scheme can be registered once.
    pub fn register_provider(
        &self,
        scheme: &str,
        provider: impl FileSystemProvider,
    ) -> PathfsResult<()> {
        let scheme = scheme.to_ascii_lowercase();
        let mut providers = self.providers.write();
        if providers.contains_key(&scheme) {
            return Err(ErrorKind::AlreadyExists {
                locator: format!("{}:", scheme),
            }
            .into());
        }
        info!(scheme = %scheme, ?provider, "registering file system provider");
        providers.insert(scheme, Arc::new(provider));
        Ok(())
    }

    pub fn has_provider(&self, scheme: &str) -> bool {
        self.providers
            .read()
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<_> = self.providers.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    fn provider(&self, scheme: &str) -> PathfsResult<Arc<dyn FileSystemProvider>> {
        self.providers
            .read()
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                debug!(scheme, "no provider for scheme");
                ErrorKind::SchemeUnsupported {
                    scheme: scheme.to_string(),
                }
                .into()
            })
    }

    fn writable_provider(&self, locator: &Locator) -> PathfsResult<Arc<dyn FileSystemProvider>> {
        let provider = self.provider(locator.scheme())?;
        if provider.capabilities().readonly {
            debug!(locator = %locator, "provider is readonly");
            return Err(ErrorKind::PermissionDenied {
                locator: locator.to_string(),
            }
            .into());
        }
        Ok(provider)
    }

    /// `None` when no provider handles `scheme`, otherwise whether it accepts writes.
    pub fn is_writable_file_system(&self, scheme: &str) -> Option<bool> {
        self.providers
            .read()
            .get(&scheme.to_ascii_lowercase())
            .map(|provider| !provider.capabilities().readonly)
    }

    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn stat(&self, locator: &Locator) -> PathfsResult<FileStat> {
        self.provider(locator.scheme())?.stat(locator).await
    }

    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn read_directory(&self, locator: &Locator) -> PathfsResult<Vec<DirectoryEntry>> {
        self.provider(locator.scheme())?
            .read_directory(locator)
            .await
    }

    /// Creates the directory and any missing ancestors. An existing directory is fine.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn create_directory(&self, locator: &Locator) -> PathfsResult<()> {
        let provider = self.writable_provider(locator)?;

        let mut missing = Vec::new();
        let mut current = Some(locator.clone());
        while let Some(directory) = current {
            match provider.stat(&directory).await {
                Ok(stat) if stat.is_file() => {
                    return Err(ErrorKind::AlreadyExistsAsFile {
                        locator: directory.to_string(),
                    }
                    .into());
                }
                Ok(_) => break,
                Err(e) if is_missing(&e) => {
                    current = directory.parent();
                    missing.push(directory);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(count = missing.len(), "creating missing directories");
        for directory in missing.into_iter().rev() {
            match provider.create_directory(&directory).await {
                Ok(()) => {}
                // Created concurrently by someone else.
                Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn read_file(&self, locator: &Locator) -> PathfsResult<Vec<u8>> {
        self.provider(locator.scheme())?.read_file(locator).await
    }

    /// Creates or replaces a file, creating missing parent directories.
    #[instrument(skip(self, content), fields(locator = %locator, bytes = content.len()))]
    pub async fn write_file(&self, locator: &Locator, content: &[u8]) -> PathfsResult<()> {
        let provider = self.writable_provider(locator)?;
        match provider.stat(locator).await {
            Ok(stat) if stat.is_directory() => {
                return Err(ErrorKind::FileIsDirectory {
                    locator: locator.to_string(),
                }
                .into());
            }
            Ok(_) => {}
            Err(e) if is_missing(&e) => {
                if let Some(parent) = locator.parent() {
                    self.create_directory(&parent).await?;
                }
            }
            Err(e) => return Err(e),
        }
        provider.write_file(locator, content).await
    }

    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn delete(&self, locator: &Locator, options: DeleteOptions) -> PathfsResult<()> {
        let provider = self.writable_provider(locator)?;
        let stat = provider.stat(locator).await?;
        if stat.is_directory()
            && !options.recursive
            && !provider.read_directory(locator).await?.is_empty()
        {
            return Err(ErrorKind::DirectoryNotEmpty {
                locator: locator.to_string(),
            }
            .into());
        }

        let use_trash = options.use_trash && provider.capabilities().trash;
        if options.use_trash && !use_trash {
            debug!("provider has no trash, deleting permanently");
        }
        provider
            .delete(locator, options.with_trash(use_trash))
            .await
    }

    /// Moves `source` to `target`.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub async fn rename(
        &self,
        source: &Locator,
        target: &Locator,
        options: CopyOptions,
    ) -> PathfsResult<()> {
        self.transfer(source, target, options, Transfer::Move).await
    }

    /// Copies `source` to `target`, recursively for directories.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub async fn copy(
        &self,
        source: &Locator,
        target: &Locator,
        options: CopyOptions,
    ) -> PathfsResult<()> {
        self.transfer(source, target, options, Transfer::Copy).await
    }

    async fn transfer(
        &self,
        source: &Locator,
        target: &Locator,
        options: CopyOptions,
        transfer: Transfer,
    ) -> PathfsResult<()> {
        let source_provider = match transfer {
            Transfer::Copy => self.provider(source.scheme())?,
            Transfer::Move => self.writable_provider(source)?,
        };
        let target_provider = self.writable_provider(target)?;

        source_provider.stat(source).await?;
        if source == target {
            debug!("source and target are the same entry");
            return Ok(());
        }
        if target.is_ancestor_of(source) {
            return Err(ErrorKind::InvalidOperation {
                message: format!(
                    "Cannot {} {} over its own ancestor {}",
                    transfer.verb(),
                    source,
                    target
                ),
            }
            .into());
        }
        if source.is_ancestor_of(target) {
            return Err(ErrorKind::InvalidOperation {
                message: format!(
                    "Cannot {} {} into itself ({})",
                    transfer.verb(),
                    source,
                    target
                ),
            }
            .into());
        }

        match target_provider.stat(target).await {
            Ok(_) if !options.overwrite => {
                return Err(ErrorKind::AlreadyExists {
                    locator: target.to_string(),
                }
                .into());
            }
            Ok(_) => {
                debug!("removing existing target");
                target_provider
                    .delete(
                        target,
                        DeleteOptions::default()
                            .with_recursive(true)
                            .with_trash(false),
                    )
                    .await?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        if let Some(parent) = target.parent() {
            self.create_directory(&parent).await?;
        }

        if source.scheme() == target.scheme() {
            return match transfer {
                Transfer::Copy => source_provider.copy(source, target).await,
                Transfer::Move => source_provider.rename(source, target).await,
            };
        }

        debug!("source and target use different providers");
        copy_across(
            source_provider.as_ref(),
            source,
            target_provider.as_ref(),
            target,
        )
        .await?;
        if let Transfer::Move = transfer {
            source_provider
                .delete(
                    source,
                    DeleteOptions::default()
                        .with_recursive(true)
                        .with_trash(false),
                )
                .await?;
        }
        Ok(())
    }

    /// Starts watching the entries matching `pattern`.
    #[instrument(skip(self))]
    pub fn create_watcher(
        &self,
        pattern: &str,
        options: WatchOptions,
    ) -> PathfsResult<FileSystemWatcher> {
        let pattern = GlobPattern::parse(pattern)?;
        let provider = self.provider(pattern.base().scheme())?;
        FileSystemWatcher::start(provider.as_ref(), pattern, options)
    }
}

/// Absent entries, including paths that run through a file.
fn is_missing(error: &PathfsError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::NotFound { .. } | ErrorKind::NotADirectory { .. }
    )
}

/// Recursive copy through provider reads and writes, parents before children.
async fn copy_across(
    from: &dyn FileSystemProvider,
    source: &Locator,
    to: &dyn FileSystemProvider,
    target: &Locator,
) -> PathfsResult<()> {
    let mut pending = vec![(source.clone(), target.clone())];
    while let Some((from_locator, to_locator)) = pending.pop() {
        if from.stat(&from_locator).await?.is_directory() {
            to.create_directory(&to_locator).await?;
            for (name, _) in from.read_directory(&from_locator).await? {
                pending.push((from_locator.join(&name), to_locator.join(&name)));
            }
        } else {
            let content = from.read_file(&from_locator).await?;
            to.write_file(&to_locator, &content).await?;
        }
    }
    Ok(())
}

/* 📖 # Why wrap the Vfs in VfsHandle?

The facade and every watcher hold the same registry. VfsHandle is an `Arc<Vfs>` that
derefs to the Vfs, so it can be cloned into tasks without lifetimes.
*/

/// Shared handle to a [`Vfs`].
///
/// # Examples
///
/// ```
/// use pathfs_base::{MemoryProvider, Vfs, VfsHandle};
///
/// let vfs = Vfs::new();
/// vfs.register_provider("mem", MemoryProvider::new()).unwrap();
/// let handle = VfsHandle::new(vfs);
/// assert_eq!(handle.clone().is_writable_file_system("mem"), Some(true));
/// assert_eq!(handle.is_writable_file_system("ftp"), None);
/// ```
#[derive(Debug, Clone)]
pub struct VfsHandle(Arc<Vfs>);

impl VfsHandle {
    pub fn new(vfs: Vfs) -> Self {
        Self(Arc::new(vfs))
    }
}

impl std::ops::Deref for VfsHandle {
    type Target = Vfs;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryProvider;

    fn loc(input: &str) -> Locator {
        Locator::parse(input).unwrap()
    }

    fn memory_vfs() -> (Vfs, MemoryProvider) {
        let memory = MemoryProvider::new();
        let vfs = Vfs::new();
        vfs.register_provider("mem", memory.clone()).unwrap();
        (vfs, memory)
    }

    #[test]
    fn test_register_same_scheme_twice_fails() {
        let (vfs, _memory) = memory_vfs();
        let err = vfs
            .register_provider("MEM", MemoryProvider::new())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyExists { .. }));
        assert_eq!(vfs.schemes(), vec!["mem".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let (vfs, _memory) = memory_vfs();
        let err = vfs.stat(&loc("ftp://host/x")).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SchemeUnsupported { .. }));
    }

    #[tokio::test]
    async fn test_create_directory_creates_ancestors() {
        let (vfs, memory) = memory_vfs();
        vfs.create_directory(&loc("mem:/a/b/c")).await.unwrap();
        vfs.create_directory(&loc("mem:/a/b/c")).await.unwrap();

        assert!(memory.stat(&loc("mem:/a/b")).await.unwrap().is_directory());
        assert_eq!(memory.entry_count(), 3);
    }

    #[tokio::test]
    async fn test_create_directory_over_file() {
        let (vfs, memory) = memory_vfs();
        memory.add_file("/a", "x");

        let err = vfs.create_directory(&loc("mem:/a/b")).await.unwrap_err();
        match err.kind() {
            ErrorKind::AlreadyExistsAsFile { locator } => assert_eq!(locator, "mem:/a"),
            other => panic!("Expected AlreadyExistsAsFile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let (vfs, memory) = memory_vfs();
        vfs.write_file(&loc("mem:/x/y/z.txt"), b"z").await.unwrap();
        assert_eq!(memory.read_file(&loc("mem:/x/y/z.txt")).await.unwrap(), b"z");
    }

    #[tokio::test]
    async fn test_readonly_provider_rejects_mutations() {
        let vfs = Vfs::new();
        let memory = MemoryProvider::new();
        memory.add_file("/f", "x");
        vfs.register_provider("ro", memory.into_readonly()).unwrap();

        assert_eq!(vfs.is_writable_file_system("ro"), Some(false));
        assert_eq!(vfs.read_file(&loc("ro:/f")).await.unwrap(), b"x");
        let err = vfs.write_file(&loc("ro:/f"), b"y").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PermissionDenied { .. }));
        let err = vfs
            .delete(&loc("ro:/f"), DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_copy_into_itself_fails() {
        let (vfs, memory) = memory_vfs();
        memory.add_directory("/d");

        let err = vfs
            .copy(&loc("mem:/d"), &loc("mem:/d/inner"), CopyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn test_move_over_own_ancestor_keeps_tree() {
        let (vfs, memory) = memory_vfs();
        memory.add_file("/a/b/keep.txt", "keep");

        for transfer in [Transfer::Move, Transfer::Copy] {
            let err = vfs
                .transfer(
                    &loc("mem:/a/b"),
                    &loc("mem:/a"),
                    CopyOptions::overwrite(),
                    transfer,
                )
                .await
                .unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
        }
        assert_eq!(
            memory.read_file(&loc("mem:/a/b/keep.txt")).await.unwrap(),
            b"keep"
        );
        assert_eq!(memory.entry_count(), 3);
    }

    #[tokio::test]
    async fn test_local_paths_through_a_file_report_the_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let vfs = Vfs::new();
        vfs.register_provider(
            "disk",
            crate::vfs::LocalProvider::rooted(temp_dir.path().to_path_buf()),
        )
        .unwrap();
        vfs.write_file(&loc("disk:/taken"), b"x").await.unwrap();

        let err = vfs
            .create_directory(&loc("disk:/taken/sub/deeper"))
            .await
            .unwrap_err();
        match err.kind() {
            ErrorKind::AlreadyExistsAsFile { locator } => assert_eq!(locator, "disk:/taken"),
            other => panic!("Expected AlreadyExistsAsFile, got {:?}", other),
        }

        let err = vfs
            .write_file(&loc("disk:/taken/sub/f.txt"), b"y")
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyExistsAsFile { .. }));
    }

    #[tokio::test]
    async fn test_rename_to_itself_is_noop() {
        let (vfs, memory) = memory_vfs();
        memory.add_file("/f", "x");

        vfs.rename(&loc("mem:/f"), &loc("mem:/f"), CopyOptions::default())
            .await
            .unwrap();
        assert_eq!(memory.read_file(&loc("mem:/f")).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_rename_overwrite() {
        let (vfs, memory) = memory_vfs();
        memory.add_file("/a", "a");
        memory.add_file("/b", "b");

        let err = vfs
            .rename(&loc("mem:/a"), &loc("mem:/b"), CopyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyExists { .. }));

        vfs.rename(&loc("mem:/a"), &loc("mem:/b"), CopyOptions::overwrite())
            .await
            .unwrap();
        assert!(memory.stat(&loc("mem:/a")).await.unwrap_err().is_not_found());
        assert_eq!(memory.read_file(&loc("mem:/b")).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_copy_across_providers() {
        let (vfs, memory) = memory_vfs();
        let other = MemoryProvider::new();
        vfs.register_provider("other", other.clone()).unwrap();
        memory.add_file("/tree/a.txt", "a");
        memory.add_file("/tree/sub/b.txt", "b");

        vfs.copy(
            &loc("mem:/tree"),
            &loc("other:/copy/tree"),
            CopyOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            other.read_file(&loc("other:/copy/tree/a.txt")).await.unwrap(),
            b"a"
        );
        assert_eq!(
            other.read_file(&loc("other:/copy/tree/sub/b.txt")).await.unwrap(),
            b"b"
        );
        assert!(memory.stat(&loc("mem:/tree/a.txt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rename_across_providers_removes_source() {
        let (vfs, memory) = memory_vfs();
        let other = MemoryProvider::new();
        vfs.register_provider("other", other.clone()).unwrap();
        memory.add_file("/tree/a.txt", "a");

        vfs.rename(&loc("mem:/tree"), &loc("other:/tree"), CopyOptions::default())
            .await
            .unwrap();

        assert!(memory.stat(&loc("mem:/tree")).await.unwrap_err().is_not_found());
        assert_eq!(other.read_file(&loc("other:/tree/a.txt")).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_create_watcher_routes_to_provider() {
        let (vfs, memory) = memory_vfs();
        let mut watcher = vfs
            .create_watcher("mem:/logs/*.log", WatchOptions::default())
            .unwrap();
        assert_eq!(memory.watcher_count(), 1);

        vfs.write_file(&loc("mem:/logs/app.log"), b"line").await.unwrap();
        let change = watcher.try_recv().unwrap();
        assert_eq!(change.locator, loc("mem:/logs/app.log"));
    }

    #[test]
    fn test_create_watcher_unknown_scheme() {
        let (vfs, _memory) = memory_vfs();
        let err = vfs
            .create_watcher("ftp://host/*.txt", WatchOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SchemeUnsupported { .. }));
    }
}
