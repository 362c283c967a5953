use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::error::ErrorKind;
use crate::{PathfsError, PathfsResult};

use super::locator::Locator;
use super::metadata::{DirectoryEntry, FileStat, FileType};
use super::traits::{
    DeleteOptions, FileChange, FileChangeCallback, FileChangeKind, FileSystemProvider,
    ProviderCapabilities, WatchRegistration,
};

/// Provider backed by the real filesystem via `tokio::fs`.
///
/// Without a root, the locator path is the OS path (the `file:` scheme). With a root,
/// locator paths resolve below that directory, which is how rooted mounts are served.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    root: Option<PathBuf>,
    trash_dir: Option<PathBuf>,
    readonly: bool,
}

impl LocalProvider {
    /// Provider for `file:` locators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider serving locator paths below `root`.
    pub fn rooted(root: PathBuf) -> Self {
        Self {
            root: Some(root),
            ..Self::default()
        }
    }

    /// Deleted entries are moved into `trash_dir` when the caller asks for the trash.
    pub fn with_trash_dir(mut self, trash_dir: PathBuf) -> Self {
        self.trash_dir = Some(trash_dir);
        self
    }

    pub fn into_readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Resolve a locator to an absolute filesystem path.
    fn resolve_path(&self, locator: &Locator) -> PathfsResult<PathBuf> {
        match &self.root {
            None => locator.to_file_path(),
            Some(root) => Ok(locator.to_relative_path().to_path(root)),
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn move_to_trash(&self, trash_dir: &Path, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(trash_dir).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string());
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let destination = trash_dir.join(format!("{}.{}", name, stamp));
        debug!(destination = %destination.display(), "moving entry to trash");
        tokio::fs::rename(path, &destination).await
    }
}

fn io_error(locator: &Locator) -> impl FnOnce(io::Error) -> Box<PathfsError> + '_ {
    move |e| {
        debug!(error = %e, "filesystem call failed");
        Box::new(PathfsError::from_io(locator, e))
    }
}

/// Recursive copy of a directory tree; runs on the blocking pool.
fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

/// Translates one notify event into zero or more changes below `base`.
fn map_event(event: &Event, base_path: &Path, base: &Locator) -> Vec<FileChange> {
    let kinds: Vec<FileChangeKind> = match &event.kind {
        EventKind::Create(_) => vec![FileChangeKind::Created; event.paths.len()],
        EventKind::Remove(_) => vec![FileChangeKind::Deleted; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            vec![FileChangeKind::Deleted; event.paths.len()]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            vec![FileChangeKind::Created; event.paths.len()]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            vec![FileChangeKind::Deleted, FileChangeKind::Created]
        }
        EventKind::Modify(_) => vec![FileChangeKind::Changed; event.paths.len()],
        _ => return vec![],
    };
    event
        .paths
        .iter()
        .zip(kinds)
        .filter_map(|(path, kind)| {
            let relative = path.strip_prefix(base_path).ok()?;
            let relative = relative.to_string_lossy().replace('\\', "/");
            Some(FileChange::new(kind, base.join(&relative)))
        })
        .collect()
}

#[async_trait]
impl FileSystemProvider for LocalProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            readonly: self.readonly,
            trash: self.trash_dir.is_some(),
        }
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn stat(&self, locator: &Locator) -> PathfsResult<FileStat> {
        let resolved = self.resolve_path(locator)?;
        let link_metadata = tokio::fs::symlink_metadata(&resolved)
            .await
            .map_err(io_error(locator))?;
        let target = if link_metadata.file_type().is_symlink() {
            tokio::fs::metadata(&resolved).await.ok()
        } else {
            None
        };
        Ok(FileStat::from_std(&link_metadata, target.as_ref()))
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn read_directory(&self, locator: &Locator) -> PathfsResult<Vec<DirectoryEntry>> {
        let resolved = self.resolve_path(locator)?;
        debug!(resolved = %resolved.display(), "listing directory");
        let mut read_dir = tokio::fs::read_dir(&resolved)
            .await
            .map_err(io_error(locator))?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(io_error(locator))? {
            let file_type = entry
                .file_type()
                .await
                .map(FileType::from_std)
                .unwrap_or(FileType::Unknown);
            entries.push((entry.file_name().to_string_lossy().into_owned(), file_type));
        }
        debug!(count = entries.len(), "directory listed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn create_directory(&self, locator: &Locator) -> PathfsResult<()> {
        let resolved = self.resolve_path(locator)?;
        tokio::fs::create_dir(&resolved)
            .await
            .map_err(io_error(locator))?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn read_file(&self, locator: &Locator) -> PathfsResult<Vec<u8>> {
        let resolved = self.resolve_path(locator)?;
        let content = tokio::fs::read(&resolved).await.map_err(io_error(locator))?;
        debug!(bytes = content.len(), "file read");
        Ok(content)
    }

    #[instrument(skip(self, content), fields(locator = %locator, bytes = content.len()))]
    async fn write_file(&self, locator: &Locator, content: &[u8]) -> PathfsResult<()> {
        let resolved = self.resolve_path(locator)?;
        tokio::fs::write(&resolved, content)
            .await
            .map_err(io_error(locator))?;
        debug!("file written");
        Ok(())
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn delete(&self, locator: &Locator, options: DeleteOptions) -> PathfsResult<()> {
        let resolved = self.resolve_path(locator)?;
        let metadata = tokio::fs::symlink_metadata(&resolved)
            .await
            .map_err(io_error(locator))?;

        if let (true, Some(trash_dir)) = (options.use_trash, &self.trash_dir) {
            return self
                .move_to_trash(trash_dir, &resolved)
                .await
                .map_err(io_error(locator));
        }

        let result = if metadata.is_dir() {
            if options.recursive {
                tokio::fs::remove_dir_all(&resolved).await
            } else {
                tokio::fs::remove_dir(&resolved).await
            }
        } else {
            tokio::fs::remove_file(&resolved).await
        };
        result.map_err(io_error(locator))?;
        debug!("entry deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(source = %source, target = %target))]
    async fn rename(&self, source: &Locator, target: &Locator) -> PathfsResult<()> {
        let from = self.resolve_path(source)?;
        let to = self.resolve_path(target)?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(io_error(source))?;
        debug!("entry renamed");
        Ok(())
    }

    #[instrument(skip(self), fields(source = %source, target = %target))]
    async fn copy(&self, source: &Locator, target: &Locator) -> PathfsResult<()> {
        let from = self.resolve_path(source)?;
        let to = self.resolve_path(target)?;
        let metadata = tokio::fs::metadata(&from)
            .await
            .map_err(io_error(source))?;
        if metadata.is_dir() {
            tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                .await
                .map_err(|e| crate::err!("Directory copy task failed: {}", e))?
                .map_err(io_error(source))?;
        } else {
            tokio::fs::copy(&from, &to)
                .await
                .map_err(io_error(source))?;
        }
        debug!("entry copied");
        Ok(())
    }

    #[instrument(skip(self, callback), fields(base = %base))]
    fn watch(
        &self,
        base: &Locator,
        callback: FileChangeCallback,
    ) -> PathfsResult<WatchRegistration> {
        let base_path = self.resolve_path(base)?;
        if !base_path.exists() {
            debug!("watch base not found");
            return Err(ErrorKind::NotFound {
                locator: base.to_string(),
            }
            .into());
        }

        let event_base_path = base_path.clone();
        let event_base = base.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for change in map_event(&event, &event_base_path, &event_base) {
                        callback(change);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher reported an error"),
            }
        })
        .map_err(|e| crate::err!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&base_path, RecursiveMode::Recursive)
            .map_err(|e| crate::err!("Failed to watch {}: {}", base, e))?;
        debug!(resolved = %base_path.display(), "directory watch registered");
        Ok(WatchRegistration::new(watcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, LocalProvider, Locator) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = Locator::parse("vault:/").unwrap();
        let provider = LocalProvider::rooted(temp_dir.path().to_path_buf());
        (temp_dir, provider, base)
    }

    #[tokio::test]
    async fn test_stat_file() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::write(temp_dir.path().join("test.txt"), "content").unwrap();

        let stat = provider.stat(&base.join("test.txt")).await.unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 7);
    }

    #[tokio::test]
    async fn test_stat_not_found() {
        let (_temp_dir, provider, base) = setup_test_dir();
        let err = provider.stat(&base.join("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unrooted_provider_uses_os_paths() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "abc").unwrap();
        let provider = LocalProvider::new();

        let locator = Locator::from_file_path(&temp_dir.path().join("a.txt")).unwrap();
        assert_eq!(provider.read_file(&locator).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_read_directory() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::write(temp_dir.path().join("a.rs"), "").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let mut entries = provider.read_directory(&base).await.unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("a.rs".to_string(), FileType::File),
                ("sub".to_string(), FileType::Directory),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_directory_on_file_fails() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::write(temp_dir.path().join("f"), "").unwrap();

        let err = provider.read_directory(&base.join("f")).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let (temp_dir, provider, base) = setup_test_dir();
        provider
            .write_file(&base.join("new.txt"), b"test content")
            .await
            .unwrap();

        let content = fs::read_to_string(temp_dir.path().join("new.txt")).unwrap();
        assert_eq!(content, "test content");
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("d")).unwrap();
        fs::write(temp_dir.path().join("d/f"), "x").unwrap();

        let err = provider
            .delete(&base.join("d"), DeleteOptions::default().with_trash(false))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DirectoryNotEmpty { .. }));

        provider
            .delete(
                &base.join("d"),
                DeleteOptions::default().with_recursive(true).with_trash(false),
            )
            .await
            .unwrap();
        assert!(!temp_dir.path().join("d").exists());
    }

    #[tokio::test]
    async fn test_delete_moves_to_trash() {
        let (temp_dir, provider, base) = setup_test_dir();
        let trash = TempDir::new().unwrap();
        let provider = provider.with_trash_dir(trash.path().to_path_buf());
        assert!(provider.capabilities().trash);
        fs::write(temp_dir.path().join("old.txt"), "bye").unwrap();

        provider
            .delete(&base.join("old.txt"), DeleteOptions::default())
            .await
            .unwrap();

        assert!(!temp_dir.path().join("old.txt").exists());
        let trashed: Vec<_> = fs::read_dir(trash.path()).unwrap().collect();
        assert_eq!(trashed.len(), 1);
    }

    #[tokio::test]
    async fn test_copy_directory_tree() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::create_dir_all(temp_dir.path().join("src/nested")).unwrap();
        fs::write(temp_dir.path().join("src/nested/file.txt"), "deep").unwrap();

        provider
            .copy(&base.join("src"), &base.join("dst"))
            .await
            .unwrap();

        let copied = fs::read_to_string(temp_dir.path().join("dst/nested/file.txt")).unwrap();
        assert_eq!(copied, "deep");
        assert!(temp_dir.path().join("src/nested/file.txt").exists());
    }

    #[tokio::test]
    async fn test_rename() {
        let (temp_dir, provider, base) = setup_test_dir();
        fs::write(temp_dir.path().join("a"), "x").unwrap();

        provider.rename(&base.join("a"), &base.join("b")).await.unwrap();

        assert!(!temp_dir.path().join("a").exists());
        assert!(temp_dir.path().join("b").exists());
    }

    #[test]
    fn test_watch_not_found() {
        let (_temp_dir, provider, base) = setup_test_dir();
        let result = provider.watch(&base.join("nonexistent"), Box::new(|_| {}));
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_map_event_rename_both() {
        let base = Locator::parse("vault:/").unwrap();
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/root/a.txt"))
            .add_path(PathBuf::from("/root/b.txt"));

        let changes = map_event(&event, Path::new("/root"), &base);
        assert_eq!(
            changes,
            vec![
                FileChange::new(FileChangeKind::Deleted, base.join("a.txt")),
                FileChange::new(FileChangeKind::Created, base.join("b.txt")),
            ]
        );
    }

    #[test]
    fn test_map_event_ignores_access() {
        let base = Locator::parse("vault:/").unwrap();
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/root/a.txt"));
        assert!(map_event(&event, Path::new("/root"), &base).is_empty());
    }
}
