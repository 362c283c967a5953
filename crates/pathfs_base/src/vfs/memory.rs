use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use relative_path::RelativePathBuf;
use tracing::{debug, instrument};

use crate::PathfsResult;
use crate::error::ErrorKind;

use super::locator::Locator;
use super::metadata::{DirectoryEntry, FileStat, FileType};
use super::traits::{
    DeleteOptions, FileChange, FileChangeCallback, FileChangeKind, FileSystemProvider,
    ProviderCapabilities, WatchRegistration,
};

/* 📖 # How does MemoryProvider store entries?

Entries live in a BTreeMap keyed by the locator path relative to the root (`a/b.txt`),
so the children of `a` are the keys whose parent is `a` and a whole subtree is a key
range. The root itself is implicit and always a directory. Locator authorities are not
part of the key.

Watch callbacks run after the lock is released; a callback may call back into the
provider.
*/

#[derive(Debug, Clone)]
enum Entry {
    File {
        content: Vec<u8>,
        ctime: SystemTime,
        mtime: SystemTime,
    },
    Directory {
        ctime: SystemTime,
        mtime: SystemTime,
    },
}

impl Entry {
    fn directory() -> Self {
        let now = SystemTime::now();
        Entry::Directory {
            ctime: now,
            mtime: now,
        }
    }

    fn file(content: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Entry::File {
            content,
            ctime: now,
            mtime: now,
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    fn stat(&self, readonly: bool) -> FileStat {
        match self {
            Entry::File {
                content,
                ctime,
                mtime,
            } => FileStat {
                file_type: FileType::File,
                size: content.len() as u64,
                ctime: *ctime,
                mtime: *mtime,
                readonly,
            },
            Entry::Directory { ctime, mtime } => FileStat {
                file_type: FileType::Directory,
                size: 0,
                ctime: *ctime,
                mtime: *mtime,
                readonly,
            },
        }
    }
}

struct MemoryWatcher {
    id: u64,
    base: Locator,
    callback: Arc<dyn Fn(FileChange) + Send + Sync>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<RelativePathBuf, Entry>,
    watchers: Vec<MemoryWatcher>,
    next_watcher_id: u64,
}

impl State {
    /// Entry at `key`; the root is always a directory.
    fn lookup(&self, key: &RelativePathBuf) -> Option<Entry> {
        if key.as_str().is_empty() {
            return Some(Entry::directory());
        }
        self.entries.get(key).cloned()
    }

    fn has_children(&self, key: &RelativePathBuf) -> bool {
        self.subtree_keys(key).iter().any(|k| k != key)
    }

    /// `key` and every key below it.
    fn subtree_keys(&self, key: &RelativePathBuf) -> Vec<RelativePathBuf> {
        let prefix = format!("{}/", key.as_str());
        self.entries
            .keys()
            .filter(|k| key.as_str().is_empty() || *k == key || k.as_str().starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Checks that the parent of `locator` is an existing directory.
    fn require_parent_directory(&self, locator: &Locator) -> PathfsResult<()> {
        let Some(parent) = locator.parent() else {
            return Ok(());
        };
        match self.lookup(&parent.to_relative_path()) {
            Some(entry) if entry.is_directory() => Ok(()),
            Some(_) => Err(ErrorKind::NotADirectory {
                locator: parent.to_string(),
            }
            .into()),
            None => Err(ErrorKind::NotFound {
                locator: parent.to_string(),
            }
            .into()),
        }
    }

    fn insert_with_parents(&mut self, key: RelativePathBuf, entry: Entry) {
        let mut ancestor = parent_key(key.as_str()).map(str::to_string);
        while let Some(dir) = ancestor {
            if dir.is_empty() {
                break;
            }
            self.entries
                .entry(RelativePathBuf::from(dir.as_str()))
                .or_insert_with(Entry::directory);
            ancestor = parent_key(&dir).map(str::to_string);
        }
        self.entries.insert(key, entry);
    }
}

fn parent_key(key: &str) -> Option<&str> {
    if key.is_empty() {
        return None;
    }
    Some(key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(""))
}

fn not_found(locator: &Locator) -> Box<crate::PathfsError> {
    ErrorKind::NotFound {
        locator: locator.to_string(),
    }
    .into()
}

/// In-memory provider.
///
/// Stores entries in a BTreeMap and supports every provider operation without
/// touching the real filesystem. Used for tests and for `kind = "memory"` mounts.
///
/// # Examples
///
/// ```
/// use pathfs_base::{Locator, MemoryProvider, FileSystemProvider};
///
/// # tokio_test_block_on(async {
/// let memory = MemoryProvider::new();
/// memory.add_file("/docs/readme.md", "hello");
/// let content = memory.read_file(&Locator::parse("mem:/docs/readme.md").unwrap()).await.unwrap();
/// assert_eq!(content, b"hello");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryProvider {
    state: Arc<RwLock<State>>,
    readonly: bool,
}

impl MemoryProvider {
    /// Create a new empty, writable MemoryProvider.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            readonly: false,
        }
    }

    /// Marks the provider readonly. Seeding through `add_file` still works.
    pub fn into_readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Add a file, creating missing parent directories.
    pub fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        let key = RelativePathBuf::from(path.trim_start_matches('/'));
        self.state
            .write()
            .insert_with_parents(key, Entry::file(content.into()));
    }

    /// Add a directory, creating missing parent directories.
    pub fn add_directory(&self, path: &str) {
        let key = RelativePathBuf::from(path.trim_start_matches('/'));
        self.state
            .write()
            .insert_with_parents(key, Entry::directory());
    }

    /// Number of stored entries, not counting the root.
    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.state.read().watchers.len()
    }

    fn notify(&self, changes: Vec<FileChange>) {
        for change in changes {
            let callbacks: Vec<_> = self
                .state
                .read()
                .watchers
                .iter()
                .filter(|watcher| change.locator.relative_to(&watcher.base).is_some())
                .map(|watcher| watcher.callback.clone())
                .collect();
            for callback in callbacks {
                callback(change.clone());
            }
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryProvider")
            .field("entries", &state.entries.len())
            .field("watchers", &state.watchers.len())
            .field("readonly", &self.readonly)
            .finish()
    }
}

#[async_trait]
impl FileSystemProvider for MemoryProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            readonly: self.readonly,
            trash: false,
        }
    }

    async fn stat(&self, locator: &Locator) -> PathfsResult<FileStat> {
        let state = self.state.read();
        state
            .lookup(&locator.to_relative_path())
            .map(|entry| entry.stat(self.readonly))
            .ok_or_else(|| not_found(locator))
    }

    async fn read_directory(&self, locator: &Locator) -> PathfsResult<Vec<DirectoryEntry>> {
        let key = locator.to_relative_path();
        let state = self.state.read();
        match state.lookup(&key) {
            Some(entry) if entry.is_directory() => {}
            Some(_) => {
                return Err(ErrorKind::NotADirectory {
                    locator: locator.to_string(),
                }
                .into());
            }
            None => return Err(not_found(locator)),
        }
        Ok(state
            .entries
            .iter()
            .filter(|(k, _)| parent_key(k.as_str()) == Some(key.as_str()))
            .map(|(k, entry)| {
                let name = k.file_name().unwrap_or_default().to_string();
                let file_type = if entry.is_directory() {
                    FileType::Directory
                } else {
                    FileType::File
                };
                (name, file_type)
            })
            .collect())
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn create_directory(&self, locator: &Locator) -> PathfsResult<()> {
        {
            let mut state = self.state.write();
            state.require_parent_directory(locator)?;
            let key = locator.to_relative_path();
            if state.lookup(&key).is_some() {
                return Err(ErrorKind::AlreadyExists {
                    locator: locator.to_string(),
                }
                .into());
            }
            state.entries.insert(key, Entry::directory());
        }
        debug!("directory created");
        self.notify(vec![FileChange::new(
            FileChangeKind::Created,
            locator.clone(),
        )]);
        Ok(())
    }

    async fn read_file(&self, locator: &Locator) -> PathfsResult<Vec<u8>> {
        let state = self.state.read();
        match state.lookup(&locator.to_relative_path()) {
            Some(Entry::File { content, .. }) => Ok(content),
            Some(Entry::Directory { .. }) => Err(ErrorKind::FileIsDirectory {
                locator: locator.to_string(),
            }
            .into()),
            None => Err(not_found(locator)),
        }
    }

    #[instrument(skip(self, content), fields(locator = %locator, bytes = content.len()))]
    async fn write_file(&self, locator: &Locator, content: &[u8]) -> PathfsResult<()> {
        let kind = {
            let mut state = self.state.write();
            state.require_parent_directory(locator)?;
            let key = locator.to_relative_path();
            match state.entries.get_mut(&key) {
                Some(Entry::Directory { .. }) => {
                    return Err(ErrorKind::FileIsDirectory {
                        locator: locator.to_string(),
                    }
                    .into());
                }
                Some(Entry::File {
                    content: existing,
                    mtime,
                    ..
                }) => {
                    *existing = content.to_vec();
                    *mtime = SystemTime::now();
                    FileChangeKind::Changed
                }
                None => {
                    state.entries.insert(key, Entry::file(content.to_vec()));
                    FileChangeKind::Created
                }
            }
        };
        debug!(?kind, "file written");
        self.notify(vec![FileChange::new(kind, locator.clone())]);
        Ok(())
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn delete(&self, locator: &Locator, options: DeleteOptions) -> PathfsResult<()> {
        let removed = {
            let mut state = self.state.write();
            let key = locator.to_relative_path();
            if key.as_str().is_empty() {
                return Err(ErrorKind::InvalidOperation {
                    message: format!("Cannot delete the root of {}", locator),
                }
                .into());
            }
            let Some(entry) = state.lookup(&key) else {
                return Err(not_found(locator));
            };
            if entry.is_directory() && !options.recursive && state.has_children(&key) {
                return Err(ErrorKind::DirectoryNotEmpty {
                    locator: locator.to_string(),
                }
                .into());
            }
            let mut removed = state.subtree_keys(&key);
            for key in &removed {
                state.entries.remove(key);
            }
            // Children before their directory.
            removed.sort_by(|a, b| b.cmp(a));
            removed
        };
        debug!(count = removed.len(), "entry deleted");
        self.notify(subtree_changes(FileChangeKind::Deleted, locator, &removed));
        Ok(())
    }

    #[instrument(skip(self), fields(source = %source, target = %target))]
    async fn rename(&self, source: &Locator, target: &Locator) -> PathfsResult<()> {
        let (removed, created) = {
            let mut state = self.state.write();
            let source_key = source.to_relative_path();
            if state.entries.get(&source_key).is_none() {
                return Err(not_found(source));
            }
            state.require_parent_directory(target)?;
            let target_key = target.to_relative_path();
            let mut removed = state.subtree_keys(&source_key);
            removed.sort();
            let mut created = Vec::with_capacity(removed.len());
            for key in &removed {
                if let Some(entry) = state.entries.remove(key) {
                    let moved = rebase_key(key, &source_key, &target_key);
                    state.entries.insert(moved.clone(), entry);
                    created.push(moved);
                }
            }
            removed.reverse();
            (removed, created)
        };
        debug!(count = created.len(), "entry renamed");
        let mut changes = subtree_changes(FileChangeKind::Deleted, source, &removed);
        changes.extend(subtree_changes(FileChangeKind::Created, target, &created));
        self.notify(changes);
        Ok(())
    }

    #[instrument(skip(self), fields(source = %source, target = %target))]
    async fn copy(&self, source: &Locator, target: &Locator) -> PathfsResult<()> {
        let created = {
            let mut state = self.state.write();
            let source_key = source.to_relative_path();
            if state.lookup(&source_key).is_none() {
                return Err(not_found(source));
            }
            state.require_parent_directory(target)?;
            let target_key = target.to_relative_path();
            let now = SystemTime::now();
            let mut copies: Vec<_> = state
                .subtree_keys(&source_key)
                .into_iter()
                .filter_map(|key| {
                    let entry = match state.entries.get(&key)? {
                        Entry::File { content, .. } => Entry::File {
                            content: content.clone(),
                            ctime: now,
                            mtime: now,
                        },
                        Entry::Directory { .. } => Entry::Directory {
                            ctime: now,
                            mtime: now,
                        },
                    };
                    Some((rebase_key(&key, &source_key, &target_key), entry))
                })
                .collect();
            if source_key.as_str().is_empty() {
                copies.push((target_key.clone(), Entry::directory()));
            }
            copies.sort_by(|(a, _), (b, _)| a.cmp(b));
            let created: Vec<_> = copies.iter().map(|(key, _)| key.clone()).collect();
            state.entries.extend(copies);
            created
        };
        debug!(count = created.len(), "entry copied");
        self.notify(subtree_changes(FileChangeKind::Created, target, &created));
        Ok(())
    }

    fn watch(
        &self,
        base: &Locator,
        callback: FileChangeCallback,
    ) -> PathfsResult<WatchRegistration> {
        let mut state = self.state.write();
        let id = state.next_watcher_id;
        state.next_watcher_id += 1;
        state.watchers.push(MemoryWatcher {
            id,
            base: base.clone(),
            callback: Arc::from(callback),
        });
        debug!(id, base = %base, "memory watch registered");
        Ok(WatchRegistration::new(MemoryWatchGuard {
            state: Arc::downgrade(&self.state),
            id,
        }))
    }
}

/// One change per key, as locators on the scheme and authority of `anchor`.
fn subtree_changes(
    kind: FileChangeKind,
    anchor: &Locator,
    keys: &[RelativePathBuf],
) -> Vec<FileChange> {
    keys.iter()
        .map(|key| FileChange::new(kind, anchor.with_path(&format!("/{}", key.as_str()))))
        .collect()
}

/// Replaces the `from` prefix of `key` with `to`.
fn rebase_key(key: &RelativePathBuf, from: &RelativePathBuf, to: &RelativePathBuf) -> RelativePathBuf {
    let rest = key
        .as_str()
        .strip_prefix(from.as_str())
        .unwrap_or_default()
        .trim_start_matches('/');
    if rest.is_empty() {
        to.clone()
    } else if to.as_str().is_empty() {
        RelativePathBuf::from(rest)
    } else {
        to.join(rest)
    }
}

struct MemoryWatchGuard {
    state: Weak<RwLock<State>>,
    id: u64,
}

impl Drop for MemoryWatchGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.write().watchers.retain(|watcher| watcher.id != self.id);
        }
    }
}
