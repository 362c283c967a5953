use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use pathfs_base::{
    CopyOptions, DeleteOptions, DirectoryEntry, FileStat, FileSystemWatcher, Locator,
    PathfsResult, ResultExt, VfsHandle, WatchOptions,
};

use crate::access::FileAccess;
use crate::config::Config;
use crate::json::{JsonWriteOptions, from_json_text, to_json_text};
use crate::text::{
    DEFAULT_ENCODING, FileContent, ReadOptions, decode, resolve_encoding, truncate_chars,
};

/* 📖 # What does FileSystem do itself?

Very little. Every operation is a single call into the Vfs it was constructed with.
On top of that it converts text to bytes (always UTF-8) and bytes to text (any WHATWG
encoding), turns a failed `stat` into `false` for `exists`, and classifies schemes for
`access`.

`append_file` and `truncate` read the whole file and write it back. Nothing locks the
file in between, so a concurrent writer can be overwritten.
*/

/// Asynchronous file operations over a [`VfsHandle`].
///
/// # Examples
///
/// ```
/// use pathfs_base::{MemoryProvider, Vfs, VfsHandle};
/// use pathfs_fs::{FileSystem, Locator, ReadOptions};
///
/// # tokio_test_block_on(async {
/// let vfs = Vfs::new();
/// vfs.register_provider("mem", MemoryProvider::new()).unwrap();
/// let fs = FileSystem::new(VfsHandle::new(vfs));
///
/// let notes = Locator::parse("mem:/notes.txt").unwrap();
/// fs.write_file(&notes, "abc").await.unwrap();
/// fs.append_file(&notes, "def").await.unwrap();
/// assert_eq!(fs.read_file(&notes, &ReadOptions::default()).await.unwrap(), "abcdef");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSystem {
    vfs: VfsHandle,
    default_encoding: String,
}

impl FileSystem {
    pub fn new(vfs: VfsHandle) -> Self {
        Self {
            vfs,
            default_encoding: DEFAULT_ENCODING.to_string(),
        }
    }

    /// Builds the Vfs described by `config` and a file system on top of it.
    pub fn from_config(config: &Config) -> PathfsResult<Self> {
        let vfs = config.build_vfs()?;
        Ok(Self::new(vfs).with_default_encoding(&config.encoding))
    }

    /// Encoding label used by `read_file` when the options name none.
    pub fn with_default_encoding(mut self, label: &str) -> Self {
        self.default_encoding = label.to_string();
        self
    }

    pub fn vfs(&self) -> &VfsHandle {
        &self.vfs
    }

    pub async fn stat(&self, locator: &Locator) -> PathfsResult<FileStat> {
        self.vfs.stat(locator).await
    }

    pub async fn read_directory(&self, locator: &Locator) -> PathfsResult<Vec<DirectoryEntry>> {
        self.vfs.read_directory(locator).await
    }

    /// Creates the directory and any missing ancestors.
    pub async fn create_directory(&self, locator: &Locator) -> PathfsResult<()> {
        self.vfs.create_directory(locator).await
    }

    /// Reads the file and decodes it as text.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn read_file(&self, locator: &Locator, options: &ReadOptions) -> PathfsResult<String> {
        let label = options
            .encoding
            .as_deref()
            .unwrap_or(&self.default_encoding);
        let encoding = resolve_encoding(label)?;
        let bytes = self.vfs.read_file(locator).await?;
        decode(&bytes, encoding, options.fatal, options.ignore_bom)
            .with_context(|| format!("Failed to decode {}", locator))
    }

    pub async fn read_file_bytes(&self, locator: &Locator) -> PathfsResult<Vec<u8>> {
        self.vfs.read_file(locator).await
    }

    /// Replaces the content of the file, creating it and its parents when missing.
    pub async fn write_file(
        &self,
        locator: &Locator,
        content: impl Into<FileContent>,
    ) -> PathfsResult<()> {
        let content = content.into();
        self.vfs.write_file(locator, content.as_bytes()).await
    }

    /// Appends to the file, creating it when missing.
    ///
    /// Reads the existing bytes and writes the concatenation back. This is not atomic.
    #[instrument(skip(self, content), fields(locator = %locator))]
    pub async fn append_file(
        &self,
        locator: &Locator,
        content: impl Into<FileContent>,
    ) -> PathfsResult<()> {
        let mut bytes = if self.exists(locator).await {
            self.vfs.read_file(locator).await?
        } else {
            debug!("file does not exist yet, creating it");
            Vec::new()
        };
        bytes.extend_from_slice(content.into().as_bytes());
        self.vfs.write_file(locator, &bytes).await
    }

    pub async fn delete(&self, locator: &Locator, options: DeleteOptions) -> PathfsResult<()> {
        self.vfs.delete(locator, options).await
    }

    pub async fn rename(
        &self,
        source: &Locator,
        target: &Locator,
        options: CopyOptions,
    ) -> PathfsResult<()> {
        self.vfs.rename(source, target, options).await
    }

    pub async fn copy(
        &self,
        source: &Locator,
        target: &Locator,
        options: CopyOptions,
    ) -> PathfsResult<()> {
        self.vfs.copy(source, target, options).await
    }

    /// `None` for an unknown scheme, otherwise whether its provider accepts writes.
    pub fn is_writable_file_system(&self, scheme: &str) -> Option<bool> {
        self.vfs.is_writable_file_system(scheme)
    }

    /// True when `stat` succeeds. Any failure counts as absent.
    pub async fn exists(&self, locator: &Locator) -> bool {
        self.vfs.stat(locator).await.is_ok()
    }

    /// Keeps the first `length` Unicode scalar values (Rust `char`s) of the decoded text.
    ///
    /// The count is not in bytes or UTF-16 code units: an emoji counts once. Reads the
    /// file, cuts the text and writes it back as UTF-8. This is not atomic.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn truncate(&self, locator: &Locator, length: usize) -> PathfsResult<()> {
        let result = self.truncate_text(locator, length).await;
        if let Err(e) = &result {
            warn!(error = %e, "truncate failed");
        }
        result.with_context(|| format!("Failed to truncate {}", locator))
    }

    async fn truncate_text(&self, locator: &Locator, length: usize) -> PathfsResult<()> {
        let text = self.read_file(locator, &ReadOptions::default()).await?;
        let truncated = truncate_chars(&text, length);
        if truncated.len() == text.len() {
            debug!("content is already within length");
            return Ok(());
        }
        self.vfs.write_file(locator, truncated.as_bytes()).await
    }

    /// Watches entries matching `pattern` until the returned watcher is dropped.
    pub fn watch(&self, pattern: &str, options: WatchOptions) -> PathfsResult<FileSystemWatcher> {
        self.vfs.create_watcher(pattern, options)
    }

    pub fn access(&self, locator: &Locator) -> FileAccess {
        FileAccess::from_writable(self.is_writable_file_system(locator.scheme()))
    }

    /// Reads the file as JSON.
    pub async fn read_json<T: DeserializeOwned>(&self, locator: &Locator) -> PathfsResult<T> {
        let text = self.read_file(locator, &ReadOptions::default()).await?;
        from_json_text(&text).with_context(|| format!("Failed to parse {}", locator))
    }

    /// Reads the file as JSON, `None` when it does not parse. Read failures still fail.
    pub async fn try_read_json<T: DeserializeOwned>(
        &self,
        locator: &Locator,
    ) -> PathfsResult<Option<T>> {
        let text = self.read_file(locator, &ReadOptions::default()).await?;
        match from_json_text(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(locator = %locator, error = %e, "ignoring unparsable JSON");
                Ok(None)
            }
        }
    }

    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        locator: &Locator,
        value: &T,
        options: &JsonWriteOptions,
    ) -> PathfsResult<()> {
        let text = to_json_text(value, options)?;
        self.write_file(locator, text).await
    }
}
