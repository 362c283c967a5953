use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::PathfsResult;

use super::glob::GlobPattern;
use super::traits::{FileChange, FileChangeKind, FileSystemProvider, WatchRegistration};

/// Which change kinds a watcher drops instead of delivering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub ignore_create: bool,
    pub ignore_change: bool,
    pub ignore_delete: bool,
}

impl WatchOptions {
    fn ignores(&self, kind: FileChangeKind) -> bool {
        match kind {
            FileChangeKind::Created => self.ignore_create,
            FileChangeKind::Changed => self.ignore_change,
            FileChangeKind::Deleted => self.ignore_delete,
        }
    }
}

/// Live subscription to changes of entries matching a glob pattern.
///
/// The caller owns the watcher. Events are queued until received; dropping the watcher
/// or calling [`dispose`](Self::dispose) stops the provider watch.
#[derive(Debug)]
pub struct FileSystemWatcher {
    pattern: GlobPattern,
    options: WatchOptions,
    receiver: mpsc::UnboundedReceiver<FileChange>,
    registration: Option<WatchRegistration>,
}

impl FileSystemWatcher {
    #[instrument(skip(provider, pattern), fields(pattern = %pattern))]
    pub(crate) fn start(
        provider: &dyn FileSystemProvider,
        pattern: GlobPattern,
        options: WatchOptions,
    ) -> PathfsResult<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let filter = pattern.clone();
        let registration = provider.watch(
            pattern.base(),
            Box::new(move |change: FileChange| {
                if options.ignores(change.kind) || !filter.matches(&change.locator) {
                    trace!(locator = %change.locator, kind = ?change.kind, "change filtered");
                    return;
                }
                // The receiver is gone once the watcher is dropped.
                let _ = sender.send(change);
            }),
        )?;
        debug!("watcher started");
        Ok(Self {
            pattern,
            options,
            receiver,
            registration: Some(registration),
        })
    }

    /// Waits for the next change. Returns `None` once the watcher is disposed.
    pub async fn recv(&mut self) -> Option<FileChange> {
        self.registration.as_ref()?;
        self.receiver.recv().await
    }

    /// Next queued change without waiting.
    pub fn try_recv(&mut self) -> Option<FileChange> {
        self.registration.as_ref()?;
        self.receiver.try_recv().ok()
    }

    /// Stops the provider watch and discards queued changes.
    pub fn dispose(&mut self) {
        if self.registration.take().is_some() {
            self.receiver.close();
            while self.receiver.try_recv().is_ok() {}
            debug!(pattern = %self.pattern, "watcher disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.registration.is_none()
    }

    pub fn pattern(&self) -> &GlobPattern {
        &self.pattern
    }

    pub fn ignore_create(&self) -> bool {
        self.options.ignore_create
    }

    pub fn ignore_change(&self) -> bool {
        self.options.ignore_change
    }

    pub fn ignore_delete(&self) -> bool {
        self.options.ignore_delete
    }
}
