use std::fs::Metadata;
use std::time::SystemTime;

/// Kind of a file system entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    Unknown,
    File,
    Directory,
    SymbolicLink,
}

impl FileType {
    pub fn is_file(self) -> bool {
        self == FileType::File
    }

    pub fn is_directory(self) -> bool {
        self == FileType::Directory
    }

    pub(crate) fn from_std(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            FileType::SymbolicLink
        } else if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_file() {
            FileType::File
        } else {
            FileType::Unknown
        }
    }
}

/// One child of a directory: its name and kind.
pub type DirectoryEntry = (String, FileType);

/// Metadata snapshot of an entry.
///
/// Nothing keeps this in sync with the backing store; it is stale as soon as it is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub file_type: FileType,
    /// Size in bytes. Directories report what the provider reports, often zero.
    pub size: u64,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub readonly: bool,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.file_type.is_file()
    }

    pub fn is_directory(&self) -> bool {
        self.file_type.is_directory()
    }

    /// Builds a stat from `symlink_metadata` and, for links, the followed target.
    ///
    /// Creation time falls back to the modification time on platforms that don't
    /// record it.
    pub(crate) fn from_std(link_metadata: &Metadata, target: Option<&Metadata>) -> Self {
        let metadata = target.unwrap_or(link_metadata);
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            file_type: FileType::from_std(link_metadata.file_type()),
            size: metadata.len(),
            ctime: metadata.created().unwrap_or(mtime),
            mtime,
            readonly: metadata.permissions().readonly(),
        }
    }
}
