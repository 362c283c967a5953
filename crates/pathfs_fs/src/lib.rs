/* 📖 # What does pathfs_fs provide?

`FileSystem` is the facade callers use. It takes locators, turns text into bytes and
back, and hands everything else to the `Vfs` it was constructed with. The crate also
holds the JSON helpers, the access classification and the TOML configuration that
decides which providers a `Vfs` gets.
*/

pub mod access;
pub mod config;
mod file_system;
pub mod json;
pub mod text;

pub use access::FileAccess;
pub use config::{Config, LocalConfig, MountConfig, MountKind, load_config};
pub use file_system::FileSystem;
pub use json::JsonWriteOptions;
pub use text::{FileContent, ReadOptions};

pub use pathfs_base::{
    CopyOptions, DeleteOptions, DirectoryEntry, FileChange, FileChangeKind, FileStat,
    FileSystemWatcher, FileType, Locator, PathfsError, PathfsResult, VfsHandle, WatchOptions,
};
