use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, instrument};

use pathfs_base::vfs::FILE_SCHEME;
use pathfs_base::{
    ErrorKind, LocalProvider, MemoryProvider, PathfsError, PathfsResult, ResultExt, Vfs,
    VfsHandle,
};

use crate::text::{DEFAULT_ENCODING, resolve_encoding};

/// Configuration of a pathfs file system, usually read from `pathfs.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Encoding label `read_file` uses when the caller names none.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// The built-in provider for `file:` locators.
    #[serde(default)]
    pub local: LocalConfig,
    /// Additional schemes.
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountConfig>,
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            local: LocalConfig::default(),
            mounts: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    #[serde(default)]
    pub readonly: bool,
    /// Directory deleted entries are moved to when the caller asks for the trash.
    pub trash: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// A directory on disk served under its own scheme.
    Local,
    Memory,
}

/// A scheme served by its own provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub scheme: String,
    pub kind: MountKind,
    /// Directory backing a `local` mount.
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub readonly: bool,
    pub trash: Option<PathBuf>,
}

fn invalid(message: String) -> Box<PathfsError> {
    ErrorKind::InvalidOperation { message }.into()
}

impl Config {
    /// Parses and validates TOML configuration text.
    pub fn parse(text: &str) -> PathfsResult<Self> {
        let config: Config = toml::from_str(text).map_err(|e| {
            Box::new(PathfsError::new(ErrorKind::Parse {
                what: "configuration".to_string(),
                message: e.to_string(),
            }))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the encoding label and the mount table.
    pub fn validate(&self) -> PathfsResult<()> {
        resolve_encoding(&self.encoding).context("Invalid default encoding")?;

        let mut schemes = HashSet::from([FILE_SCHEME.to_string()]);
        for mount in &self.mounts {
            let scheme = mount.scheme.to_ascii_lowercase();
            let valid_scheme = scheme.len() >= 2
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid_scheme {
                return Err(invalid(format!("Invalid mount scheme '{}'", mount.scheme)));
            }
            if !schemes.insert(scheme) {
                return Err(invalid(format!(
                    "Scheme '{}' is configured more than once",
                    mount.scheme
                )));
            }
            match mount.kind {
                MountKind::Local if mount.root.is_none() => {
                    return Err(invalid(format!(
                        "Local mount '{}' needs a root directory",
                        mount.scheme
                    )));
                }
                MountKind::Memory if mount.root.is_some() || mount.trash.is_some() => {
                    return Err(invalid(format!(
                        "Memory mount '{}' takes neither root nor trash",
                        mount.scheme
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Creates a Vfs with the `file:` provider and every configured mount.
    #[instrument(skip(self))]
    pub fn build_vfs(&self) -> PathfsResult<VfsHandle> {
        self.validate()?;
        let vfs = Vfs::new();

        let mut local = LocalProvider::new();
        if let Some(trash) = &self.local.trash {
            local = local.with_trash_dir(trash.clone());
        }
        if self.local.readonly {
            local = local.into_readonly();
        }
        vfs.register_provider(FILE_SCHEME, local)?;

        for mount in &self.mounts {
            debug!(scheme = %mount.scheme, kind = ?mount.kind, "registering mount");
            match mount.kind {
                MountKind::Local => {
                    let root = mount.root.clone().ok_or_else(|| {
                        invalid(format!("Local mount '{}' needs a root directory", mount.scheme))
                    })?;
                    let mut provider = LocalProvider::rooted(root);
                    if let Some(trash) = &mount.trash {
                        provider = provider.with_trash_dir(trash.clone());
                    }
                    if mount.readonly {
                        provider = provider.into_readonly();
                    }
                    vfs.register_provider(&mount.scheme, provider)?;
                }
                MountKind::Memory => {
                    let mut provider = MemoryProvider::new();
                    if mount.readonly {
                        provider = provider.into_readonly();
                    }
                    vfs.register_provider(&mount.scheme, provider)?;
                }
            }
        }
        info!(schemes = ?vfs.schemes(), "file system configured");
        Ok(VfsHandle::new(vfs))
    }
}

/// Reads and validates the configuration file at `path`.
#[instrument]
pub async fn load_config(path: &Path) -> PathfsResult<Config> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Box::new(PathfsError::from_io(path.display(), e)))
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    Config::parse(&text).with_context(|| format!("Invalid configuration {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfs_base::Locator;

    #[test]
    fn test_default_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.encoding, "utf-8");

        let vfs = config.build_vfs().unwrap();
        assert_eq!(vfs.schemes(), vec!["file".to_string()]);
        assert_eq!(vfs.is_writable_file_system("file"), Some(true));
    }

    #[test]
    fn test_parse_mounts() {
        let config = Config::parse(
            r#"
            encoding = "latin1"

            [local]
            readonly = true

            [[mount]]
            scheme = "mem"
            kind = "memory"

            [[mount]]
            scheme = "vault"
            kind = "local"
            root = "/srv/vault"
            readonly = true
            "#,
        )
        .unwrap();

        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[1].root, Some(PathBuf::from("/srv/vault")));

        let vfs = config.build_vfs().unwrap();
        assert_eq!(vfs.is_writable_file_system("file"), Some(false));
        assert_eq!(vfs.is_writable_file_system("mem"), Some(true));
        assert_eq!(vfs.is_writable_file_system("vault"), Some(false));
        assert_eq!(vfs.is_writable_file_system("ftp"), None);
    }

    #[test]
    fn test_rejects_local_mount_without_root() {
        let err = Config::parse(
            r#"
            [[mount]]
            scheme = "disk"
            kind = "local"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    }

    #[test]
    fn test_rejects_duplicate_and_builtin_schemes() {
        let duplicate = r#"
            [[mount]]
            scheme = "mem"
            kind = "memory"

            [[mount]]
            scheme = "MEM"
            kind = "memory"
        "#;
        assert!(Config::parse(duplicate).is_err());

        let builtin = r#"
            [[mount]]
            scheme = "file"
            kind = "memory"
        "#;
        assert!(Config::parse(builtin).is_err());
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let err = Config::parse(r#"encoding = "klingon""#).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedEncoding { .. }));
        assert_eq!(err.get_context(), ["Invalid default encoding".to_string()]);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = Config::parse("colour = \"blue\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { .. }));
    }

    #[tokio::test]
    async fn test_load_config_from_disk() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pathfs.toml");
        tokio::fs::write(&path, "[[mount]]\nscheme = \"scratch\"\nkind = \"memory\"\n")
            .await
            .unwrap();

        let config = load_config(&path).await.unwrap();
        let vfs = config.build_vfs().unwrap();
        vfs.write_file(&Locator::parse("scratch:/a").unwrap(), b"x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here/pathfs.toml"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.get_context().len(), 1);
    }
}
