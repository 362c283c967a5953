use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use relative_path::RelativePathBuf;
use url::Url;

use crate::error::{ErrorKind, PathfsResult};

/// Scheme of locators created from plain local paths.
pub const FILE_SCHEME: &str = "file";

/* 📖 # How are plain paths and URIs told apart?

`Locator::parse` treats an input as a URI when it starts with a scheme of at least two
characters followed by `:`. Everything else is a local path and must be absolute. The
two-character minimum keeps `C:\data` a path rather than a URI with scheme `c`.

Once constructed, a locator always has an absolute path with `.` and `..` segments
resolved, so two spellings of the same entry compare equal.
*/

/// Scheme-qualified, immutable address of a file system entry.
///
/// # Examples
///
/// ```
/// use pathfs_base::Locator;
///
/// let local = Locator::parse("/tmp/notes/../x.txt").unwrap();
/// assert_eq!(local.scheme(), "file");
/// assert_eq!(local.path(), "/tmp/x.txt");
///
/// let remote = Locator::parse("vault://archive/reports/q3.csv").unwrap();
/// assert_eq!(remote.authority(), "archive");
/// assert_eq!(remote.file_name().as_deref(), Some("q3.csv"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator(Url);

impl Locator {
    /// Parses a URI, or an absolute local path which becomes a `file:` locator.
    pub fn parse(input: &str) -> PathfsResult<Self> {
        if has_scheme(input) {
            let url = Url::parse(input).map_err(|e| invalid(input, e.to_string()))?;
            Self::from_url(url)
        } else {
            Self::from_file_path(Path::new(input))
        }
    }

    /// Creates a `file:` locator from an absolute OS path.
    pub fn from_file_path(path: &Path) -> PathfsResult<Self> {
        let input = path.display().to_string();
        let url = Url::from_file_path(path)
            .map_err(|()| invalid(&input, "expected an absolute path".to_string()))?;
        // Re-parsing resolves `..` segments that from_file_path keeps verbatim.
        let url = Url::parse(url.as_str()).map_err(|e| invalid(&input, e.to_string()))?;
        Self::from_url(url)
    }

    /// Wraps a URL, rejecting URLs without a hierarchical path.
    pub fn from_url(mut url: Url) -> PathfsResult<Self> {
        if url.cannot_be_a_base() {
            return Err(invalid(url.as_str(), "locator path must be absolute".to_string()));
        }
        if url.path().is_empty() {
            url.set_path("/");
        } else if url.path().len() > 1 && url.path().ends_with('/') {
            let trimmed = url.path().trim_end_matches('/').to_string();
            url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
        }
        Ok(Self(url))
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Host and port, empty when the locator has no authority.
    pub fn authority(&self) -> &str {
        self.0.authority()
    }

    /// Decoded absolute path, always starting with `/`.
    pub fn path(&self) -> String {
        percent_decode_str(self.0.path())
            .decode_utf8_lossy()
            .into_owned()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.path() == "/"
    }

    /// Last path segment, `None` for the root.
    pub fn file_name(&self) -> Option<String> {
        let path = self.path();
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    /// Locator of the containing directory, `None` for the root.
    pub fn parent(&self) -> Option<Locator> {
        if self.is_root() {
            return None;
        }
        let path = self.path();
        let trimmed = path.trim_end_matches('/');
        let parent = match trimmed.rsplit_once('/') {
            Some(("", _)) | None => "/",
            Some((parent, _)) => parent,
        };
        Some(self.with_path(parent))
    }

    /// Appends a relative path, resolving `.` and `..` without leaving the root.
    pub fn join(&self, relative: &str) -> Locator {
        let combined = format!("{}/{}", self.path(), relative);
        self.with_path(&normalize_path(&combined))
    }

    /// Same scheme and authority, different path.
    pub fn with_path(&self, path: &str) -> Locator {
        let mut url = self.0.clone();
        url.set_path(&normalize_path(path).replace('%', "%25"));
        Locator(url)
    }

    /// Path of `self` below `base`, `None` when `self` is not inside `base`.
    ///
    /// Returns an empty path when both locators are equal.
    pub fn relative_to(&self, base: &Locator) -> Option<RelativePathBuf> {
        if self.scheme() != base.scheme() || self.authority() != base.authority() {
            return None;
        }
        let path = self.path();
        let base_path = base.path();
        let base_path = base_path.trim_end_matches('/');
        let rest = path.strip_prefix(base_path)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(RelativePathBuf::from(rest.trim_start_matches('/')))
    }

    /// True when `other` lies strictly below `self`.
    pub fn is_ancestor_of(&self, other: &Locator) -> bool {
        other
            .relative_to(self)
            .is_some_and(|relative| !relative.as_str().is_empty())
    }

    /// Path relative to the root, used as a key by in-memory stores.
    pub fn to_relative_path(&self) -> RelativePathBuf {
        RelativePathBuf::from(self.path().trim_start_matches('/'))
    }

    /// Converts a `file:` locator back into an OS path.
    pub fn to_file_path(&self) -> PathfsResult<PathBuf> {
        self.0
            .to_file_path()
            .map_err(|()| invalid(self.0.as_str(), "not a local file locator".to_string()))
    }
}

impl FromStr for Locator {
    type Err = Box<crate::PathfsError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<Url> for Locator {
    fn as_ref(&self) -> &Url {
        &self.0
    }
}

fn has_scheme(input: &str) -> bool {
    match input.find(':') {
        Some(idx) if idx >= 2 => {
            let scheme = &input[..idx];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Absolute path with empty, `.` and `..` segments resolved.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn invalid(input: &str, reason: String) -> Box<crate::PathfsError> {
    ErrorKind::InvalidLocator {
        input: input.to_string(),
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path_uses_file_scheme() {
        let locator = Locator::parse("/tmp/x.txt").unwrap();
        assert_eq!(locator.scheme(), FILE_SCHEME);
        assert_eq!(locator.path(), "/tmp/x.txt");
        assert_eq!(locator.to_string(), "file:///tmp/x.txt");
    }

    #[test]
    fn test_parse_uri_keeps_scheme_and_authority() {
        let locator = Locator::parse("vault://archive/a/b.txt").unwrap();
        assert_eq!(locator.scheme(), "vault");
        assert_eq!(locator.authority(), "archive");
        assert_eq!(locator.path(), "/a/b.txt");
    }

    #[test]
    fn test_parse_uri_without_authority() {
        let locator = Locator::parse("mem:/notes/today.md").unwrap();
        assert_eq!(locator.scheme(), "mem");
        assert_eq!(locator.authority(), "");
        assert_eq!(locator.path(), "/notes/today.md");
    }

    #[test]
    fn test_parse_rejects_relative_path() {
        let err = Locator::parse("relative/file.txt").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLocator { .. }));
    }

    #[test]
    fn test_parse_rejects_opaque_uri() {
        let err = Locator::parse("mem:notes").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidLocator { .. }));
    }

    #[test]
    fn test_parse_resolves_dot_segments() {
        let a = Locator::parse("/tmp/a/../b/./c.txt").unwrap();
        let b = Locator::parse("file:///tmp/b/c.txt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_drops_trailing_slash() {
        let a = Locator::parse("mem:/a/b/").unwrap();
        assert_eq!(a, Locator::parse("mem:/a/b").unwrap());
        assert!(Locator::parse("file:///").unwrap().is_root());
    }

    #[test]
    fn test_path_is_decoded() {
        let locator = Locator::parse("/tmp/with space#hash.txt").unwrap();
        assert_eq!(locator.path(), "/tmp/with space#hash.txt");
        assert_eq!(locator.file_name().as_deref(), Some("with space#hash.txt"));
    }

    #[test]
    fn test_parent_and_join() {
        let locator = Locator::parse("mem:/a/b/c").unwrap();
        let parent = locator.parent().unwrap();
        assert_eq!(parent.path(), "/a/b");
        assert_eq!(parent.join("c"), locator);
        assert_eq!(parent.join("../x").path(), "/a/x");

        let top = Locator::parse("mem:/a").unwrap();
        assert!(top.parent().unwrap().is_root());
        assert!(top.parent().unwrap().parent().is_none());
    }

    #[test]
    fn test_join_never_escapes_root() {
        let root = Locator::parse("mem:/").unwrap();
        assert_eq!(root.join("../../etc").path(), "/etc");
    }

    #[test]
    fn test_relative_to() {
        let base = Locator::parse("/srv/data").unwrap();
        let inner = Locator::parse("/srv/data/x/y.txt").unwrap();
        let sibling = Locator::parse("/srv/database").unwrap();

        assert_eq!(inner.relative_to(&base).unwrap().as_str(), "x/y.txt");
        assert_eq!(base.relative_to(&base).unwrap().as_str(), "");
        assert!(sibling.relative_to(&base).is_none());
        assert!(base.is_ancestor_of(&inner));
        assert!(!base.is_ancestor_of(&base));
    }

    #[test]
    fn test_relative_to_requires_same_scheme() {
        let base = Locator::parse("mem:/a").unwrap();
        let other = Locator::parse("/a/b").unwrap();
        assert!(other.relative_to(&base).is_none());
    }

    #[test]
    fn test_with_path_encodes_percent() {
        let locator = Locator::parse("mem:/").unwrap().with_path("/100%.txt");
        assert_eq!(locator.path(), "/100%.txt");
    }

    #[test]
    fn test_from_str() {
        let locator: Locator = "/etc/hosts".parse().unwrap();
        assert_eq!(locator.to_file_path().unwrap(), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_to_relative_path() {
        let locator = Locator::parse("mem:/a/b").unwrap();
        assert_eq!(locator.to_relative_path().as_str(), "a/b");
    }
}
