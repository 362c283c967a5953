use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::PathfsResult;
use crate::error::ErrorKind;

use super::locator::Locator;

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/* 📖 # How is a watch pattern split?

A watch pattern such as `/srv/logs/app-?.log` is cut at the last `/` before the first glob
character. The part before the cut is the base locator the provider watch is registered
on (`/srv/logs`). The part after it is compiled with `globset` and matched against paths
relative to the base (`app-?.log`). `*` stays within one path segment and `**` crosses
segments.

A pattern without glob characters names a single entry: its parent becomes the base and
the escaped file name the glob.
*/

/// A compiled watch pattern: a literal base locator plus a glob below it.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    base: Locator,
    glob: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// Parses a URI or absolute path containing glob syntax.
    pub fn parse(pattern: &str) -> PathfsResult<Self> {
        let Some(first_glob) = pattern.find(GLOB_CHARS) else {
            let locator = Locator::parse(pattern)?;
            return match (locator.parent(), locator.file_name()) {
                (Some(parent), Some(name)) => {
                    Self::build(pattern.to_string(), parent, globset::escape(&name))
                }
                _ => Self::build(pattern.to_string(), locator, String::new()),
            };
        };

        let Some(cut) = pattern[..first_glob].rfind('/') else {
            return Err(invalid_glob(pattern, "pattern has no literal base directory"));
        };
        let base = Locator::parse(&pattern[..=cut])?;
        Self::build(pattern.to_string(), base, pattern[cut + 1..].to_string())
    }

    /// Pattern for `glob` matched relative to `base`.
    pub fn relative(base: Locator, glob: &str) -> PathfsResult<Self> {
        let pattern = format!("{}/{}", base.to_string().trim_end_matches('/'), glob);
        Self::build(pattern, base, glob.to_string())
    }

    fn build(pattern: String, base: Locator, glob: String) -> PathfsResult<Self> {
        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                debug!(pattern = %pattern, error = %e, "failed to compile glob pattern");
                invalid_glob(&pattern, &e.to_string())
            })?
            .compile_matcher();
        debug!(pattern = %pattern, base = %base, glob = %glob, "glob pattern compiled");
        Ok(Self {
            pattern,
            base,
            glob,
            matcher,
        })
    }

    /// The pattern as given.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn base(&self) -> &Locator {
        &self.base
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// True when `locator` lies below the base and its relative path matches the glob.
    pub fn matches(&self, locator: &Locator) -> bool {
        match locator.relative_to(&self.base) {
            Some(relative) if !relative.as_str().is_empty() => {
                self.matcher.is_match(relative.as_str())
            }
            _ => false,
        }
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn invalid_glob(pattern: &str, message: &str) -> Box<crate::PathfsError> {
    ErrorKind::InvalidGlob {
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
    .into()
}
