use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use tracing_error::{SpanTrace, SpanTraceStatus};

/* 📖 # Which failures does ErrorKind describe?

The first block of variants is the taxonomy every backing store speaks: a provider maps
its native failures onto these so callers can match on them regardless of whether the
entry lives on disk, in memory or behind a rooted mount. The second block belongs to the
facade itself (locator parsing, text decoding, glob compilation, configuration).
*/

/// Error variants that can occur in pathfs operations.
/// Each variant represents a specific error category with its associated context.
#[derive(Debug)]
pub enum ErrorKind {
    /// No entry exists at the locator
    NotFound { locator: String },

    /// The target of a rename or copy already exists
    AlreadyExists { locator: String },

    /// A directory was requested where a file already exists
    AlreadyExistsAsFile { locator: String },

    /// Non-recursive delete of a directory with children
    DirectoryNotEmpty { locator: String },

    NotADirectory { locator: String },

    FileIsDirectory { locator: String },

    PermissionDenied { locator: String },

    /// No provider is registered for the scheme
    SchemeUnsupported { scheme: String },

    /// Bytes are not valid under the chosen encoding (strict decoding only)
    DecodeError { encoding: String },

    UnsupportedEncoding { label: String },

    InvalidLocator { input: String, reason: String },

    InvalidGlob { pattern: String, message: String },

    /// The request is contradictory, e.g. copying a directory into itself
    InvalidOperation { message: String },

    /// Serialized input (JSON, TOML) could not be parsed or produced
    Parse { what: String, message: String },

    /// File system operation failed in a way the taxonomy has no name for
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catch-all for other errors with a message
    Message { message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound { locator } => write!(f, "Entry not found: {}", locator),
            ErrorKind::AlreadyExists { locator } => {
                write!(f, "Entry already exists: {}", locator)
            }
            ErrorKind::AlreadyExistsAsFile { locator } => {
                write!(f, "Cannot create directory, a file exists at {}", locator)
            }
            ErrorKind::DirectoryNotEmpty { locator } => {
                write!(f, "Directory is not empty: {}", locator)
            }
            ErrorKind::NotADirectory { locator } => write!(f, "Not a directory: {}", locator),
            ErrorKind::FileIsDirectory { locator } => {
                write!(f, "Expected a file but found a directory: {}", locator)
            }
            ErrorKind::PermissionDenied { locator } => {
                write!(f, "Permission denied: {}", locator)
            }
            ErrorKind::SchemeUnsupported { scheme } => {
                write!(f, "No file system provider registered for scheme '{}'", scheme)
            }
            ErrorKind::DecodeError { encoding } => {
                write!(f, "Content is not valid {}", encoding)
            }
            ErrorKind::UnsupportedEncoding { label } => {
                write!(f, "Unsupported text encoding '{}'", label)
            }
            ErrorKind::InvalidLocator { input, reason } => {
                write!(f, "Invalid locator '{}': {}", input, reason)
            }
            ErrorKind::InvalidGlob { pattern, message } => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, message)
            }
            ErrorKind::InvalidOperation { message } => write!(f, "{}", message),
            ErrorKind::Parse { what, message } => {
                write!(f, "Failed to parse {}: {}", what, message)
            }
            ErrorKind::FileError { path, source } => {
                write!(f, "File error at {}: {}", path.display(), source)
            }
            ErrorKind::Message { message } => write!(f, "{}", message),
        }
    }
}

/// Error type wrapping an ErrorKind with context, an optional cause and a span trace.
///
/// The span trace is captured at construction and is only populated when a subscriber
/// with `tracing_error::ErrorLayer` is active (see [`crate::tracing::init_tracing`]).
pub struct PathfsError {
    kind: ErrorKind,
    context: Vec<String>,
    cause: Option<Box<PathfsError>>,
    span_trace: SpanTrace,
}

impl PathfsError {
    /// Creates a new error from an ErrorKind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
            cause: None,
            span_trace: SpanTrace::capture(),
        }
    }

    /// Creates a [`ErrorKind::Message`] error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Maps an I/O error for `locator` onto the error taxonomy.
    ///
    /// I/O kinds without a counterpart are kept as [`ErrorKind::FileError`].
    pub fn from_io(locator: impl fmt::Display, source: io::Error) -> Self {
        let locator = locator.to_string();
        let kind = match source.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound { locator },
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists { locator },
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                ErrorKind::PermissionDenied { locator }
            }
            io::ErrorKind::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty { locator },
            io::ErrorKind::NotADirectory => ErrorKind::NotADirectory { locator },
            io::ErrorKind::IsADirectory => ErrorKind::FileIsDirectory { locator },
            _ => ErrorKind::FileError {
                path: PathBuf::from(locator),
                source,
            },
        };
        Self::new(kind)
    }

    /// Attaches context to an error.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Records the error that led to this one.
    pub fn caused_by(mut self, cause: PathfsError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns a reference to the underlying ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    pub fn cause(&self) -> Option<&PathfsError> {
        self.cause.as_deref()
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// True for [`ErrorKind::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound { .. })
    }

    /// Returns the innermost error in the chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    fn write_children(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let child_count = self.context.len() + usize::from(self.cause.is_some());
        for (i, ctx) in self.context.iter().enumerate() {
            let connector = if i + 1 == child_count { "└─" } else { "├─" };
            write!(f, "\n{}{} {}", indent, connector, ctx)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n{}└─ cause: {}", indent, cause.kind)?;
            cause.write_children(f, &format!("{}   ", indent))?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for PathfsError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ErrorKind> for Box<PathfsError> {
    fn from(kind: ErrorKind) -> Self {
        Box::new(PathfsError::new(kind))
    }
}

impl StdError for PathfsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            _ => self.cause.as_deref().map(|cause| cause as &(dyn StdError + 'static)),
        }
    }
}

impl fmt::Display for PathfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ctx in &self.context {
            write!(f, "{}: ", ctx)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Debug for PathfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        self.write_children(f, "")?;
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            write!(f, "\nTrace: {}", self.span_trace)?;
        }
        Ok(())
    }
}

/// Standard result type for pathfs operations.
pub type PathfsResult<T> = std::result::Result<T, Box<PathfsError>>;

/// Extension trait for attaching context to Results.
pub trait ResultExt<T> {
    /// Attaches context to an error, consuming and re-wrapping it.
    fn context(self, context: impl Into<String>) -> PathfsResult<T>;

    /// Attaches context using lazy evaluation.
    /// Context is only evaluated if the result is an error.
    fn with_context<F>(self, f: F) -> PathfsResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for PathfsResult<T> {
    fn context(self, context: impl Into<String>) -> PathfsResult<T> {
        self.map_err(|err| Box::new(err.context(context)))
    }

    fn with_context<F>(self, f: F) -> PathfsResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new(err.with_context(f)))
    }
}

/// Creates a boxed [`ErrorKind::Message`] error from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        ::std::boxed::Box::new($crate::PathfsError::message(format!($($arg)*)))
    };
}

/// Returns early with a boxed [`ErrorKind::Message`] error.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
