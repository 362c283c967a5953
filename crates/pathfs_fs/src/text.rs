use std::borrow::Cow;

use encoding_rs::Encoding;
use tracing::debug;

use pathfs_base::{ErrorKind, PathfsResult};

/// Default label used when neither the caller nor the configuration picks one.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Content handed to a write: text is encoded as UTF-8, bytes are written as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Bytes(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Text(text) => text.into_bytes(),
            FileContent::Bytes(bytes) => bytes,
        }
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        FileContent::Text(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        FileContent::Text(text.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        FileContent::Bytes(bytes)
    }
}

impl From<&[u8]> for FileContent {
    fn from(bytes: &[u8]) -> Self {
        FileContent::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for FileContent {
    fn from(bytes: &[u8; N]) -> Self {
        FileContent::Bytes(bytes.to_vec())
    }
}

/// How `read_file` decodes bytes into text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// WHATWG encoding label (`utf-8`, `latin1`, `utf-16le`, ...). `None` uses the
    /// file system default.
    pub encoding: Option<String>,
    /// Fail with `DecodeError` instead of substituting U+FFFD.
    pub fatal: bool,
    /// Keep a leading byte order mark in the output.
    pub ignore_bom: bool,
}

impl ReadOptions {
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_ignore_bom(mut self, ignore_bom: bool) -> Self {
        self.ignore_bom = ignore_bom;
        self
    }
}

/// Looks up an encoding by its WHATWG label.
pub fn resolve_encoding(label: &str) -> PathfsResult<&'static Encoding> {
    Encoding::for_label_no_replacement(label.trim().as_bytes()).ok_or_else(|| {
        ErrorKind::UnsupportedEncoding {
            label: label.to_string(),
        }
        .into()
    })
}

/* 📖 # How are bytes decoded?

Decoding follows the WHATWG `TextDecoder`. A byte order mark is only recognized when it
belongs to the chosen encoding (a UTF-16LE mark is plain data to a UTF-8 decoder). Unless
`ignore_bom` is set, that mark is removed before decoding. Malformed sequences become
U+FFFD, or fail the whole decode when `fatal` is set.
*/

/// Decodes `bytes` as `encoding`.
pub fn decode(
    bytes: &[u8],
    encoding: &'static Encoding,
    fatal: bool,
    ignore_bom: bool,
) -> PathfsResult<String> {
    let bytes = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_length)) if !ignore_bom && bom_encoding == encoding => {
            &bytes[bom_length..]
        }
        _ => bytes,
    };

    let decoded: Cow<'_, str> = if fatal {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| {
                debug!(encoding = encoding.name(), "strict decode failed");
                Box::new(pathfs_base::PathfsError::new(ErrorKind::DecodeError {
                    encoding: encoding.name().to_string(),
                }))
            })?
    } else {
        let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            debug!(
                encoding = encoding.name(),
                "malformed sequences replaced with U+FFFD"
            );
        }
        decoded
    };
    Ok(decoded.into_owned())
}

/// First `length` Unicode scalar values of `text`.
pub fn truncate_chars(text: &str, length: usize) -> &str {
    match text.char_indices().nth(length) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
