use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{PrettyFormatter, Serializer};

use pathfs_base::{ErrorKind, PathfsResult};

/// Layout of JSON written by `write_json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonWriteOptions {
    /// Indentation per level; `None` writes compact JSON on one line.
    pub indent: Option<String>,
    /// Line ending used between lines and at the end.
    pub eol: String,
    /// Terminate the document with `eol`.
    pub final_eol: bool,
}

impl Default for JsonWriteOptions {
    fn default() -> Self {
        Self {
            indent: None,
            eol: "\n".to_string(),
            final_eol: true,
        }
    }
}

impl JsonWriteOptions {
    /// Indent with `count` spaces.
    pub fn spaces(count: usize) -> Self {
        Self {
            indent: Some(" ".repeat(count)),
            ..Self::default()
        }
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = Some(indent.into());
        self
    }

    pub fn with_eol(mut self, eol: impl Into<String>) -> Self {
        self.eol = eol.into();
        self
    }

    pub fn with_final_eol(mut self, final_eol: bool) -> Self {
        self.final_eol = final_eol;
        self
    }
}

fn json_error(message: impl ToString) -> Box<pathfs_base::PathfsError> {
    ErrorKind::Parse {
        what: "JSON".to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Serializes `value` with the given layout.
pub fn to_json_text<T: Serialize + ?Sized>(
    value: &T,
    options: &JsonWriteOptions,
) -> PathfsResult<String> {
    let text = match &options.indent {
        None => serde_json::to_string(value).map_err(json_error)?,
        Some(indent) => {
            let mut buffer = Vec::new();
            let formatter = PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
            value.serialize(&mut serializer).map_err(json_error)?;
            String::from_utf8(buffer).map_err(json_error)?
        }
    };

    let mut text = if options.eol == "\n" {
        text
    } else {
        text.replace('\n', &options.eol)
    };
    if options.final_eol {
        text.push_str(&options.eol);
    }
    Ok(text)
}

/// Parses JSON text into `T`.
pub fn from_json_text<T: DeserializeOwned>(text: &str) -> PathfsResult<T> {
    serde_json::from_str(text).map_err(json_error)
}
