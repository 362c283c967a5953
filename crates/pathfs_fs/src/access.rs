use std::fmt;

/// What the provider behind a scheme allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAccess {
    /// No provider is registered for the scheme.
    None,
    Read,
    Write,
}

impl FileAccess {
    /// Maps the answer of `is_writable_file_system`.
    pub fn from_writable(writable: Option<bool>) -> Self {
        match writable {
            None => FileAccess::None,
            Some(false) => FileAccess::Read,
            Some(true) => FileAccess::Write,
        }
    }

    pub fn can_read(self) -> bool {
        self != FileAccess::None
    }

    pub fn can_write(self) -> bool {
        self == FileAccess::Write
    }
}

impl fmt::Display for FileAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileAccess::None => "none",
            FileAccess::Read => "read",
            FileAccess::Write => "write",
        };
        f.write_str(name)
    }
}
