use std::io;
use std::path::{Path, PathBuf};

/// Errors produced while loading, resolving, or editing menus.
///
/// Payloads are plain strings so a failed load can be cached and handed out
/// again until the underlying path is invalidated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MenuError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No root element in {0}")]
    NoRootElement(PathBuf),

    #[error("Unknown root element <{element}> in {path}")]
    UnknownRootElement { path: PathBuf, element: String },

    #[error("IO error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Is a directory: {0}")]
    IsDirectory(PathBuf),

    #[error("Not a directory: {0}")]
    NotDirectory(PathBuf),

    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Directory not empty: {0}")]
    NotEmpty(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MenuError {
    /// Wraps an I/O failure with the path it happened on.
    pub fn io(path: impl AsRef<Path>, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            return Self::NotFound(path.as_ref().to_path_buf());
        }
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: error.to_string(),
        }
    }

    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// True for structural failures of a menu file.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::NoRootElement(_) | Self::UnknownRootElement { .. }
        )
    }

    /// True for failures to open or read something.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MenuError>;

/// Canonicalizes a path, returning the original if canonicalization fails.
pub fn canonicalize_existing_path(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}
