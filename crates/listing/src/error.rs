//! Error types for the listing crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while resolving, filtering or scanning directories.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The requested path resolves outside the base directory, or could not
    /// be resolved at all.
    #[error("access denied: path outside base directory: {0}")]
    PathEscape(String),

    /// The path does not exist.
    #[error("directory not found: {0}")]
    NotFound(PathBuf),

    /// The path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The filesystem refused to read the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A hiding pattern could not be compiled.
    #[error("invalid hiding pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// Any other IO failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ListingError {
    /// Map an IO error on `path` to the matching variant.
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ListingError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                ListingError::PermissionDenied(path.to_path_buf())
            }
            _ => ListingError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Result type alias for listing operations.
pub type Result<T> = std::result::Result<T, ListingError>;
