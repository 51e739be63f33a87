// error.rs — Error types for the workspace subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or touching files in a mirror.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The logical path would resolve outside the tenant root.
    #[error("path traversal detected: '{path}' resolves outside the tenant mirror")]
    PathTraversal { path: String },

    /// An organization or repository identifier is malformed.
    #[error("invalid {field} identifier '{value}': {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Nothing exists at the requested path.
    #[error("not found: '{path}'")]
    NotFound { path: String },

    /// The operation needs a file but the path is a directory.
    #[error("'{path}' is a directory")]
    IsDirectory { path: String },
}
