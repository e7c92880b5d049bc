//! Error types for seaview_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using seaview_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading a store.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reported by the underlying byte store.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Path or object does not exist.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// A path segment tried to descend into a file.
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// Operation does not apply to this handle (e.g. reading a directory).
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Handle has been closed.
    #[error("Handle is closed")]
    Closed,

    /// Object body could not be decompressed or decoded.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: String, reason: String },

    /// Object id cannot be used as a storage key.
    #[error("Invalid object id: {reason}")]
    InvalidObjectId { reason: String },

    /// Repository is a virtual (sub-folder) repository.
    #[error("Repository {repo_id} is a virtual repository")]
    VirtualRepository { repo_id: String },

    /// Repository has been moved to the trash.
    #[error("Repository {repo_id} is a garbage repository")]
    GarbageRepository { repo_id: String },

    /// Startup configuration (metadata dump, config file) is unusable.
    #[error("Configuration error at {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },
}

impl Error {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Error::NotADirectory { path: path.into() }
    }

    /// Create an InvalidOperation error.
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Error::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidObjectId error.
    pub fn invalid_object_id(reason: impl Into<String>) -> Self {
        Error::InvalidObjectId {
            reason: reason.into(),
        }
    }

    /// Create a Configuration error.
    pub fn configuration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether a presentation layer should render this as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::NotADirectory { .. }
                | Error::InvalidOperation { .. }
                | Error::Closed
        )
    }

    /// Whether this is a policy rejection rather than a data error.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Error::VirtualRepository { .. } | Error::GarbageRepository { .. }
        )
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        match err {
            Error::Io { source } => source,
            Error::NotFound { .. } => std::io::Error::new(ErrorKind::NotFound, err),
            Error::NotADirectory { .. } => std::io::Error::new(ErrorKind::NotADirectory, err),
            Error::InvalidOperation { .. } | Error::Closed => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            Error::CorruptedObject { .. } | Error::InvalidObjectId { .. } => {
                std::io::Error::new(ErrorKind::InvalidData, err)
            }
            Error::VirtualRepository { .. } | Error::GarbageRepository { .. } => {
                std::io::Error::new(ErrorKind::PermissionDenied, err)
            }
            Error::Configuration { .. } => std::io::Error::other(err),
        }
    }
}
