//! Error types for backend operations.
//!
//! This module defines the error taxonomy that every backend speaks, using
//! `thiserror` for library-level errors. The adapter maps each variant to a
//! native status exactly once, so backends should pick the most specific
//! variant they can.

use std::io;
use thiserror::Error;

/// Result type alias using FsError
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors returned by backends and by the capability negotiation layer.
#[derive(Error, Debug)]
pub enum FsError {
    // === Name Errors ===
    /// The named entry does not exist
    #[error("not found: {path}")]
    NotFound { path: String },

    /// An entry with that name already exists
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// The path is not a well-formed relative backend path
    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    // === Type Errors ===
    /// A file operation was attempted on a directory
    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    /// A directory operation was attempted on a file
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// The directory still has entries
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty { path: String },

    // === Access Errors ===
    /// The backend refused the operation
    #[error("permission denied: {operation} on {path}")]
    PermissionDenied { operation: String, path: String },

    /// An argument was out of range or malformed
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The stream ended before any data could be transferred
    #[error("end of file")]
    EndOfFile,

    /// The backend or stream does not implement the requested capability
    #[error("operation not supported: {operation}")]
    Unsupported { operation: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === I/O Errors ===
    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl FsError {
    /// Create a not-found error
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound { path: path.into() }
    }

    /// Create an already-exists error
    pub fn already_exists(path: impl Into<String>) -> Self {
        FsError::AlreadyExists { path: path.into() }
    }

    /// Create a permission-denied error
    pub fn permission_denied(operation: impl Into<String>, path: impl Into<String>) -> Self {
        FsError::PermissionDenied {
            operation: operation.into(),
            path: path.into(),
        }
    }

    /// Create an unsupported-capability error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        FsError::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an invalid-path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        FsError::InvalidPath { path: path.into() }
    }

    /// Returns true if this error means the entry does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound { .. } => true,
            FsError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Attach a path to an I/O error, keeping its category
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound { path },
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
                operation: "io".to_string(),
                path,
            },
            io::ErrorKind::IsADirectory => FsError::IsADirectory { path },
            io::ErrorKind::NotADirectory => FsError::NotADirectory { path },
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty { path },
            _ => FsError::from(err),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                FsError::InvalidArgument {
                    reason: err.to_string(),
                }
            }
            io::ErrorKind::UnexpectedEof => FsError::EndOfFile,
            io::ErrorKind::Unsupported => FsError::Unsupported {
                operation: err.to_string(),
            },
            _ => FsError::Io(err),
        }
    }
}

impl From<toml::de::Error> for FsError {
    fn from(err: toml::de::Error) -> Self {
        FsError::Config {
            reason: format!("failed to parse config: {}", err),
        }
    }
}

impl From<toml::ser::Error> for FsError {
    fn from(err: toml::ser::Error) -> Self {
        FsError::Config {
            reason: format!("failed to serialize config: {}", err),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound { .. } => io::ErrorKind::NotFound,
            FsError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            FsError::PermissionDenied { .. } => io::ErrorKind::PermissionDenied,
            FsError::InvalidPath { .. } | FsError::InvalidArgument { .. } => {
                io::ErrorKind::InvalidInput
            }
            FsError::EndOfFile => io::ErrorKind::UnexpectedEof,
            FsError::Unsupported { .. } => io::ErrorKind::Unsupported,
            FsError::Io(inner) => inner.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds_map_to_categories() {
        let err = FsError::from_io(io::Error::from(io::ErrorKind::NotFound), "a.txt");
        assert!(err.is_not_found());

        let err = FsError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, FsError::EndOfFile));

        let err = FsError::from(io::Error::from(io::ErrorKind::Unsupported));
        assert!(matches!(err, FsError::Unsupported { .. }));

        let err = FsError::from_io(io::Error::from(io::ErrorKind::AlreadyExists), "b");
        assert!(matches!(err, FsError::AlreadyExists { .. }));
    }

    #[test]
    fn test_raw_not_found_io_is_not_found() {
        let err = FsError::from(io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!FsError::EndOfFile.is_not_found());
    }

    #[test]
    fn test_round_trip_to_io_kind() {
        let err: io::Error = FsError::not_found("x").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
