//! Error types shared by all Loris crates.

use thiserror::Error;

/// Result type for Loris operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of Loris operations.
///
/// Transforms validate their inputs before mutating anything, so a returned
/// error implies the source collection is unmodified. Synthesis never errors;
/// bad frames render as silence.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value was outside its domain.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending value.
        message: String,
    },

    /// An operation could not find a meaningful answer.
    #[error("invalid object: {message}")]
    InvalidObject {
        /// Description of the failed query.
        message: String,
    },

    /// External I/O failed, or a file was malformed.
    #[error("file I/O error: {message}")]
    FileIo {
        /// Description of the failure.
        message: String,
    },

    /// An internal invariant was violated. Should never reach a caller;
    /// indicates a bug.
    #[error("assertion failed: {message}")]
    Assertion {
        /// The violated invariant.
        message: String,
    },
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid object error.
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    /// Creates a file I/O error.
    pub fn file_io(message: impl Into<String>) -> Self {
        Self::FileIo {
            message: message.into(),
        }
    }

    /// Creates an assertion error.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::FileIo {
            message: err.to_string(),
        }
    }
}
