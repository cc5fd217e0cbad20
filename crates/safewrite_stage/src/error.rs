//! Error types for staging operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for staging operations.
pub type StageResult<T> = Result<T, StageError>;

/// Errors that can occur while staging output.
#[derive(Debug, Error)]
pub enum StageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The staging file could not be created.
    #[error("cannot create staging file {}: {source}", path.display())]
    Create {
        /// The staging file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A chunk size of zero was requested.
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// Staged text is not valid UTF-8.
    #[error("staged text is not valid UTF-8 at byte {offset}")]
    InvalidUtf8 {
        /// Absolute offset of the first invalid byte.
        offset: u64,
    },
}

impl StageError {
    /// Creates a staging file creation error.
    pub fn create(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Create {
            path: path.into(),
            source,
        }
    }
}

impl From<StageError> for io::Error {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Io(e) => e,
            StageError::Create { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
