//! Error types for SafeWrite core.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while staging, committing or delivering output.
#[derive(Debug, Error)]
pub enum Error {
    /// Staging buffer error.
    #[error("staging error: {0}")]
    Stage(#[from] safewrite_stage::StageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sink rejected the finished payload.
    #[error("delivery failed: {source}")]
    Delivery {
        /// The error reported by the sink.
        #[source]
        source: io::Error,
    },

    /// The destination's parent directory could not be created.
    #[error("cannot create parent directory {}: {source}", path.display())]
    ParentCreate {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The destination's parent directory does not exist.
    #[error("parent directory does not exist: {}", path.display())]
    MissingParent {
        /// The missing directory.
        path: PathBuf,
    },

    /// Replacing the destination failed; the destination is unchanged.
    #[error("commit to {} failed: {source}", path.display())]
    Commit {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The mode string is invalid or not usable for transactional writes.
    #[error("invalid mode {mode:?}: {reason}")]
    InvalidMode {
        /// The offending mode string.
        mode: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the inconsistency.
        message: String,
    },

    /// Exclusive creation was requested but the destination exists.
    #[error("destination already exists: {}", path.display())]
    DestinationExists {
        /// The destination path.
        path: PathBuf,
    },

    /// The session has already been finished.
    #[error("session is closed")]
    Closed,

    /// A value could not be serialized.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Creates a delivery error.
    pub fn delivery(source: io::Error) -> Self {
        Self::Delivery { source }
    }

    /// Creates a commit error.
    pub fn commit(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Commit {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid mode error.
    pub fn invalid_mode(mode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMode {
            mode: mode.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl fmt::Display) -> Self {
        Self::Serialize {
            message: message.to_string(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Stage(e) => e.into(),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Error returned from a scoped session run.
///
/// The caller's own error always takes precedence. If finishing the session
/// also failed while the caller's error was being handled, that error is kept
/// alongside as `cleanup` instead of being lost.
#[derive(Debug)]
pub enum ScopeError<E> {
    /// The caller's closure failed; the output was discarded.
    Caller {
        /// The caller's error, unchanged.
        error: E,
        /// An error raised while discarding, if any.
        cleanup: Option<Error>,
    },
    /// The closure succeeded but committing the output failed.
    Finish(Error),
}

impl<E> ScopeError<E> {
    /// Returns the caller's error, if the closure failed.
    pub fn caller(&self) -> Option<&E> {
        match self {
            Self::Caller { error, .. } => Some(error),
            Self::Finish(_) => None,
        }
    }

    /// Unwraps the caller's error, if the closure failed.
    pub fn into_caller(self) -> Option<E> {
        match self {
            Self::Caller { error, .. } => Some(error),
            Self::Finish(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ScopeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller {
                error,
                cleanup: None,
            } => write!(f, "{error}"),
            Self::Caller {
                error,
                cleanup: Some(cleanup),
            } => write!(f, "{error} (while discarding output: {cleanup})"),
            Self::Finish(e) => write!(f, "{e}"),
        }
    }
}

impl<E> std::error::Error for ScopeError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Caller { error, .. } => Some(error),
            Self::Finish(e) => Some(e),
        }
    }
}

impl From<ScopeError<Error>> for Error {
    fn from(err: ScopeError<Error>) -> Self {
        match err {
            ScopeError::Caller { error, .. } => error,
            ScopeError::Finish(e) => e,
        }
    }
}
