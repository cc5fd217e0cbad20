//! Transactional serialization.
//!
//! A value is serialized straight into a [`Session`], so a serializer error
//! halfway through discards everything instead of leaving a truncated
//! document behind.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::{Outcome, Session};
use crate::sink::Sink;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Serialization format for [`dump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Compact JSON.
    #[default]
    Json,
    /// Indented JSON with a trailing newline.
    JsonPretty,
    /// CBOR (RFC 8949).
    Cbor,
}

impl Format {
    /// Picks a format from a file extension, defaulting to JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("cbor") => Self::Cbor,
            _ => Self::Json,
        }
    }

    /// Returns true if the format produces binary output.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Cbor)
    }
}

/// Serializes `value` to `sink` as one transaction.
///
/// # Errors
///
/// Returns [`Error::Serialize`] if `value` cannot be serialized (nothing is
/// delivered), or any error from opening or committing the session.
///
/// # Example
///
/// ```rust
/// use safewrite_core::{dump, Format, Sink};
///
/// let mut out = Vec::new();
/// dump(&vec![1, 2, 3], Sink::stream(&mut out), Format::Json).unwrap();
/// assert_eq!(out, b"[1,2,3]");
/// ```
pub fn dump<T>(value: &T, sink: Sink<'_>, format: Format) -> Result<Outcome>
where
    T: Serialize + ?Sized,
{
    // JSON leaves the payload kind to the sink; CBOR needs a binary one
    let config = if format.is_binary() {
        Config::new().parse_mode("wb")?.binary(true)
    } else {
        Config::new()
    };
    let session = Session::new(sink, config)?;
    encode(value, session, format)
}

/// Serializes `value` to the file at `path`, replacing it atomically.
///
/// The format is inferred from the extension: `.cbor` selects CBOR,
/// anything else JSON.
///
/// # Errors
///
/// See [`dump`].
pub fn dump_to_path<T>(value: &T, path: impl Into<PathBuf>) -> Result<Outcome>
where
    T: Serialize + ?Sized,
{
    let path = path.into();
    let format = Format::from_path(&path);
    let mode = if format.is_binary() { "wb" } else { "w" };
    let session = Config::new().parse_mode(mode)?.open(path)?;
    encode(value, session, format)
}

fn encode<T>(value: &T, mut session: Session<'_>, format: Format) -> Result<Outcome>
where
    T: Serialize + ?Sized,
{
    let written = match format {
        Format::Json => serde_json::to_writer(&mut session, value).map_err(Error::serialize),
        Format::JsonPretty => serde_json::to_writer_pretty(&mut session, value)
            .map_err(Error::serialize)
            .and_then(|()| Ok(session.write_all(b"\n")?)),
        Format::Cbor => ciborium::into_writer(value, &mut session).map_err(Error::serialize),
    };

    if let Err(e) = written {
        let outcome = session.abort()?;
        tracing::debug!(error = %e, ?outcome, "serialization failed; output discarded");
        return Err(e);
    }
    session.commit()
}
