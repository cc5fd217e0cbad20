//! Staging buffer trait definition.

use crate::error::StageResult;
use crate::file::StagedFile;
use bytes::Bytes;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// An accumulator that looks like an ordinary output stream but holds
/// everything written to it until the owner decides to deliver or drop it.
///
/// Staging buffers are **opaque byte stores**. They never interpret what is
/// written and never talk to the final destination; that is the job of the
/// session that owns them.
///
/// # Invariants
///
/// - Every byte accepted by `write` is part of the staged payload
/// - `len` is the size of the payload that `finish` will hand over
/// - `finish` and `abandon` consume the buffer, so no write can follow them
///
/// # Implementors
///
/// - [`super::MemoryStage`] - Growable in-memory buffer
/// - [`super::FileStage`] - Staging file on disk
pub trait StagingBuffer: Write + Seek + Send {
    /// Returns the number of bytes currently staged.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn len(&self) -> StageResult<u64>;

    /// Returns true if nothing has been staged yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn is_empty(&self) -> StageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Copies existing content into the buffer before any caller write.
    ///
    /// Used for append and read-update modes, where the destination's
    /// current content must survive. The stream position is left at the end
    /// of the preloaded data.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source or writing the buffer fails.
    fn preload(&mut self, source: &mut dyn Read) -> StageResult<u64> {
        Ok(io::copy(source, self)?)
    }

    /// Flushes staged data and, for disk staging, forces it to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    fn sync(&mut self) -> StageResult<()>;

    /// Returns the path of the backing staging file, if there is one.
    fn path(&self) -> Option<&Path>;

    /// Closes the buffer for writing and returns the staged payload.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data cannot be flushed.
    fn finish(self: Box<Self>) -> StageResult<Staged>;

    /// Closes the buffer without requiring a clean flush.
    ///
    /// Used on the failure path, where a flush error must not mask the
    /// first failure.
    fn abandon(self: Box<Self>) -> Staged;
}

/// A finished payload, closed for writing.
#[derive(Debug)]
pub enum Staged {
    /// Payload held in memory.
    Memory(Bytes),
    /// Payload held in a staging file.
    File(StagedFile),
}

impl Staged {
    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::File(file) => file.len(),
        }
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the payload.
    ///
    /// A staging file is deleted, or left on disk when `retain` is true, in
    /// which case its path is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging file cannot be deleted.
    pub fn discard(self, retain: bool) -> StageResult<Option<PathBuf>> {
        match self {
            Self::Memory(_) => Ok(None),
            Self::File(file) if retain => Ok(Some(file.keep())),
            Self::File(file) => {
                file.remove()?;
                Ok(None)
            }
        }
    }
}
