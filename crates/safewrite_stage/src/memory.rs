//! In-memory staging buffer.

use crate::error::StageResult;
use crate::stage::{Staged, StagingBuffer};
use bytes::Bytes;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

/// An in-memory staging buffer.
///
/// Everything written is kept in a growable buffer with no footprint outside
/// the process. On [`finish`](StagingBuffer::finish) the buffer is handed
/// over as [`Bytes`] without copying.
///
/// # Example
///
/// ```rust
/// use safewrite_stage::{MemoryStage, Staged, StagingBuffer};
/// use std::io::Write;
///
/// let mut stage = MemoryStage::new();
/// stage.write_all(b"test data").unwrap();
/// assert_eq!(stage.len().unwrap(), 9);
///
/// match Box::new(stage).finish().unwrap() {
///     Staged::Memory(bytes) => assert_eq!(&bytes[..], b"test data"),
///     Staged::File(_) => unreachable!(),
/// }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStage {
    buf: Cursor<Vec<u8>>,
}

impl MemoryStage {
    /// Creates a new empty in-memory stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that already holds `data`, positioned at its end.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let mut buf = Cursor::new(data);
        buf.set_position(buf.get_ref().len() as u64);
        Self { buf }
    }

    /// Returns the bytes staged so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.buf.get_ref()
    }
}

impl Write for MemoryStage {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing is pending outside the buffer
        Ok(())
    }
}

impl Seek for MemoryStage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buf.seek(pos)
    }
}

impl StagingBuffer for MemoryStage {
    fn len(&self) -> StageResult<u64> {
        Ok(self.buf.get_ref().len() as u64)
    }

    fn sync(&mut self) -> StageResult<()> {
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn finish(self: Box<Self>) -> StageResult<Staged> {
        Ok(Staged::Memory(Bytes::from(self.buf.into_inner())))
    }

    fn abandon(self: Box<Self>) -> Staged {
        Staged::Memory(Bytes::from(self.buf.into_inner()))
    }
}
