//! Bounded chunked reads of a staged file.

use crate::error::{StageError, StageResult};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Default chunk size for handing a staged file to a sink (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// A lazy, finite sequence of chunks read from a staging file.
///
/// Each chunk holds at most `chunk_size` bytes (a text chunk may carry up to
/// three extra bytes from the previous read so that a UTF-8 sequence is
/// never split). Memory use is bounded by the chunk size, not the payload.
///
/// The sequence can be restarted from the first byte with [`rewind`].
///
/// [`rewind`]: FileChunks::rewind
#[derive(Debug)]
pub struct FileChunks {
    file: File,
    chunk_size: usize,
    text: bool,
    offset: u64,
    carry: Vec<u8>,
    done: bool,
}

impl FileChunks {
    /// Opens `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or the file cannot be opened.
    pub fn open(path: &Path, chunk_size: usize, text: bool) -> StageResult<Self> {
        if chunk_size == 0 {
            return Err(StageError::ZeroChunkSize);
        }
        Ok(Self {
            file: File::open(path)?,
            chunk_size,
            text,
            offset: 0,
            carry: Vec::new(),
            done: false,
        })
    }

    /// Restarts the sequence at the first byte of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be repositioned.
    pub fn rewind(&mut self) -> StageResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        self.carry.clear();
        self.done = false;
        Ok(())
    }

    fn next_chunk(&mut self) -> StageResult<Option<Vec<u8>>> {
        loop {
            let mut chunk = std::mem::take(&mut self.carry);
            let start = chunk.len();
            chunk.resize(start + self.chunk_size, 0);
            let n = read_full(&mut self.file, &mut chunk[start..])?;
            chunk.truncate(start + n);

            if n == 0 {
                self.done = true;
                if chunk.is_empty() {
                    return Ok(None);
                }
                if self.text {
                    // Trailing bytes of an unfinished sequence
                    return Err(StageError::InvalidUtf8 {
                        offset: self.offset,
                    });
                }
            } else if self.text {
                if let Err(e) = std::str::from_utf8(&chunk) {
                    if e.error_len().is_some() {
                        self.done = true;
                        return Err(StageError::InvalidUtf8 {
                            offset: self.offset + e.valid_up_to() as u64,
                        });
                    }
                    self.carry = chunk.split_off(e.valid_up_to());
                    if chunk.is_empty() {
                        continue;
                    }
                }
            }

            self.offset += chunk.len() as u64;
            return Ok(Some(chunk));
        }
    }
}

impl Iterator for FileChunks {
    type Item = StageResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    fn collect(chunks: FileChunks) -> Vec<Vec<u8>> {
        chunks.map(|c| c.unwrap()).collect()
    }

    #[test]
    fn chunks_are_bounded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"abcdefghij").unwrap();

        let chunks = collect(FileChunks::open(&path, 4, false).unwrap());
        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
    }

    #[test]
    fn chunks_of_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"").unwrap();

        assert!(collect(FileChunks::open(&path, 4, false).unwrap()).is_empty());
    }

    #[test]
    fn chunks_zero_size_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"x").unwrap();

        assert!(matches!(
            FileChunks::open(&path, 0, false),
            Err(StageError::ZeroChunkSize)
        ));
    }

    #[test]
    fn chunks_rewind_restarts_from_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"abcdef").unwrap();

        let mut chunks = FileChunks::open(&path, 4, false).unwrap();
        assert_eq!(chunks.next().unwrap().unwrap(), b"abcd");
        chunks.rewind().unwrap();

        assert_eq!(collect(chunks), vec![b"abcd".to_vec(), b"ef".to_vec()]);
    }

    #[test]
    fn text_chunks_never_split_code_points() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        // "é" is two bytes, "€" is three
        fs::write(&path, "aé€b".as_bytes()).unwrap();

        let chunks = collect(FileChunks::open(&path, 2, true).unwrap());
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk).is_ok());
        }
        assert_eq!(chunks.concat(), "aé€b".as_bytes());
    }

    #[test]
    fn text_chunks_reject_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"ok\xffno").unwrap();

        let mut chunks = FileChunks::open(&path, 16, true).unwrap();
        assert!(matches!(
            chunks.next(),
            Some(Err(StageError::InvalidUtf8 { offset: 2 }))
        ));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn text_chunks_reject_truncated_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged");
        fs::write(&path, b"ab\xe2\x82").unwrap();

        let results: Vec<_> = FileChunks::open(&path, 16, true).unwrap().collect();
        assert!(matches!(
            results.last(),
            Some(Err(StageError::InvalidUtf8 { .. }))
        ));
    }

    proptest! {
        #[test]
        fn chunks_reassemble_payload(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..300,
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("staged");
            fs::write(&path, &data).unwrap();

            let chunks = collect(FileChunks::open(&path, chunk_size, false).unwrap());
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= chunk_size));
            prop_assert_eq!(chunks.concat(), data);
        }

        #[test]
        fn text_chunks_reassemble_text(text in "\\PC{0,200}", chunk_size in 1usize..16) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("staged");
            fs::write(&path, text.as_bytes()).unwrap();

            let chunks = collect(FileChunks::open(&path, chunk_size, true).unwrap());
            let rebuilt: String = chunks
                .iter()
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect();
            prop_assert_eq!(rebuilt, text);
        }
    }
}
