//! On-disk staging buffer.

use crate::chunks::FileChunks;
use crate::error::{StageError, StageResult};
use crate::stage::{Staged, StagingBuffer};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffix carried by every generated staging file name.
pub const STAGING_SUFFIX: &str = ".tmp-safewrite";

/// Name hint used for staging files that have no destination file name.
const ANONYMOUS_HINT: &str = "safewrite";

/// A staging buffer backed by a file on disk.
///
/// Writes go straight through a buffered handle to the staging file, so the
/// payload never has to fit in memory. The staging file is owned by the
/// stage: if the stage is dropped before [`finish`](StagingBuffer::finish),
/// the file is deleted.
///
/// # Durability
///
/// - `flush()` pushes buffered data to the OS
/// - `sync()` additionally calls `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use safewrite_stage::{FileStage, StagingBuffer};
/// use std::io::Write;
/// use std::path::Path;
///
/// let mut stage = FileStage::create_in(Path::new("/var/lib/app"), "state.json").unwrap();
/// stage.write_all(b"{}").unwrap();
/// stage.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStage {
    // Declared before `staged` so the handle is closed before any deletion.
    writer: BufWriter<File>,
    staged: StagedFile,
    pos: u64,
    len: u64,
}

impl FileStage {
    /// Creates (or truncates) a staging file at an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> StageResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| StageError::create(path, e))?;
        Ok(Self::from_file(file, path.to_path_buf()))
    }

    /// Creates a uniquely named, hidden staging file inside `dir`.
    ///
    /// The name has the form `.<hint>.<uuid>.tmp-safewrite`, so a staging
    /// file sits next to its destination and is easy to attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_in(dir: &Path, hint: &str) -> StageResult<Self> {
        let name = format!(".{hint}.{}{STAGING_SUFFIX}", Uuid::new_v4().simple());
        let path = dir.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StageError::create(&path, e))?;
        Ok(Self::from_file(file, path))
    }

    /// Creates a uniquely named staging file in the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_temp() -> StageResult<Self> {
        Self::create_in(&std::env::temp_dir(), ANONYMOUS_HINT)
    }

    /// Flushes and closes the staging file, returning its guard.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data cannot be flushed; the staging file
    /// is deleted in that case.
    pub fn into_staged(self) -> StageResult<StagedFile> {
        let Self {
            writer,
            mut staged,
            len,
            ..
        } = self;
        // On error `staged` is dropped here, deleting the partial file.
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        drop(file);
        staged.len = len;
        Ok(staged)
    }

    fn from_file(file: File, path: PathBuf) -> Self {
        Self {
            writer: BufWriter::new(file),
            staged: StagedFile::new(path, 0),
            pos: 0,
            len: 0,
        }
    }
}

impl Write for FileStage {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(data)?;
        self.pos += n as u64;
        self.len = self.len.max(self.pos);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for FileStage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.writer.seek(pos)?;
        Ok(self.pos)
    }
}

impl StagingBuffer for FileStage {
    fn len(&self) -> StageResult<u64> {
        Ok(self.len)
    }

    fn sync(&mut self) -> StageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(self.staged.path())
    }

    fn finish(self: Box<Self>) -> StageResult<Staged> {
        Ok(Staged::File(self.into_staged()?))
    }

    fn abandon(self: Box<Self>) -> Staged {
        let Self {
            writer,
            mut staged,
            len,
            ..
        } = *self;
        if let Err(e) = writer.into_inner() {
            tracing::debug!(
                path = %staged.path().display(),
                error = %e.error(),
                "staging buffer not flushed on abandon"
            );
        }
        staged.len = len;
        Staged::File(staged)
    }
}

/// A staging file that has been closed for writing.
///
/// This is a guard: unless it is explicitly kept, the file is deleted when
/// the guard is dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    len: u64,
    armed: bool,
}

impl StagedFile {
    fn new(path: PathBuf, len: u64) -> Self {
        Self {
            path,
            len,
            armed: true,
        }
    }

    /// Returns the staging file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the staged payload size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the staged payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens the staged payload as a sequence of fixed-size byte chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or the file cannot be opened.
    pub fn chunks(&self, chunk_size: usize) -> StageResult<FileChunks> {
        FileChunks::open(&self.path, chunk_size, false)
    }

    /// Opens the staged payload as chunks that never split a UTF-8 sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or the file cannot be opened.
    pub fn text_chunks(&self, chunk_size: usize) -> StageResult<FileChunks> {
        FileChunks::open(&self.path, chunk_size, true)
    }

    /// Releases the guard and returns the path, leaving the file alone.
    ///
    /// Used once the file has been renamed onto its destination, or when it
    /// must be retained for inspection.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Deletes the staging file now.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(mut self) -> StageResult<()> {
        self.armed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to remove staging file"
                    );
                }
            }
        }
    }
}
