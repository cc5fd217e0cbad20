//! Atomic replacement of path destinations.
//!
//! A commit follows the write-then-rename pattern:
//! 1. Make sure the destination's parent directory exists
//! 2. Sync the staged file to disk
//! 3. Copy the existing destination's permissions onto the staged file
//! 4. Rename the staged file over the destination
//! 5. Fsync the parent directory so the rename itself is durable
//!
//! A rename within one filesystem is atomic: readers see either the complete
//! old content or the complete new content. When the staged file lives on a
//! different filesystem the rename fails with `EXDEV`; the commit then falls
//! back to copying the staged file beside the destination, renaming the copy
//! into place and deleting the staged file. That is **not** atomic end to
//! end: it is reported as degraded in the [`CommitReport`] and logged.
//!
//! Once the destination has been replaced the commit counts as done.
//! Cleanup steps that fail after that point (directory sync, removing the
//! staged file) are logged as warnings instead of failing the commit.

use crate::config::{Config, SymlinkPolicy};
use crate::error::{Error, Result};
use crate::mode::OpenMode;
use safewrite_stage::{FileStage, StagedFile, StagingBuffer};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Maximum number of symbolic links followed when resolving a destination.
const MAX_SYMLINK_DEPTH: usize = 40;

/// Result of replacing a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Bytes now held by the destination.
    pub bytes: u64,
    /// True if the replacement fell back to a non-atomic copy.
    pub degraded: bool,
}

/// A filesystem destination.
///
/// Created from the path the caller asked for; the session resolves it
/// against its [`Config`] before any output is staged.
#[derive(Debug)]
pub struct Destination {
    requested: PathBuf,
    path: PathBuf,
    mode: OpenMode,
    create_parents: bool,
    sync: bool,
    allow_degraded: bool,
    direct: Option<File>,
}

impl Destination {
    /// Creates an unresolved destination.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            requested: path.clone(),
            path,
            mode: OpenMode::WRITE,
            create_parents: false,
            sync: true,
            allow_degraded: true,
            direct: None,
        }
    }

    /// Returns the path that is actually replaced on commit.
    ///
    /// After resolution this is absolute and, under
    /// [`SymlinkPolicy::FollowTarget`], the final target of any symlink chain.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path the caller asked for.
    #[must_use]
    pub fn requested(&self) -> &Path {
        &self.requested
    }

    /// Returns the directory that holds the destination.
    #[must_use]
    pub fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Returns true if the destination currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    /// Applies session configuration and resolves the real target path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationExists`] for exclusive mode when the
    /// destination exists, or [`Error::Commit`] if the path cannot be
    /// resolved (for example a symlink loop).
    pub fn configure(&mut self, config: &Config) -> Result<()> {
        self.mode = config.mode;
        self.create_parents = config.create_parents;
        self.sync = config.sync;
        self.allow_degraded = config.allow_degraded;

        let absolute =
            std::path::absolute(&self.requested).map_err(|e| Error::commit(&self.requested, e))?;
        self.path = match config.symlinks {
            SymlinkPolicy::ReplaceLink => absolute,
            SymlinkPolicy::FollowTarget => follow_symlinks(&absolute)?,
        };

        if self.mode.exclusive && self.exists() {
            return Err(Error::DestinationExists {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Creates the parent directory if it is missing and allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if the directory is absent and
    /// parent creation is off, or [`Error::ParentCreate`] if creating it
    /// fails.
    pub fn ensure_parent(&self) -> Result<()> {
        let parent = self.parent();
        if parent.is_dir() {
            return Ok(());
        }
        if !self.create_parents {
            return Err(Error::MissingParent {
                path: parent.to_path_buf(),
            });
        }
        fs::create_dir_all(parent).map_err(|source| Error::ParentCreate {
            path: parent.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %parent.display(), "created parent directory");
        Ok(())
    }

    /// Opens the current destination content for preloading.
    ///
    /// Returns `None` if the destination does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination exists but cannot be read.
    pub fn open_existing(&self) -> Result<Option<File>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a staging file next to the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory is missing or the file cannot
    /// be created.
    pub fn stage_sibling(&self) -> Result<FileStage> {
        self.ensure_parent()?;
        let hint = self
            .path
            .file_name()
            .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(FileStage::create_in(self.parent(), &hint)?)
    }

    /// Replaces the destination with a finished staging file.
    ///
    /// On success the staging file no longer exists under its own name; the
    /// caller should release its guard with [`StagedFile::keep`]. On failure
    /// the destination is unchanged and the staging file is left for the
    /// caller to discard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`], [`Error::ParentCreate`] or
    /// [`Error::Commit`].
    pub fn promote(&self, staged: &StagedFile) -> Result<CommitReport> {
        self.promote_with(staged, &RealFs)
    }

    fn promote_with(&self, staged: &StagedFile, fs_ops: &impl CommitFs) -> Result<CommitReport> {
        self.ensure_parent()?;

        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(staged.path(), meta.permissions())
                .map_err(|e| Error::commit(&self.path, e))?;
        }

        let degraded = replace_with(
            fs_ops,
            staged.path(),
            &self.path,
            self.allow_degraded,
            self.sync,
        )
        .map_err(|e| Error::commit(&self.path, e))?;

        // The destination holds the new content from here on
        if self.sync {
            if let Err(e) = fs_ops.sync_dir(self.parent()) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "destination replaced but its directory could not be synced"
                );
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            bytes = staged.len(),
            degraded,
            "destination replaced"
        );
        Ok(CommitReport {
            bytes: staged.len(),
            degraded,
        })
    }

    /// Replaces the destination with an in-memory payload.
    ///
    /// The payload is written to a sibling staging file first and then
    /// promoted, so the replacement is as atomic as an on-disk staged commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`], [`Error::ParentCreate`] or
    /// [`Error::Commit`].
    pub fn write_bytes(&self, payload: &[u8]) -> Result<CommitReport> {
        let mut stage = self.stage_sibling()?;
        stage
            .write_all(payload)
            .map_err(|e| Error::commit(&self.path, e))?;
        if self.sync {
            stage.sync().map_err(|e| Error::commit(&self.path, e.into()))?;
        }
        let staged = stage
            .into_staged()
            .map_err(|e| Error::commit(&self.path, e.into()))?;
        let report = self.promote(&staged)?;
        let _ = staged.keep();
        Ok(report)
    }

    /// Writes straight into the destination, opening it on first use.
    pub(crate) fn write_through(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.direct.is_none() {
            self.ensure_parent().map_err(io::Error::from)?;
            let file = OpenOptions::new()
                .write(true)
                .create(!self.mode.exclusive)
                .create_new(self.mode.exclusive)
                .append(self.mode.append)
                .truncate(!self.mode.append && !self.mode.preserves_existing())
                .open(&self.path)?;
            self.direct = Some(file);
        }
        match self.direct.as_mut() {
            Some(file) => file.write(data),
            None => Ok(0),
        }
    }

    pub(crate) fn flush_through(&mut self) -> io::Result<()> {
        match self.direct.as_mut() {
            Some(file) if self.sync => {
                file.flush()?;
                file.sync_all()
            }
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    pub(crate) fn close_through(&mut self) -> io::Result<()> {
        self.flush_through()?;
        self.direct = None;
        Ok(())
    }
}

/// Filesystem steps of a commit.
trait CommitFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        sync_directory(dir)
    }
}

struct RealFs;

impl CommitFs for RealFs {}

/// Renames `from` onto `to`, falling back to copy-then-delete across
/// filesystems when `allow_degraded` is set.
///
/// Returns true if the fallback was used. An error means the destination
/// was not replaced.
fn replace_with(
    fs_ops: &impl CommitFs,
    from: &Path,
    to: &Path,
    allow_degraded: bool,
    sync: bool,
) -> io::Result<bool> {
    match fs_ops.rename(from, to) {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices && allow_degraded => {
            tracing::warn!(
                staged = %from.display(),
                path = %to.display(),
                "staging file is on another filesystem; replacing destination by copy, which is not atomic"
            );
            copy_beside(fs_ops, from, to, sync)?;
            if let Err(e) = fs_ops.remove(from) {
                tracing::warn!(
                    staged = %from.display(),
                    error = %e,
                    "destination replaced but the staging file could not be removed"
                );
            }
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Copies `from` into a fresh sibling of `to` and renames it into place,
/// so an interrupted copy never shows up under the destination's name.
fn copy_beside(fs_ops: &impl CommitFs, from: &Path, to: &Path, sync: bool) -> io::Result<()> {
    let dir = match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let hint = to
        .file_name()
        .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
    let copy = FileStage::create_in(dir, &hint)?.into_staged()?;

    fs::copy(from, copy.path())?;
    if sync {
        File::open(copy.path())?.sync_all()?;
    }
    fs_ops.rename(copy.path(), to)?;
    let _ = copy.keep();
    Ok(())
}

/// Resolves a chain of symbolic links at the final path component.
///
/// Dangling links resolve to the path they point at, so a commit creates
/// the missing target and the link stays intact.
fn follow_symlinks(path: &Path) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_DEPTH {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&current).map_err(|e| Error::commit(path, e))?;
                current = if target.is_absolute() {
                    target
                } else {
                    current
                        .parent()
                        .unwrap_or_else(|| Path::new("/"))
                        .join(target)
                };
            }
            _ => return Ok(current),
        }
    }
    Err(Error::commit(
        path,
        io::Error::new(io::ErrorKind::Other, "too many levels of symbolic links"),
    ))
}

/// Syncs a directory so that entries renamed into it are durable.
#[cfg(unix)]
fn sync_directory(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> io::Result<()> {
    // Directory handles cannot be fsynced here; NTFS journals metadata
    Ok(())
}
