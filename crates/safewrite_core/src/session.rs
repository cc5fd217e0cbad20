//! Transactional write sessions.
//!
//! A [`Session`] is a proxy stream: the caller writes to it exactly as to a
//! file, and nothing reaches the destination until the session finishes
//! cleanly.
//!
//! ```text
//!   Open ──close()──▶ Finishing ──▶ Closed
//!                        │
//!          failed or dry run? ── yes ──▶ discard (delete / retain staging)
//!                        │
//!                        no ──▶ commit (rename onto path, or deliver to sink)
//! ```
//!
//! The failure flag is set by [`Session::fail`], by a closure passed to
//! [`Session::run`] returning `Err`, by a staging write error, or by the
//! session being dropped while still open (including during a panic). Once
//! set it is never cleared.

use crate::commit::CommitReport;
use crate::config::{Config, DryRun, Staging};
use crate::error::{Error, Result, ScopeError};
use crate::sink::Sink;
use safewrite_stage::{
    FileChunks, FileStage, MemoryStage, StageError, Staged, StagedFile, StagingBuffer,
};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes.
    Open,
    /// Deciding between commit and discard.
    Finishing,
    /// Finished; the session is inert.
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The payload replaced the destination or was delivered to the sink.
    Committed {
        /// Payload size in bytes.
        bytes: u64,
        /// True if a cross-volume commit fell back to a non-atomic copy.
        degraded: bool,
    },
    /// The session failed; the destination is unchanged.
    Discarded {
        /// Staging file kept for inspection, if retention was requested.
        retained: Option<PathBuf>,
    },
    /// A dry run completed; the destination was never touched.
    DryRun {
        /// Payload size in bytes.
        bytes: u64,
        /// True if the payload was handed to a redirect callback.
        redirected: bool,
    },
    /// Output went straight to the sink without staging.
    PassedThrough {
        /// Bytes written.
        bytes: u64,
    },
}

impl Outcome {
    /// Returns true if the destination received the output.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::PassedThrough { .. })
    }
}

/// A transactional output stream.
///
/// Writes are staged; [`close`](Session::close) (or [`commit`](Session::commit))
/// delivers them only if the session has not failed. Dropping an open session
/// marks it failed and discards its output, so an early return through `?`
/// or a panic never leaves a half-written destination.
///
/// # Example
///
/// ```rust
/// use safewrite_core::{Config, Session, Sink};
/// use std::io::Write;
///
/// let mut out = Vec::new();
/// let mut session = Session::new(Sink::stream(&mut out), Config::default()).unwrap();
/// session.write_all(b"one").unwrap();
/// session.write_all(b"two").unwrap();
/// session.commit().unwrap();
/// assert_eq!(out, b"onetwo");
/// ```
pub struct Session<'a> {
    state: SessionState,
    stage: Option<Box<dyn StagingBuffer>>,
    sink: Sink<'a>,
    failed: bool,
    binary: bool,
    written: u64,
    delete_failures: bool,
    close_on_exit: bool,
    chunk_size: usize,
    sync: bool,
    dry_run: DryRun,
    outcome: Option<Outcome>,
}

impl<'a> Session<'a> {
    /// Starts a session writing to `sink`.
    ///
    /// For path sinks the destination is resolved, its parent directory is
    /// materialized when disk staging needs it, and for append and `r+`
    /// modes its current content is copied into the staging buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the payload kind
    /// conflicts with the sink, the destination cannot be resolved, or the
    /// staging buffer cannot be created or preloaded.
    pub fn new(mut sink: Sink<'a>, config: Config) -> Result<Self> {
        config.validate()?;
        let binary = resolve_binary(&sink, &config)?;

        if let Sink::Path(dest) = &mut sink {
            dest.configure(&config)?;
        }

        let mut staging = config.effective_staging();
        if staging == Staging::Direct && config.dry_run.is_active() {
            // A dry run must never reach the destination
            staging = Staging::Memory;
        }

        let mut stage: Option<Box<dyn StagingBuffer>> = match (&staging, &sink) {
            (Staging::Direct, _) => None,
            (Staging::Memory, _) => Some(Box::new(MemoryStage::new())),
            (Staging::DiskAt(path), _) => Some(Box::new(FileStage::create(path)?)),
            (Staging::Disk, Sink::Path(dest)) => Some(Box::new(dest.stage_sibling()?)),
            (Staging::Disk, _) => Some(Box::new(FileStage::create_temp()?)),
        };

        if let (Some(stage), Sink::Path(dest)) = (stage.as_mut(), &sink) {
            if config.mode.preserves_existing() {
                if let Some(mut existing) = dest.open_existing()? {
                    let copied = stage.preload(&mut existing)?;
                    if !config.mode.append {
                        stage.seek(SeekFrom::Start(0))?;
                    }
                    tracing::debug!(
                        path = %dest.path().display(),
                        bytes = copied,
                        "preloaded existing destination"
                    );
                }
            }
        }

        tracing::debug!(sink = ?sink, staging = ?staging, binary, "session opened");
        Ok(Self {
            state: SessionState::Open,
            stage,
            sink,
            failed: false,
            binary,
            written: 0,
            delete_failures: config.delete_failures,
            close_on_exit: config.close_on_exit && !config.dry_run.is_active(),
            chunk_size: config.chunk_size,
            sync: config.sync,
            dry_run: config.dry_run,
            outcome: None,
        })
    }

    /// Starts a session replacing the file at `path`.
    ///
    /// # Errors
    ///
    /// See [`Session::new`].
    pub fn open(path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        Self::new(Sink::path(path), config)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if the session has failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Marks the session failed. Its output will be discarded.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Returns true if the payload is binary rather than text.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Returns the staging file path while output is staged on disk.
    #[must_use]
    pub fn staging_path(&self) -> Option<&Path> {
        self.stage.as_ref().and_then(|stage| stage.path())
    }

    /// Returns how the session ended, once it has.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Finishes the session: commits if it has not failed, discards
    /// otherwise. Calling it again returns the first outcome and does
    /// nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Commit`], [`Error::MissingParent`],
    /// [`Error::ParentCreate`] or [`Error::Delivery`] if committing fails;
    /// the session is then failed and its output discarded.
    pub fn close(&mut self) -> Result<Outcome> {
        match self.state {
            SessionState::Open => {}
            SessionState::Finishing => return Err(Error::Closed),
            SessionState::Closed => {
                return Ok(self.outcome.clone().unwrap_or(Outcome::Discarded {
                    retained: None,
                }))
            }
        }

        self.state = SessionState::Finishing;
        let settled = self.settle();
        let closed = if self.close_on_exit {
            self.sink.close(self.failed)
        } else {
            Ok(())
        };
        self.state = SessionState::Closed;

        let outcome = match settled {
            Ok(outcome) => outcome,
            Err(e) => {
                if self.outcome.is_none() {
                    self.outcome = Some(Outcome::Discarded { retained: None });
                }
                return Err(e);
            }
        };
        self.outcome = Some(outcome.clone());
        closed?;
        Ok(outcome)
    }

    /// Finishes the session, consuming it.
    ///
    /// # Errors
    ///
    /// See [`Session::close`].
    pub fn commit(mut self) -> Result<Outcome> {
        self.close()
    }

    /// Fails and finishes the session, consuming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging file cannot be removed.
    pub fn abort(mut self) -> Result<Outcome> {
        self.fail();
        self.close()
    }

    /// Runs `f` against the session and finishes it.
    ///
    /// If `f` returns `Err`, the session is failed before anything is
    /// decided, its output is discarded, and the error is returned unchanged
    /// inside [`ScopeError::Caller`]. A panic inside `f` discards the output
    /// as the session is dropped during unwinding.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Caller`] if `f` failed, [`ScopeError::Finish`] if `f`
    /// succeeded but committing did not.
    pub fn run<T, E, F>(mut self, f: F) -> std::result::Result<T, ScopeError<E>>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
    {
        match f(&mut self) {
            Ok(value) => match self.close() {
                Ok(_) => Ok(value),
                Err(e) => Err(ScopeError::Finish(e)),
            },
            Err(error) => {
                self.fail();
                let cleanup = self.close().err();
                if let Some(e) = &cleanup {
                    tracing::warn!(error = %e, "error while discarding output of failed session");
                }
                Err(ScopeError::Caller { error, cleanup })
            }
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.state == SessionState::Open {
            Ok(())
        } else {
            Err(io::Error::other(Error::Closed))
        }
    }

    fn settle(&mut self) -> Result<Outcome> {
        let Some(mut stage) = self.stage.take() else {
            if self.failed {
                tracing::warn!("session failed after output was passed straight through");
            }
            self.sink.flush_through().map_err(Error::delivery)?;
            return Ok(Outcome::PassedThrough {
                bytes: self.written,
            });
        };

        if self.failed {
            return self.discard(stage.abandon());
        }

        if self.sync && stage.path().is_some() {
            if let Err(e) = stage.sync() {
                return Err(self.abandon_with(stage.abandon(), e.into()));
            }
        }

        let staged = match stage.finish() {
            Ok(staged) => staged,
            Err(e) => {
                self.failed = true;
                self.outcome = Some(Outcome::Discarded { retained: None });
                return Err(e.into());
            }
        };

        match self.dry_run.clone() {
            DryRun::Off => self.deliver(staged),
            DryRun::Discard => {
                let bytes = staged.len();
                staged.discard(false)?;
                tracing::debug!(bytes, "dry run: output discarded");
                Ok(Outcome::DryRun {
                    bytes,
                    redirected: false,
                })
            }
            DryRun::Redirect(redirect) => self.redirect(staged, false, |chunk| redirect(chunk)),
            DryRun::RedirectText(redirect) => self.redirect(staged, true, |chunk| {
                let text = std::str::from_utf8(chunk)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                redirect(text)
            }),
        }
    }

    fn deliver(&mut self, staged: Staged) -> Result<Outcome> {
        let bytes = staged.len();
        let delivered = match (&staged, &mut self.sink) {
            (Staged::File(file), Sink::Path(dest)) => dest.promote(file),
            (Staged::Memory(payload), Sink::Path(dest)) => dest.write_bytes(payload),
            (Staged::Memory(payload), sink) => sink.deliver(payload).map(|()| CommitReport {
                bytes,
                degraded: false,
            }),
            (Staged::File(file), sink) => open_chunks(file, self.chunk_size, sink.wants_text())
                .and_then(|chunks| send_chunks(chunks, |chunk| sink.deliver(chunk)))
                .map(|()| CommitReport {
                    bytes,
                    degraded: false,
                }),
        };

        match delivered {
            Ok(report) => {
                if let Staged::File(file) = staged {
                    if matches!(self.sink, Sink::Path(_)) {
                        let _ = file.keep();
                    } else if let Err(e) = file.remove() {
                        tracing::warn!(error = %e, "output delivered but staging file could not be removed");
                    }
                }
                tracing::debug!(bytes = report.bytes, degraded = report.degraded, "output committed");
                Ok(Outcome::Committed {
                    bytes: report.bytes,
                    degraded: report.degraded,
                })
            }
            Err(e) => Err(self.abandon_with(staged, e)),
        }
    }

    fn redirect<F>(&mut self, staged: Staged, text: bool, mut send: F) -> Result<Outcome>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        let bytes = staged.len();
        let sent = match &staged {
            Staged::Memory(payload) => send(&payload[..]).map_err(Error::delivery),
            Staged::File(file) => open_chunks(file, self.chunk_size, text).and_then(|chunks| {
                send_chunks(chunks, |chunk| send(chunk).map_err(Error::delivery))
            }),
        };
        staged.discard(false)?;
        sent?;
        tracing::debug!(bytes, "dry run: output redirected");
        Ok(Outcome::DryRun {
            bytes,
            redirected: true,
        })
    }

    /// Fails the session after `error`, discards `staged` and records the
    /// outcome. A discard error is logged; `error` is what the caller sees.
    fn abandon_with(&mut self, staged: Staged, error: Error) -> Error {
        self.failed = true;
        let outcome = match self.discard(staged) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "could not discard output of failed session");
                Outcome::Discarded { retained: None }
            }
        };
        self.outcome = Some(outcome);
        error
    }

    fn discard(&mut self, staged: Staged) -> Result<Outcome> {
        let retained = staged.discard(!self.delete_failures)?;
        match &retained {
            Some(path) => tracing::warn!(
                path = %path.display(),
                "session failed; staging file retained"
            ),
            None => tracing::debug!("session failed; output discarded"),
        }
        Ok(Outcome::Discarded { retained })
    }
}

impl Write for Session<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let result = match self.stage.as_mut() {
            Some(stage) => stage.write(data).inspect_err(|_| self.failed = true),
            None => self.sink.write_through(data),
        };
        let n = result?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        match self.stage.as_mut() {
            Some(stage) => stage.flush(),
            None => self.sink.flush_through(),
        }
    }
}

impl Seek for Session<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        match self.stage.as_mut() {
            Some(stage) => stage.seek(pos),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pass-through output is not seekable",
            )),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        if !self.failed {
            self.failed = true;
            if std::thread::panicking() {
                tracing::debug!("session dropped while panicking; discarding output");
            } else {
                tracing::warn!("session dropped without being closed; discarding output");
            }
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to discard output of dropped session");
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("sink", &self.sink)
            .field("failed", &self.failed)
            .field("binary", &self.binary)
            .field("staging_path", &self.staging_path())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Decides between a binary and a text payload.
fn resolve_binary(sink: &Sink<'_>, config: &Config) -> Result<bool> {
    let hint = match sink {
        Sink::Path(_) => Some(config.mode.binary),
        other => other.binary_hint(),
    };
    let binary = match (config.binary, hint) {
        (Some(explicit), Some(hint)) if explicit != hint => {
            return Err(Error::invalid_config(format!(
                "binary={explicit} is inconsistent with the sink or mode {}",
                config.mode
            )))
        }
        (Some(explicit), _) => explicit,
        (None, Some(hint)) => hint,
        (None, None) => config.mode.binary,
    };
    if binary && matches!(config.dry_run, DryRun::RedirectText(_)) {
        return Err(Error::invalid_config(
            "text redirect declared for a binary payload",
        ));
    }
    Ok(binary)
}

fn open_chunks(file: &StagedFile, chunk_size: usize, text: bool) -> Result<FileChunks> {
    Ok(if text {
        file.text_chunks(chunk_size)?
    } else {
        file.chunks(chunk_size)?
    })
}

fn send_chunks<F>(chunks: FileChunks, mut send: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    for chunk in chunks {
        let chunk = chunk.map_err(|e| match e {
            StageError::InvalidUtf8 { .. } => {
                Error::delivery(io::Error::new(io::ErrorKind::InvalidData, e))
            }
            other => Error::Stage(other),
        })?;
        send(&chunk)?;
    }
    Ok(())
}
