//! Session configuration.

use crate::error::{Error, Result};
use crate::mode::OpenMode;
use safewrite_stage::DEFAULT_CHUNK_SIZE;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Where written output is held until the session finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Staging {
    /// Growable in-memory buffer.
    #[default]
    Memory,
    /// Uniquely named staging file next to the destination (or in the
    /// system temp directory when the destination is not a path).
    Disk,
    /// Staging file at an explicit path.
    DiskAt(PathBuf),
    /// No staging: writes go straight to the sink. Output is not
    /// transactional.
    Direct,
}

impl Staging {
    /// Returns true if output is staged in a file.
    #[must_use]
    pub fn is_disk(&self) -> bool {
        matches!(self, Self::Disk | Self::DiskAt(_))
    }
}

/// How a path destination that is a symbolic link is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Replace the file the link points to; the link is preserved.
    #[default]
    FollowTarget,
    /// Replace the link itself with a regular file.
    ReplaceLink,
}

/// Callback receiving output that a dry run diverted from the destination.
pub type RedirectFn = dyn Fn(&[u8]) -> io::Result<()> + Send + Sync;

/// Callback receiving the diverted output of a text session.
pub type RedirectTextFn = dyn Fn(&str) -> io::Result<()> + Send + Sync;

/// Dry-run policy.
#[derive(Clone, Default)]
pub enum DryRun {
    /// Output is delivered normally.
    #[default]
    Off,
    /// Output is dropped; the destination is never touched.
    Discard,
    /// Output is handed to a callback instead of the destination.
    Redirect(Arc<RedirectFn>),
    /// Output of a text session is handed to a callback as `&str`.
    RedirectText(Arc<RedirectTextFn>),
}

impl DryRun {
    /// Creates a redirecting dry run.
    pub fn redirect<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> io::Result<()> + Send + Sync + 'static,
    {
        Self::Redirect(Arc::new(f))
    }

    /// Creates a redirecting dry run for text sessions.
    ///
    /// The callback receives whole characters only; a payload that is not
    /// valid UTF-8 fails the session like a text sink would.
    pub fn redirect_text<F>(f: F) -> Self
    where
        F: Fn(&str) -> io::Result<()> + Send + Sync + 'static,
    {
        Self::RedirectText(Arc::new(f))
    }

    /// Returns true if real delivery is suppressed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl fmt::Debug for DryRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Discard => f.write_str("Discard"),
            Self::Redirect(_) => f.write_str("Redirect(..)"),
            Self::RedirectText(_) => f.write_str("RedirectText(..)"),
        }
    }
}

impl From<bool> for DryRun {
    fn from(value: bool) -> Self {
        if value {
            Self::Discard
        } else {
            Self::Off
        }
    }
}

/// Configuration for a transactional write session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Open mode for path destinations (append/update/binary/exclusive).
    pub mode: OpenMode,

    /// Whether to create a missing parent directory of a path destination.
    pub create_parents: bool,

    /// Whether to delete the staging file when the session fails.
    ///
    /// When false the file is kept for inspection and its path is reported.
    pub delete_failures: bool,

    /// Staging strategy.
    pub staging: Staging,

    /// Chunk size used to hand a staging file to a non-path sink.
    pub chunk_size: usize,

    /// Whether to close the sink once the session finishes.
    pub close_on_exit: bool,

    /// Dry-run policy.
    pub dry_run: DryRun,

    /// Explicit binary (`Some(true)`) or text (`Some(false)`) payload.
    ///
    /// `None` infers it from the sink or the mode.
    pub binary: Option<bool>,

    /// Symbolic link handling for path destinations.
    pub symlinks: SymlinkPolicy,

    /// Whether a cross-volume commit may fall back to a non-atomic copy.
    pub allow_degraded: bool,

    /// Whether to fsync the staged data and parent directory on commit.
    pub sync: bool,

    /// Whether transactional behavior is enabled at all.
    ///
    /// When false, writes go straight to the sink.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: OpenMode::WRITE,
            create_parents: false,
            delete_failures: true,
            staging: Staging::Memory,
            chunk_size: DEFAULT_CHUNK_SIZE, // 1 MiB
            close_on_exit: false,
            dry_run: DryRun::Off,
            binary: None,
            symlinks: SymlinkPolicy::FollowTarget,
            allow_degraded: true,
            sync: true,
            enabled: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open mode.
    #[must_use]
    pub const fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parses and sets the open mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMode`] if the mode string is invalid.
    pub fn parse_mode(self, mode: &str) -> Result<Self> {
        Ok(self.mode(OpenMode::parse(mode)?))
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_parents(mut self, value: bool) -> Self {
        self.create_parents = value;
        self
    }

    /// Sets whether to delete staging files of failed sessions.
    #[must_use]
    pub const fn delete_failures(mut self, value: bool) -> Self {
        self.delete_failures = value;
        self
    }

    /// Sets the staging strategy.
    #[must_use]
    pub fn staging(mut self, staging: Staging) -> Self {
        self.staging = staging;
        self
    }

    /// Sets the chunk size for staging-file delivery.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets whether to close the sink when the session finishes.
    #[must_use]
    pub const fn close_on_exit(mut self, value: bool) -> Self {
        self.close_on_exit = value;
        self
    }

    /// Sets the dry-run policy.
    #[must_use]
    pub fn dry_run(mut self, dry_run: impl Into<DryRun>) -> Self {
        self.dry_run = dry_run.into();
        self
    }

    /// Declares the payload binary or text.
    #[must_use]
    pub const fn binary(mut self, value: bool) -> Self {
        self.binary = Some(value);
        self
    }

    /// Sets the symbolic link policy.
    #[must_use]
    pub const fn symlinks(mut self, policy: SymlinkPolicy) -> Self {
        self.symlinks = policy;
        self
    }

    /// Sets whether cross-volume commits may degrade to copy-then-delete.
    #[must_use]
    pub const fn allow_degraded(mut self, value: bool) -> Self {
        self.allow_degraded = value;
        self
    }

    /// Sets whether to fsync on commit.
    #[must_use]
    pub const fn sync(mut self, value: bool) -> Self {
        self.sync = value;
        self
    }

    /// Enables or bypasses transactional behavior.
    #[must_use]
    pub const fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    /// Returns the staging strategy in effect, accounting for `enabled`.
    #[must_use]
    pub fn effective_staging(&self) -> Staging {
        if self.enabled {
            self.staging.clone()
        } else {
            Staging::Direct
        }
    }

    /// Checks the configuration for inconsistencies that do not depend on
    /// the sink. Payload kind against the mode and the sink is checked when
    /// a session is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] or [`Error::InvalidMode`] describing
    /// the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(Error::invalid_mode(
                self.mode.to_string(),
                "not a write mode",
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be greater than zero"));
        }
        if matches!(self.dry_run, DryRun::RedirectText(_)) && self.binary == Some(true) {
            return Err(Error::invalid_config(
                "text redirect declared for a binary payload",
            ));
        }
        Ok(())
    }
}
