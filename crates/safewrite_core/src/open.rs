//! Convenience entry points.
//!
//! These are thin wrappers that build a [`Session`] from the common
//! combinations of sink and configuration.

use crate::config::Config;
use crate::error::{Error, Result, ScopeError};
use crate::session::Session;
use crate::sink::Sink;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;

/// Opens a transactional session on a file.
///
/// `mode` is a file mode string such as `"w"`, `"ab"` or `"r+"`.
///
/// # Errors
///
/// Returns [`Error::InvalidMode`] for an invalid or read-only mode, and any
/// error [`Session::new`] can return.
///
/// # Example
///
/// ```rust,no_run
/// use std::io::Write;
///
/// let mut session = safewrite_core::open("settings.toml", "w")?;
/// writeln!(session, "debug = true")?;
/// session.commit()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open(path: impl Into<PathBuf>, mode: &str) -> Result<Session<'static>> {
    Config::new().parse_mode(mode)?.open(path)
}

/// Wraps an open stream in a session. The stream is left open afterwards.
///
/// # Errors
///
/// See [`Session::new`].
pub fn writer<'a>(stream: impl Write + 'a) -> Result<Session<'a>> {
    Config::new().writer(Sink::stream(stream))
}

/// Wraps an open stream in a session that closes it on finish.
///
/// # Errors
///
/// See [`Session::new`].
pub fn closer<'a>(stream: impl Write + 'a) -> Result<Session<'a>> {
    Config::new().close_on_exit(true).writer(Sink::stream(stream))
}

/// Runs `f` with a [`Printer`] writing transactionally to `path`.
///
/// # Errors
///
/// [`ScopeError::Finish`] if the mode is invalid or binary, or if
/// committing fails; [`ScopeError::Caller`] if `f` fails.
///
/// # Example
///
/// ```rust,no_run
/// use safewrite_core::printer;
///
/// printer("report.txt", "w", |p| {
///     p.println("header")?;
///     for n in 1..=3 {
///         p.println(n)?;
///     }
///     Ok::<_, std::io::Error>(())
/// })?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn printer<T, E, F>(
    path: impl Into<PathBuf>,
    mode: &str,
    f: F,
) -> std::result::Result<T, ScopeError<E>>
where
    F: FnOnce(&mut Printer<'_, 'static>) -> std::result::Result<T, E>,
{
    let session = open_printer(path.into(), mode).map_err(ScopeError::Finish)?;
    session.run(|session| f(&mut Printer { session }))
}

fn open_printer(path: PathBuf, mode: &str) -> Result<Session<'static>> {
    let config = Config::new().parse_mode(mode)?;
    if config.mode.binary {
        return Err(Error::invalid_mode(mode, "printing requires a text mode"));
    }
    config.open(path)
}

/// Line-oriented text output on top of a session.
#[derive(Debug)]
pub struct Printer<'s, 'a> {
    session: &'s mut Session<'a>,
}

impl<'a> Printer<'_, 'a> {
    /// Writes the `Display` form of `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if staging the text fails.
    pub fn print(&mut self, value: impl Display) -> io::Result<()> {
        write!(self.session, "{value}")
    }

    /// Writes the `Display` form of `value` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if staging the text fails.
    pub fn println(&mut self, value: impl Display) -> io::Result<()> {
        writeln!(self.session, "{value}")
    }

    /// Returns the underlying session.
    pub fn session(&mut self) -> &mut Session<'a> {
        self.session
    }
}

impl Config {
    /// Opens a session on a file with this configuration.
    ///
    /// # Errors
    ///
    /// See [`Session::new`].
    pub fn open(self, path: impl Into<PathBuf>) -> Result<Session<'static>> {
        Session::new(Sink::path(path), self)
    }

    /// Opens a session on any sink with this configuration.
    ///
    /// # Errors
    ///
    /// See [`Session::new`].
    pub fn writer<'a>(self, sink: Sink<'a>) -> Result<Session<'a>> {
        Session::new(sink, self)
    }

    /// Opens a session on `sink`, runs `f` against it and finishes it.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Finish`] if the session cannot be opened or committed,
    /// [`ScopeError::Caller`] if `f` fails.
    pub fn run<'a, T, E, F>(self, sink: Sink<'a>, f: F) -> std::result::Result<T, ScopeError<E>>
    where
        F: FnOnce(&mut Session<'a>) -> std::result::Result<T, E>,
    {
        Session::new(sink, self)
            .map_err(ScopeError::Finish)?
            .run(f)
    }
}
