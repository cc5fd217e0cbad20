//! Output sinks.
//!
//! A sink is the final consumer of a finished payload. Whatever the
//! destination is (a file path, an open stream or socket, a closure, or
//! nothing at all) the session only ever sees one capability: deliver a
//! payload, then optionally close.

use crate::commit::Destination;
use crate::error::{Error, Result};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

type DeliverBytes<'a> = Box<dyn FnMut(&[u8]) -> io::Result<()> + 'a>;
type DeliverText<'a> = Box<dyn FnMut(&str) -> io::Result<()> + 'a>;
type CloseFn<'a> = Box<dyn FnMut(bool) -> io::Result<()> + 'a>;

/// The final consumer of a session's output.
pub enum Sink<'a> {
    /// Output is dropped.
    Discard,
    /// An already-open writable stream (file handle, socket, pipe, another
    /// session, ...).
    Stream(StreamSink<'a>),
    /// A closure receiving the finished payload.
    Callable(CallableSink<'a>),
    /// A filesystem location replaced through an atomic commit.
    Path(Destination),
}

impl<'a> Sink<'a> {
    /// A sink that drops everything.
    #[must_use]
    pub fn discard() -> Self {
        Self::Discard
    }

    /// Wraps an open stream whose payload kind is decided by the session.
    pub fn stream(writer: impl Write + 'a) -> Self {
        Self::Stream(StreamSink {
            writer: Some(Box::new(writer)),
            binary: None,
        })
    }

    /// Wraps an open stream that carries binary data, such as a socket.
    pub fn binary_stream(writer: impl Write + 'a) -> Self {
        Self::Stream(StreamSink {
            writer: Some(Box::new(writer)),
            binary: Some(true),
        })
    }

    /// Wraps a closure that receives the payload as bytes.
    pub fn callable<F>(deliver: F) -> Self
    where
        F: FnMut(&[u8]) -> io::Result<()> + 'a,
    {
        Self::Callable(CallableSink {
            deliver: Deliver::Bytes(Box::new(deliver)),
            close: None,
        })
    }

    /// Wraps a closure that receives the payload as text.
    pub fn text_callable<F>(deliver: F) -> Self
    where
        F: FnMut(&str) -> io::Result<()> + 'a,
    {
        Self::Callable(CallableSink {
            deliver: Deliver::Text(Box::new(deliver)),
            close: None,
        })
    }

    /// Wraps a byte closure together with a close hook.
    ///
    /// The hook receives the session's failure flag and runs once when the
    /// session closes its sink.
    pub fn callable_with_close<F, C>(deliver: F, close: C) -> Self
    where
        F: FnMut(&[u8]) -> io::Result<()> + 'a,
        C: FnMut(bool) -> io::Result<()> + 'a,
    {
        Self::Callable(CallableSink {
            deliver: Deliver::Bytes(Box::new(deliver)),
            close: Some(Box::new(close)),
        })
    }

    /// A file path, replaced atomically on commit.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(Destination::new(path))
    }

    /// Returns whether this sink dictates a binary or text payload.
    #[must_use]
    pub fn binary_hint(&self) -> Option<bool> {
        match self {
            Self::Discard | Self::Path(_) => None,
            Self::Stream(stream) => stream.binary,
            Self::Callable(callable) => Some(matches!(callable.deliver, Deliver::Bytes(_))),
        }
    }

    /// Returns true if the sink must receive valid UTF-8.
    #[must_use]
    pub fn wants_text(&self) -> bool {
        matches!(
            self,
            Self::Callable(CallableSink {
                deliver: Deliver::Text(_),
                ..
            })
        )
    }

    /// Hands a finished payload (or one chunk of it) to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] if the destination rejects the payload,
    /// or [`Error::Commit`] if a path destination cannot be replaced.
    pub fn deliver(&mut self, payload: &[u8]) -> Result<()> {
        match self {
            Self::Discard => Ok(()),
            Self::Stream(stream) => stream.deliver(payload).map_err(Error::delivery),
            Self::Callable(callable) => callable.deliver(payload).map_err(Error::delivery),
            Self::Path(dest) => dest.write_bytes(payload).map(|_| ()),
        }
    }

    /// Writes straight to the destination, bypassing staging.
    pub(crate) fn write_through(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Self::Discard => Ok(data.len()),
            Self::Stream(stream) => stream.writer()?.write(data),
            Self::Callable(callable) => {
                callable.deliver(data)?;
                Ok(data.len())
            }
            Self::Path(dest) => dest.write_through(data),
        }
    }

    /// Flushes a pass-through destination.
    pub(crate) fn flush_through(&mut self) -> io::Result<()> {
        match self {
            Self::Stream(stream) => stream.writer()?.flush(),
            Self::Path(dest) => dest.flush_through(),
            Self::Discard | Self::Callable(_) => Ok(()),
        }
    }

    /// Closes the sink. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] if flushing or the close hook fails.
    pub fn close(&mut self, failed: bool) -> Result<()> {
        match self {
            Self::Discard => Ok(()),
            Self::Stream(stream) => match stream.writer.take() {
                Some(mut writer) => writer.flush().map_err(Error::delivery),
                None => Ok(()),
            },
            Self::Callable(callable) => match callable.close.take() {
                Some(mut close) => close(failed).map_err(Error::delivery),
                None => Ok(()),
            },
            Self::Path(dest) => dest.close_through().map_err(Error::Io),
        }
    }
}

impl fmt::Debug for Sink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("Discard"),
            Self::Stream(stream) => f
                .debug_struct("Stream")
                .field("open", &stream.writer.is_some())
                .field("binary", &stream.binary)
                .finish(),
            Self::Callable(callable) => f
                .debug_struct("Callable")
                .field("text", &matches!(callable.deliver, Deliver::Text(_)))
                .field("close_hook", &callable.close.is_some())
                .finish(),
            Self::Path(dest) => f.debug_tuple("Path").field(&dest.path()).finish(),
        }
    }
}

/// An open stream sink.
pub struct StreamSink<'a> {
    writer: Option<Box<dyn Write + 'a>>,
    binary: Option<bool>,
}

impl<'a> StreamSink<'a> {
    fn writer(&mut self) -> io::Result<&mut (dyn Write + 'a)> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.as_mut()),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed")),
        }
    }

    fn deliver(&mut self, payload: &[u8]) -> io::Result<()> {
        let writer = self.writer()?;
        writer.write_all(payload)?;
        writer.flush()
    }
}

enum Deliver<'a> {
    Bytes(DeliverBytes<'a>),
    Text(DeliverText<'a>),
}

/// A closure sink.
pub struct CallableSink<'a> {
    deliver: Deliver<'a>,
    close: Option<CloseFn<'a>>,
}

impl CallableSink<'_> {
    fn deliver(&mut self, payload: &[u8]) -> io::Result<()> {
        match &mut self.deliver {
            Deliver::Bytes(f) => f(payload),
            Deliver::Text(f) => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                f(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_receives_payload() {
        let mut out = Vec::new();
        {
            let mut sink = Sink::stream(&mut out);
            sink.deliver(b"one").unwrap();
            sink.deliver(b"two").unwrap();
        }
        assert_eq!(out, b"onetwo");
    }

    #[test]
    fn closed_stream_rejects_delivery() {
        let mut out = Vec::new();
        let mut sink = Sink::stream(&mut out);
        sink.close(false).unwrap();
        assert!(matches!(sink.deliver(b"late"), Err(Error::Delivery { .. })));
    }

    #[test]
    fn callable_errors_are_delivery_errors() {
        let mut sink = Sink::callable(|_| Err(io::Error::new(io::ErrorKind::Other, "rejected")));
        assert!(matches!(sink.deliver(b"x"), Err(Error::Delivery { .. })));
    }

    #[test]
    fn text_callable_rejects_invalid_utf8() {
        let mut seen = String::new();
        {
            let mut sink = Sink::text_callable(|s| {
                seen.push_str(s);
                Ok(())
            });
            sink.deliver("héllo".as_bytes()).unwrap();
            assert!(sink.deliver(b"\xff").is_err());
        }
        assert_eq!(seen, "héllo");
    }

    #[test]
    fn close_hook_runs_once() {
        let mut calls = Vec::new();
        {
            let mut sink = Sink::callable_with_close(
                |_| Ok(()),
                |failed| {
                    calls.push(failed);
                    Ok(())
                },
            );
            sink.close(true).unwrap();
            sink.close(false).unwrap();
        }
        assert_eq!(calls, vec![true]);
    }

    #[test]
    fn binary_hints() {
        let mut buf = Vec::new();
        assert_eq!(Sink::discard().binary_hint(), None);
        assert_eq!(Sink::stream(&mut buf).binary_hint(), None);
        assert_eq!(Sink::binary_stream(io::sink()).binary_hint(), Some(true));
        assert_eq!(Sink::callable(|_| Ok(())).binary_hint(), Some(true));
        assert_eq!(Sink::text_callable(|_| Ok(())).binary_hint(), Some(false));
        assert!(Sink::text_callable(|_| Ok(())).wants_text());
        assert!(!Sink::callable(|_| Ok(())).wants_text());
    }

    #[test]
    fn discard_accepts_everything() {
        let mut sink = Sink::discard();
        assert!(sink.deliver(b"anything").is_ok());
        assert_eq!(sink.write_through(b"abc").unwrap(), 3);
        assert!(sink.close(false).is_ok());
    }
}
