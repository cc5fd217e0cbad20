//! Writers that fail on demand.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Failure switches shared between a [`FailingWriter`] and the test.
#[derive(Debug)]
pub struct FailureControl {
    fail_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    failed: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl FailureControl {
    /// Makes writes fail once the given number of bytes has been accepted.
    pub fn fail_after(&self, bytes: usize) {
        self.fail_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether flush should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Resets the failure state.
    pub fn reset(&self) {
        self.fail_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
        self.failed.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
    }

    /// Returns whether a simulated failure has occurred.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of bytes accepted so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

impl Default for FailureControl {
    fn default() -> Self {
        Self {
            fail_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        }
    }
}

/// A writer wrapper that can simulate a full disk or a dropped connection.
pub struct FailingWriter<W> {
    inner: W,
    control: Arc<FailureControl>,
}

impl<W: Write> FailingWriter<W> {
    /// Wraps `inner`; it behaves normally until told otherwise.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            control: Arc::new(FailureControl::default()),
        }
    }

    /// Returns the shared failure switches.
    pub fn control(&self) -> Arc<FailureControl> {
        Arc::clone(&self.control)
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for FailingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let current = self.control.bytes_written.load(Ordering::SeqCst);
        let threshold = self.control.fail_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            self.control.failed.store(true, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "simulated failure during write",
            ));
        }

        // Accept only up to the threshold, like a disk that fills mid-write
        let accepted = buf.len().min(threshold - current);
        let n = self.inner.write(&buf[..accepted])?;
        self.control.bytes_written.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            self.control.failed.store(true, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "simulated failure during flush",
            ));
        }
        self.inner.flush()
    }
}
