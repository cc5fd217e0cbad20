//! Recording sinks.
//!
//! A [`Recorder`] hands out sinks and writers that capture everything
//! delivered to them, so a test can compare it with what was written.

use parking_lot::Mutex;
use safewrite_core::Sink;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    chunks: Vec<Vec<u8>>,
    closes: Vec<bool>,
    flushes: usize,
}

/// Shared record of deliveries, cloneable across sinks and assertions.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A byte callable sink that records each delivery.
    pub fn sink(&self) -> Sink<'static> {
        let inner = Arc::clone(&self.inner);
        Sink::callable(move |chunk| {
            inner.lock().chunks.push(chunk.to_vec());
            Ok(())
        })
    }

    /// A text callable sink that records each delivery.
    pub fn text_sink(&self) -> Sink<'static> {
        let inner = Arc::clone(&self.inner);
        Sink::text_callable(move |text| {
            inner.lock().chunks.push(text.as_bytes().to_vec());
            Ok(())
        })
    }

    /// A byte callable sink that also records close calls.
    pub fn closing_sink(&self) -> Sink<'static> {
        let deliver = Arc::clone(&self.inner);
        let close = Arc::clone(&self.inner);
        Sink::callable_with_close(
            move |chunk| {
                deliver.lock().chunks.push(chunk.to_vec());
                Ok(())
            },
            move |failed| {
                close.lock().closes.push(failed);
                Ok(())
            },
        )
    }

    /// A writer usable as a stream sink.
    pub fn writer(&self) -> RecordingWriter {
        RecordingWriter {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns every delivery, in order.
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.inner.lock().chunks.clone()
    }

    /// Returns all delivered bytes concatenated.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().chunks.concat()
    }

    /// Returns the failure flag passed to each close call.
    pub fn closes(&self) -> Vec<bool> {
        self.inner.lock().closes.clone()
    }

    /// Returns the number of flushes seen by writers.
    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }

    /// Returns true if nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }
}

/// A `Write` handle feeding a [`Recorder`].
pub struct RecordingWriter {
    inner: Arc<Mutex<Recorded>>,
}

impl Write for RecordingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().chunks.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_records_deliveries() {
        let recorder = Recorder::new();
        let mut sink = recorder.sink();
        sink.deliver(b"ab").unwrap();
        sink.deliver(b"c").unwrap();

        assert_eq!(recorder.chunks(), vec![b"ab".to_vec(), b"c".to_vec()]);
        assert_eq!(recorder.contents(), b"abc");
    }

    #[test]
    fn test_closing_sink_records_flag() {
        let recorder = Recorder::new();
        let mut sink = recorder.closing_sink();
        sink.close(true).unwrap();
        assert_eq!(recorder.closes(), vec![true]);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_writer_counts_flushes() {
        let recorder = Recorder::new();
        let mut writer = recorder.writer();
        writer.write_all(b"xy").unwrap();
        writer.flush().unwrap();
        assert_eq!(recorder.contents(), b"xy");
        assert_eq!(recorder.flushes(), 1);
    }
}
