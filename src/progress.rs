//! Progress observation for byte transfers
//!
//! `ProgressReader` mirrors every read into a caller-supplied sink without
//! altering the bytes delivered downstream. The sink is a capability: a
//! terminal meter, a counter, or nothing at all.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};

/// Capability the pipeline reports read progress into.
pub trait ProgressSink: Send + Sync {
    /// Record that `delta` more bytes were read.
    fn record(&self, delta: u64);
}

/// Sink that discards progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn record(&self, _delta: u64) {}
}

/// Sink that accumulates a running total.
#[derive(Default)]
pub struct CountingSink {
    total: AtomicU64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ProgressSink for CountingSink {
    fn record(&self, delta: u64) {
        self.total.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Read adapter that reports each read's byte count to a sink.
///
/// Transparent passthrough: bytes, EOF, and errors from the underlying
/// source are returned unchanged, with no buffering and no failure modes of
/// its own.
pub struct ProgressReader<'a, R> {
    inner: R,
    sink: &'a dyn ProgressSink,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub fn new(inner: R, sink: &'a dyn ProgressSink) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sink.record(n as u64);
        }
        Ok(n)
    }
}
