//! Bounded stream capture
//!
//! Uploads are never buffered whole. [`StreamCapture`] consumes the byte stream
//! slice by slice and keeps only what the checks need:
//!
//! - the first `prefix_capture` bytes (the header window is a view into this)
//! - the last `trailer_window` bytes
//! - a running SHA-256 digest and the byte count
//!
//! Reading stops as soon as the count passes `stop_after`, the ceiling for the
//! declared type; at that point the verdict is already known to be a size
//! rejection and the remainder of the stream is irrelevant.

use super::cancellation::ValidationContext;
use crate::config::LimitSettings;
use crate::error::ValidatorError;
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Incremental capture of an upload stream
#[derive(Debug)]
pub struct StreamCapture {
    chunk_size: usize,
    header_window: usize,
    trailer_window: usize,
    prefix_capture: usize,
    stop_after: u64,
    prefix: Vec<u8>,
    trailer: Vec<u8>,
    hasher: Sha256,
    total: u64,
    stopped_early: bool,
}

impl StreamCapture {
    /// Creates a capture that stops reading once more than `stop_after` bytes arrived
    #[must_use]
    pub fn new(limits: &LimitSettings, stop_after: u64) -> Self {
        Self {
            chunk_size: limits.chunk_size.max(1),
            header_window: limits.header_window,
            trailer_window: limits.trailer_window.max(1),
            prefix_capture: limits.prefix_capture,
            stop_after,
            prefix: Vec::new(),
            trailer: Vec::with_capacity(limits.trailer_window.saturating_mul(2)),
            hasher: Sha256::new(),
            total: 0,
            stopped_early: false,
        }
    }

    /// Feeds bytes into the capture
    ///
    /// Returns `false` once the capture has seen enough and the caller should
    /// stop reading.
    pub fn push(&mut self, data: &[u8]) -> bool {
        if self.stopped_early {
            return false;
        }
        for slice in data.chunks(self.chunk_size) {
            self.hasher.update(slice);
            self.capture_prefix(slice);
            self.capture_trailer(slice);
            self.total += slice.len() as u64;

            if self.total > self.stop_after {
                trace!(total = self.total, limit = self.stop_after, "Stopping read at size ceiling");
                self.stopped_early = true;
                return false;
            }
        }
        true
    }

    fn capture_prefix(&mut self, slice: &[u8]) {
        let room = self.prefix_capture.saturating_sub(self.prefix.len());
        let take = room.min(slice.len());
        if take == 0 {
            return;
        }
        let needed = self.prefix.len() + take;
        if needed > self.prefix.capacity() {
            let target = (self.prefix.capacity() * 2)
                .max(needed)
                .min(self.prefix_capture);
            self.prefix.reserve_exact(target - self.prefix.len());
        }
        self.prefix.extend_from_slice(&slice[..take]);
    }

    fn capture_trailer(&mut self, slice: &[u8]) {
        let window = self.trailer_window;
        if slice.len() >= window {
            self.trailer.clear();
            self.trailer.extend_from_slice(&slice[slice.len() - window..]);
            return;
        }
        self.trailer.extend_from_slice(slice);
        if self.trailer.len() > window * 2 {
            let excess = self.trailer.len() - window;
            self.trailer.drain(..excess);
        }
    }

    /// Bytes consumed so far
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Bytes currently held in memory
    #[must_use]
    pub fn retained(&self) -> usize {
        self.prefix.capacity() + self.trailer.capacity()
    }

    /// Consumes an async byte stream under the context's cancellation and deadline
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Cancelled`], [`ValidatorError::DeadlineExceeded`],
    /// or [`ValidatorError::Stream`] when the source fails.
    pub async fn ingest_stream<S, B, E>(
        &mut self,
        stream: S,
        ctx: &ValidationContext,
    ) -> Result<(), ValidatorError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        ctx.check()?;
        let mut stream = std::pin::pin!(stream);

        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(ValidatorError::Cancelled),
                () = ctx.deadline_elapsed() => return Err(ValidatorError::DeadlineExceeded),
                next = stream.next() => next,
            };

            match next {
                None => return Ok(()),
                Some(Err(e)) => return Err(ValidatorError::Stream(e.to_string())),
                Some(Ok(chunk)) => {
                    if !self.push(chunk.as_ref()) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Consumes an [`AsyncRead`] source under the context's cancellation and deadline
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Cancelled`], [`ValidatorError::DeadlineExceeded`],
    /// or [`ValidatorError::Io`] when the source fails.
    pub async fn ingest_reader<R>(
        &mut self,
        reader: R,
        ctx: &ValidationContext,
    ) -> Result<(), ValidatorError>
    where
        R: AsyncRead,
    {
        ctx.check()?;
        let mut reader = std::pin::pin!(reader);
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(ValidatorError::Cancelled),
                () = ctx.deadline_elapsed() => return Err(ValidatorError::DeadlineExceeded),
                read = reader.read(&mut buf) => read?,
            };

            if read == 0 || !self.push(&buf[..read]) {
                return Ok(());
            }
        }
    }

    /// Finalizes the capture
    #[must_use]
    pub fn finish(self) -> CapturedUpload {
        let sha256 = (!self.stopped_early).then(|| hex::encode(self.hasher.finalize()));
        let start = self.trailer.len().saturating_sub(self.trailer_window);
        let trailer = self.trailer[start..].to_vec();
        CapturedUpload {
            header_window: self.header_window,
            prefix: self.prefix,
            trailer,
            total: self.total,
            stopped_early: self.stopped_early,
            sha256,
        }
    }
}

/// What the checks get to see of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedUpload {
    header_window: usize,
    prefix: Vec<u8>,
    trailer: Vec<u8>,
    total: u64,
    stopped_early: bool,
    sha256: Option<String>,
}

impl CapturedUpload {
    /// Leading bytes used for signature matching
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.prefix[..self.prefix.len().min(self.header_window)]
    }

    /// Leading bytes used for body scans
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Trailing bytes of the stream
    #[must_use]
    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    /// Measured size; a lower bound when reading stopped early
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.total
    }

    /// Whether reading stopped at the size ceiling
    #[must_use]
    pub const fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    /// Whether the prefix covers less than the whole upload
    #[must_use]
    pub fn prefix_truncated(&self) -> bool {
        (self.prefix.len() as u64) < self.total
    }

    /// Hex SHA-256 of the whole upload, absent when reading stopped early
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }
}
