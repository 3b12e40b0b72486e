use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_line, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads frames from any `Read` stream.
///
/// Lines that arrive split across reads are reassembled internally. Lines
/// that are not protocol traffic are discarded.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    /// Bytes of `buf` already known to contain no newline.
    scanned: usize,
    /// Dropping the remainder of an overlong line.
    discarding: bool,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanned: 0,
            discarding: false,
            config,
        }
    }

    /// Read the next frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.next_buffered_frame() {
                return Ok(frame);
            }

            if self.buf.len() > self.config.max_line_len {
                warn!(
                    buffered = self.buf.len(),
                    max = self.config.max_line_len,
                    "discarding overlong line"
                );
                self.buf.clear();
                self.scanned = 0;
                self.discarding = true;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return self.finish();
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Decode complete lines already in the buffer until one is a frame.
    fn next_buffered_frame(&mut self) -> Option<Frame> {
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = self.buf.split_to(end + 1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let Some(frame) = decode_line(&line[..end]) {
                return Some(frame);
            }
        }
        self.scanned = self.buf.len();
        None
    }

    /// Handle EOF: a final unterminated line may still hold a frame.
    fn finish(&mut self) -> Result<Frame> {
        let tail = self.buf.split();
        self.scanned = 0;
        if !self.discarding {
            if let Some(frame) = decode_line(&tail) {
                return Ok(frame);
            }
        }
        self.discarding = false;
        Err(FrameError::ConnectionClosed)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
