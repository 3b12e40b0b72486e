use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::writer::FrameWriter;

/// A frame writer shared between threads.
///
/// Each [`send`](Self::send) holds the lock for the whole frame, so frames
/// written concurrently by callers, reply writers and the log layer never
/// interleave on the stream.
pub struct FrameSink<W> {
    inner: Arc<Mutex<FrameWriter<W>>>,
}

impl<W: Write> FrameSink<W> {
    /// Wrap a stream with default configuration.
    pub fn new(inner: W) -> Self {
        Self::from_writer(FrameWriter::new(inner))
    }

    /// Wrap a stream with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self::from_writer(FrameWriter::with_config(inner, config))
    }

    /// Share an existing frame writer.
    pub fn from_writer(writer: FrameWriter<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one frame under the sink lock.
    pub fn send(&self, id: u64, call: &str, payload: &[u8]) -> Result<()> {
        let mut writer = self.inner.lock().map_err(|_| FrameError::Poisoned)?;
        writer.send(id, call, payload)
    }
}

impl<W> Clone for FrameSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> std::fmt::Debug for FrameSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink").finish_non_exhaustive()
    }
}
