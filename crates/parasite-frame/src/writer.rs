use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;

use bytes::BytesMut;
use lru::LruCache;

use crate::codec::{encode_call_name, encode_frame_with_name, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Encoded call names are memoised in a bounded LRU cache, since the same
/// few names are sent over and over.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    names: LruCache<String, String>,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        let capacity = NonZeroUsize::new(config.name_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            names: LruCache::new(capacity),
            config,
        }
    }

    /// Encode and send one frame (blocking), then flush.
    pub fn send(&mut self, id: u64, call: &str, payload: &[u8]) -> Result<()> {
        let encoded_call = self.encoded_name(call);

        self.buf.clear();
        encode_frame_with_name(id, &encoded_call, payload, &mut self.buf);

        // Framing newlines are not part of the line.
        let line_len = self.buf.len().saturating_sub(2);
        if line_len > self.config.max_line_len {
            return Err(FrameError::LineTooLong {
                size: line_len,
                max: self.config.max_line_len,
            });
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(FrameError::ConnectionClosed)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(FrameError::ConnectionClosed)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn encoded_name(&mut self, call: &str) -> String {
        if let Some(encoded) = self.names.get(call) {
            return encoded.clone();
        }
        let encoded = encode_call_name(call);
        self.names.put(call.to_owned(), encoded.clone());
        encoded
    }

    /// Number of call names currently memoised.
    pub fn cached_names(&self) -> usize {
        self.names.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(1, "echo", b"hello").unwrap();

        let mut reader = FrameReader::new(Cursor::new(written(writer)));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.id(), 1);
        assert_eq!(frame.call(), "echo");
        assert_eq!(frame.payload().as_ref(), b"hello");
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(1, "one", b"1").unwrap();
        writer.send(2, "two", b"2").unwrap();

        let mut reader = FrameReader::new(Cursor::new(written(writer)));
        assert_eq!(reader.read_frame().unwrap().call(), "one");
        assert_eq!(reader.read_frame().unwrap().call(), "two");
    }

    #[test]
    fn name_cache_is_bounded() {
        let cfg = FrameConfig {
            name_cache_capacity: 2,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        for name in ["a", "b", "c", "a", "d", "e"] {
            writer.send(0, name, b"").unwrap();
        }
        assert_eq!(writer.cached_names(), 2);

        let mut reader = FrameReader::new(Cursor::new(written(writer)));
        let names: Vec<String> = (0..6)
            .map(|_| reader.read_frame().unwrap().call().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c", "a", "d", "e"]);
    }

    #[test]
    fn zero_capacity_cache_falls_back_to_one() {
        let cfg = FrameConfig {
            name_cache_capacity: 0,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.send(0, "x", b"").unwrap();
        assert_eq!(writer.cached_names(), 1);
    }

    #[test]
    fn line_too_long_rejected() {
        let cfg = FrameConfig {
            max_line_len: 32,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(1, "call", &[0u8; 64]).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { max: 32, .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(1, "x", b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(5, "retry", b"retry").unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(1, "x", b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_maps_to_connection_closed() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(right);
        let mut writer = FrameWriter::new(left);

        let err = writer.send(1, "x", b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        assert_eq!(
            writer.config().name_cache_capacity,
            crate::DEFAULT_NAME_CACHE_CAPACITY
        );
        let _inner = writer.into_inner();
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
