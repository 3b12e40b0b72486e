use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::call::is_reply;
use crate::error::DecodeError;

/// Marks a line as protocol traffic.
pub const SENTINEL: &str = "__parasite_frame__";

/// Separates the id, call name and payload fields.
pub const FIELD_SEPARATOR: u8 = b'|';

/// Default maximum encoded line length: 16 MiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Default number of encoded call names a writer remembers.
pub const DEFAULT_NAME_CACHE_CAPACITY: usize = 64;

/// One decoded call or reply.
///
/// Frames are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: u64,
    call: String,
    payload: Bytes,
    transport_error: Option<DecodeError>,
}

impl Frame {
    /// Create a well-formed frame.
    pub fn new(id: u64, call: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            call: call.into(),
            payload: payload.into(),
            transport_error: None,
        }
    }

    /// Create a frame whose fields could only be partially decoded.
    pub fn malformed(
        id: u64,
        call: impl Into<String>,
        payload: impl Into<Bytes>,
        error: DecodeError,
    ) -> Self {
        Self {
            id,
            call: call.into(),
            payload: payload.into(),
            transport_error: Some(error),
        }
    }

    /// Correlation id linking a call to its reply.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Call name, including the reply marker for replies.
    pub fn call(&self) -> &str {
        &self.call
    }

    /// Payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Set when the codec failed to decode one of the frame fields.
    pub fn transport_error(&self) -> Option<&DecodeError> {
        self.transport_error.as_ref()
    }

    /// Returns true if this frame answers an earlier call.
    pub fn is_reply(&self) -> bool {
        is_reply(&self.call)
    }

    /// Split the frame into its payload and decode error.
    pub fn into_parts(self) -> (Bytes, Option<DecodeError>) {
        (self.payload, self.transport_error)
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum encoded line length in bytes. Default: 16 MiB.
    pub max_line_len: usize,
    /// Encoded call names kept per writer. Default: 64.
    pub name_cache_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            name_cache_capacity: DEFAULT_NAME_CACHE_CAPACITY,
        }
    }
}

/// Encode a call name into its wire form.
pub fn encode_call_name(call: &str) -> String {
    STANDARD.encode(call)
}

/// Encode a frame into the wire format.
///
/// Wire format (one line):
/// ```text
/// \n__parasite_frame__<id>|<base64 call>|<base64 payload>\n
/// ```
/// The leading newline terminates any partial line the child printed
/// before, so the sentinel always starts a fresh line.
pub fn encode_frame(id: u64, call: &str, payload: &[u8], dst: &mut BytesMut) {
    encode_frame_with_name(id, &encode_call_name(call), payload, dst);
}

/// Encode a frame whose call name is already in wire form.
pub fn encode_frame_with_name(id: u64, encoded_call: &str, payload: &[u8], dst: &mut BytesMut) {
    let encoded_payload = STANDARD.encode(payload);
    let id = id.to_string();

    dst.reserve(SENTINEL.len() + id.len() + encoded_call.len() + encoded_payload.len() + 4);
    dst.put_u8(b'\n');
    dst.put_slice(SENTINEL.as_bytes());
    dst.put_slice(id.as_bytes());
    dst.put_u8(FIELD_SEPARATOR);
    dst.put_slice(encoded_call.as_bytes());
    dst.put_u8(FIELD_SEPARATOR);
    dst.put_slice(encoded_payload.as_bytes());
    dst.put_u8(b'\n');
}

/// Decode one line (without its trailing newline).
///
/// Returns `None` for lines that are not protocol traffic, including sentinel
/// lines that do not split into exactly three fields. A recognised frame
/// whose fields fail to decode comes back with its transport error set.
pub fn decode_line(line: &[u8]) -> Option<Frame> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let rest = line.strip_prefix(SENTINEL.as_bytes())?;

    let fields: Vec<&[u8]> = rest.split(|b| *b == FIELD_SEPARATOR).collect();
    let [id, call, payload] = fields.as_slice() else {
        trace!(fields = fields.len(), "skipping frame line with wrong field count");
        return None;
    };

    let Some(id) = std::str::from_utf8(id)
        .ok()
        .and_then(|id| id.parse::<u64>().ok())
    else {
        let raw = String::from_utf8_lossy(id).into_owned();
        return Some(Frame::malformed(
            0,
            String::new(),
            Bytes::new(),
            DecodeError::InvalidId(raw),
        ));
    };

    let call = match STANDARD
        .decode(call)
        .map_err(|err| err.to_string())
        .and_then(|raw| String::from_utf8(raw).map_err(|err| err.to_string()))
    {
        Ok(call) => call,
        Err(err) => {
            return Some(Frame::malformed(
                id,
                String::new(),
                Bytes::new(),
                DecodeError::InvalidCallName(err),
            ))
        }
    };

    match STANDARD.decode(payload) {
        Ok(payload) => Some(Frame::new(id, call, payload)),
        Err(err) => Some(Frame::malformed(
            id,
            call,
            Bytes::new(),
            DecodeError::InvalidPayload(err.to_string()),
        )),
    }
}
