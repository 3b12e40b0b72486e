//! Line-oriented frame codec for host/plugin calls over stdio.
//!
//! Every call or reply travels as a single text line:
//! - A sentinel marking the line as protocol traffic
//! - The decimal correlation id
//! - The base64-encoded call name and payload, separated by `|`
//!
//! Lines without the sentinel are ordinary output of the child process and
//! are discarded, so a chatty plugin cannot corrupt the channel.

pub mod call;
pub mod codec;
pub mod error;
pub mod reader;
pub mod sink;
pub mod writer;

pub use call::{is_reply, is_reserved, origin_call, reply_name, LOG_CALL, REPLY_SUFFIX};
pub use codec::{
    decode_line, encode_call_name, encode_frame, encode_frame_with_name, Frame, FrameConfig,
    DEFAULT_MAX_LINE_LEN, DEFAULT_NAME_CACHE_CAPACITY, SENTINEL,
};
pub use error::{DecodeError, FrameError, Result};
pub use reader::FrameReader;
pub use sink::FrameSink;
pub use writer::FrameWriter;
