//! Protocol module - wire format, framing, messages and the message codec.
//!
//! This module implements the binary protocol:
//! - 16-byte header encoding/decoding and validation
//! - Frame buffer for accumulating partial reads
//! - Logical request/response/heartbeat messages
//! - Message codec delegating bodies to pluggable serializers and compressors

mod codec;
mod frame;
mod frame_buffer;
mod message;
mod wire_format;

pub use codec::{MessageCodec, MessageDecoder};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use message::{MessageBody, ResponseCode, RpcMessage, RpcRequest, RpcResponse};
pub use wire_format::{
    Header, MessageType, DEFAULT_MAX_FRAME_LENGTH, HEADER_SIZE, LENGTH_FIELD_OFFSET, MAGIC_NUMBER,
    PING, PONG, VERSION,
};
