//! Frame struct with typed accessors.
//!
//! Represents one length-delimited protocol frame: a validated header and
//! its still-encoded body. Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{Frame, Header, MessageType};
//! use bytes::Bytes;
//!
//! let header = Header::new(MessageType::Response, 1, 0, 42, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.request_id(), 42);
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, MessageType, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes, still serialized and compressed.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Get the message type, if it is a known one.
    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.header.message_type).ok()
    }

    /// Check if this is a heartbeat frame.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.header.is_heartbeat()
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header's `full_length` is recomputed from the body so callers can
/// never emit a frame whose length field disagrees with its contents.
///
/// # Example
///
/// ```
/// use rpcwire::protocol::{build_frame, Header, MessageType, HEADER_SIZE};
///
/// let header = Header::new(MessageType::Request, 1, 0, 42, 0);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut header = *header;
    header.full_length = (HEADER_SIZE + body.len()) as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}
