//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌──────────┬─────────┬─────────────┬──────────┬───────┬──────────┬──────────┐
//! │ Magic    │ Version │ Full length │ Msg type │ Codec │ Compress │ Req ID   │
//! │ 4 bytes  │ 1 byte  │ 4 bytes     │ 1 byte   │ 1 byte│ 1 byte   │ 4 bytes  │
//! │          │         │ uint32 BE   │          │       │          │ uint32 BE│
//! └──────────┴─────────┴─────────────┴──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! `full_length` covers header and body. All multi-byte integers are Big Endian.

use crate::error::{RpcError, Result};

/// Protocol identifier carried in the first four bytes of every frame.
pub const MAGIC_NUMBER: [u8; 4] = *b"qrpc";

/// Protocol version.
pub const VERSION: u8 = 1;

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Offset of the `full_length` field inside the header.
pub const LENGTH_FIELD_OFFSET: usize = 5;

/// Default maximum frame length, header included (8 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 8 * 1024 * 1024;

/// Sentinel payload of a heartbeat request.
pub const PING: &str = "ping";

/// Sentinel payload of a heartbeat response.
pub const PONG: &str = "pong";

/// Kind of message carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// A call from client to server.
    Request = 1,
    /// The result of a call.
    Response = 2,
    /// Liveness check sent on write-idle.
    HeartbeatRequest = 3,
    /// Answer to a liveness check.
    HeartbeatResponse = 4,
}

impl MessageType {
    /// Wire value of this message type.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this kind carries no body.
    #[inline]
    pub fn is_heartbeat(self) -> bool {
        matches!(
            self,
            MessageType::HeartbeatRequest | MessageType::HeartbeatResponse
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::HeartbeatRequest),
            4 => Ok(MessageType::HeartbeatResponse),
            other => Err(RpcError::Protocol(format!(
                "Unknown message type: {}",
                other
            ))),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol identifier.
    pub magic: [u8; 4],
    /// Protocol version.
    pub version: u8,
    /// Total bytes of header + body.
    pub full_length: u32,
    /// Raw message type byte (see [`MessageType`]).
    pub message_type: u8,
    /// Body serialization codec id.
    pub codec: u8,
    /// Body compression codec id.
    pub compress: u8,
    /// Correlation id.
    pub request_id: u32,
}

impl Header {
    /// Create a header for the current protocol version.
    pub fn new(
        message_type: MessageType,
        codec: u8,
        compress: u8,
        request_id: u32,
        body_length: u32,
    ) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: VERSION,
            full_length: HEADER_SIZE as u32 + body_length,
            message_type: message_type.as_u8(),
            codec,
            compress,
            request_id,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use rpcwire::protocol::{Header, MessageType, HEADER_SIZE};
    ///
    /// let header = Header::new(MessageType::Request, 1, 0, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..4], b"qrpc");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.version;
        buf[5..9].copy_from_slice(&self.full_length.to_be_bytes());
        buf[9] = self.message_type;
        buf[10] = self.codec;
        buf[11] = self.compress;
        buf[12..16].copy_from_slice(&self.request_id.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. No field is validated here,
    /// see [`Header::validate`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            version: buf[4],
            full_length: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
            message_type: buf[9],
            codec: buf[10],
            compress: buf[11],
            request_id: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks, in wire order:
    /// - Magic number matches
    /// - Version matches
    /// - Full length covers at least the header and does not exceed max
    /// - Message type is known
    pub fn validate(&self, max_frame_length: u32) -> Result<MessageType> {
        if self.magic != MAGIC_NUMBER {
            return Err(RpcError::Protocol(format!(
                "Unknown magic code: {:?}",
                self.magic
            )));
        }

        if self.version != VERSION {
            return Err(RpcError::Protocol(format!(
                "Version {} isn't compatible, expected {}",
                self.version, VERSION
            )));
        }

        if (self.full_length as usize) < HEADER_SIZE {
            return Err(RpcError::Protocol(format!(
                "Full length {} is shorter than the {}-byte header",
                self.full_length, HEADER_SIZE
            )));
        }

        if self.full_length > max_frame_length {
            return Err(RpcError::Protocol(format!(
                "Frame length {} exceeds maximum {}",
                self.full_length, max_frame_length
            )));
        }

        MessageType::try_from(self.message_type)
    }

    /// Body length implied by `full_length`.
    #[inline]
    pub fn body_length(&self) -> u32 {
        self.full_length.saturating_sub(HEADER_SIZE as u32)
    }

    /// Check if this header announces a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == MessageType::HeartbeatRequest.as_u8()
            || self.message_type == MessageType::HeartbeatResponse.as_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(MessageType::Response, 2, 1, 42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_byte_layout() {
        let header = Header::new(MessageType::Request, 0x0A, 0x0B, 0x04050607, 0x0100);
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], b"qrpc");
        assert_eq!(bytes[4], VERSION);

        // Full length: 16 + 0x0100 = 0x0110 in BE
        assert_eq!(&bytes[5..9], &[0x00, 0x00, 0x01, 0x10]);

        assert_eq!(bytes[9], 1);
        assert_eq!(bytes[10], 0x0A);
        assert_eq!(bytes[11], 0x0B);
        assert_eq!(&bytes[12..16], &[0x04, 0x05, 0x06, 0x07]);
    }

    #[test]
    fn test_header_size_is_exactly_16() {
        assert_eq!(HEADER_SIZE, 16);
        let header = Header::new(MessageType::HeartbeatRequest, 1, 0, 0, 0);
        assert_eq!(header.encode().len(), 16);
        assert_eq!(header.full_length, 16);
        assert_eq!(header.body_length(), 0);
    }

    #[test]
    fn test_length_field_offset_matches_layout() {
        let header = Header::new(MessageType::Request, 1, 0, 1, 7);
        let bytes = header.encode();
        let field = &bytes[LENGTH_FIELD_OFFSET..LENGTH_FIELD_OFFSET + 4];
        assert_eq!(u32::from_be_bytes(field.try_into().unwrap()), 23);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 15];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_accepts_all_known_types() {
        for (raw, kind) in [
            (1u8, MessageType::Request),
            (2, MessageType::Response),
            (3, MessageType::HeartbeatRequest),
            (4, MessageType::HeartbeatResponse),
        ] {
            let header = Header::new(kind, 1, 0, 9, 0);
            assert_eq!(header.message_type, raw);
            assert_eq!(header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap(), kind);
        }
    }

    #[test]
    fn test_validate_bad_magic() {
        let mut header = Header::new(MessageType::Request, 1, 0, 1, 0);
        header.magic = *b"nope";
        let err = header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_validate_bad_version() {
        let mut header = Header::new(MessageType::Request, 1, 0, 1, 0);
        header.version = VERSION + 1;
        let err = header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(err.to_string().contains("isn't compatible"));
    }

    #[test]
    fn test_validate_unknown_message_type() {
        let mut header = Header::new(MessageType::Request, 1, 0, 1, 0);
        header.message_type = 9;
        let err = header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(err.to_string().contains("Unknown message type"));
    }

    #[test]
    fn test_validate_frame_too_large() {
        let header = Header::new(MessageType::Request, 1, 0, 1, 1_000);
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_length_shorter_than_header() {
        let mut header = Header::new(MessageType::Request, 1, 0, 1, 0);
        header.full_length = 3;
        let err = header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(err.to_string().contains("shorter than"));
    }

    #[test]
    fn test_heartbeat_accessors() {
        assert!(MessageType::HeartbeatRequest.is_heartbeat());
        assert!(MessageType::HeartbeatResponse.is_heartbeat());
        assert!(!MessageType::Request.is_heartbeat());
        assert!(Header::new(MessageType::HeartbeatResponse, 1, 0, 0, 0).is_heartbeat());
        assert!(!Header::new(MessageType::Response, 1, 0, 0, 0).is_heartbeat());
    }
}
