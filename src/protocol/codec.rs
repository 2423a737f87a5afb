//! Message codec: logical messages to frames and back.
//!
//! Encoding serializes the body first into a scratch buffer, then writes
//! header and body into the final buffer in one pass, so `full_length` is
//! always known before the header is written.
//!
//! Decoding is a pure function of the byte stream: [`MessageDecoder`]
//! buffers partial frames and yields messages only once they are complete.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::Frame;
use super::frame_buffer::FrameBuffer;
use super::message::{MessageBody, RpcMessage};
use super::wire_format::{Header, MessageType, DEFAULT_MAX_FRAME_LENGTH, HEADER_SIZE};
use crate::codec::CodecRegistry;
use crate::error::{Result, RpcError};

/// Encoder/decoder for [`RpcMessage`], backed by a [`CodecRegistry`].
#[derive(Debug, Clone)]
pub struct MessageCodec {
    registry: Arc<CodecRegistry>,
    max_frame_length: u32,
}

impl MessageCodec {
    /// Create a codec with the default max frame length.
    pub fn new(registry: Arc<CodecRegistry>) -> Self {
        Self {
            registry,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Set the max frame length (header included).
    pub fn with_max_frame_length(mut self, max_frame_length: u32) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Max frame length this codec accepts and produces.
    #[inline]
    pub fn max_frame_length(&self) -> u32 {
        self.max_frame_length
    }

    /// Codec registry backing this codec.
    #[inline]
    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    /// Encode a message into one contiguous frame.
    ///
    /// Heartbeats and [`MessageBody::Empty`] bodies are written without a
    /// body and without touching the codecs.
    ///
    /// # Errors
    ///
    /// Fails if the body does not match the message type, a codec id is
    /// unknown, the serializer or compressor fails, or the frame would
    /// exceed the max frame length. None of these affect the connection.
    pub fn encode(&self, message: &RpcMessage) -> Result<Bytes> {
        let body = self.encode_body(message)?;

        let full_length = HEADER_SIZE + body.len();
        if full_length > self.max_frame_length as usize {
            return Err(RpcError::Serialization(format!(
                "Encoded frame of {} bytes exceeds maximum {}",
                full_length, self.max_frame_length
            )));
        }

        let header = Header::new(
            message.message_type,
            message.codec,
            message.compress,
            message.request_id,
            body.len() as u32,
        );

        let mut buf = BytesMut::with_capacity(full_length);
        buf.put_slice(&header.encode());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    fn encode_body(&self, message: &RpcMessage) -> Result<Vec<u8>> {
        match (message.message_type, &message.body) {
            (MessageType::HeartbeatRequest, MessageBody::Ping)
            | (MessageType::HeartbeatResponse, MessageBody::Pong)
            | (MessageType::Request, MessageBody::Empty)
            | (MessageType::Response, MessageBody::Empty) => Ok(Vec::new()),
            (MessageType::Request, MessageBody::Request(_))
            | (MessageType::Response, MessageBody::Response(_)) => {
                let serializer = self.registry.serializer(message.codec)?;
                let compressor = self.registry.compressor(message.compress)?;
                let raw = serializer.serialize(&message.body)?;
                compressor.compress(&raw)
            }
            (kind, body) => Err(RpcError::Serialization(format!(
                "{:?} message cannot carry body {:?}",
                kind, body
            ))),
        }
    }

    /// Decode one complete frame.
    ///
    /// Every failure here is a protocol error: once a body cannot be read the
    /// stream can no longer be trusted.
    pub fn decode_frame(&self, frame: &Frame) -> Result<RpcMessage> {
        let header = &frame.header;
        let kind = header.validate(self.max_frame_length)?;

        if frame.body.len() != header.body_length() as usize {
            return Err(RpcError::Protocol(format!(
                "Frame body is {} bytes, header announces {}",
                frame.body.len(),
                header.body_length()
            )));
        }

        let body = match kind {
            MessageType::HeartbeatRequest => MessageBody::Ping,
            MessageType::HeartbeatResponse => MessageBody::Pong,
            _ if frame.body.is_empty() => MessageBody::Empty,
            _ => self.decode_body(header, kind, &frame.body)?,
        };

        Ok(RpcMessage {
            message_type: kind,
            codec: header.codec,
            compress: header.compress,
            request_id: header.request_id,
            body,
        })
    }

    fn decode_body(&self, header: &Header, kind: MessageType, body: &[u8]) -> Result<MessageBody> {
        let compressor = self.registry.compressor(header.compress)?;
        let serializer = self.registry.serializer(header.codec)?;

        let raw = compressor.decompress(body).map_err(|e| undecodable(header, e))?;
        serializer
            .deserialize(&raw, kind)
            .map_err(|e| undecodable(header, e))
    }
}

fn undecodable(header: &Header, cause: RpcError) -> RpcError {
    RpcError::Protocol(format!(
        "Undecodable body for request {}: {}",
        header.request_id, cause
    ))
}

/// Streaming decoder: raw socket bytes in, complete messages out.
pub struct MessageDecoder {
    frames: FrameBuffer,
    codec: MessageCodec,
}

impl MessageDecoder {
    /// Create a decoder using the codec's registry and frame bound.
    pub fn new(codec: MessageCodec) -> Self {
        Self {
            frames: FrameBuffer::with_max_frame_length(codec.max_frame_length()),
            codec,
        }
    }

    /// Push bytes and decode every message they complete.
    ///
    /// Returns an empty vector while a frame is still partial. On error the
    /// messages decoded earlier in the same call are discarded; stream
    /// readers use [`feed`](Self::feed) and [`next_message`](Self::next_message)
    /// instead.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RpcMessage>> {
        self.feed(data);

        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Buffer bytes without decoding.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        self.frames.extend(data);
    }

    /// Decode the next complete message, or `None` until more bytes arrive.
    pub fn next_message(&mut self) -> Result<Option<RpcMessage>> {
        match self.frames.next_frame()? {
            Some(frame) => self.codec.decode_frame(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Number of bytes buffered for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.frames.len()
    }
}
