//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs are written as maps keyed by field
//! name, so peers may add optional fields without breaking older readers.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use super::{ids, Serializer};
use crate::error::{Result, RpcError};
use crate::protocol::{MessageBody, MessageType};

/// MessagePack codec for structured data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Serializer for MsgPackCodec {
    fn id(&self) -> u8 {
        ids::MSGPACK
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>> {
        match body {
            MessageBody::Request(request) => Self::encode(request),
            MessageBody::Response(response) => Self::encode(response),
            other => Err(RpcError::Serialization(format!(
                "{:?} has no serializable body",
                other
            ))),
        }
    }

    fn deserialize(&self, bytes: &[u8], kind: MessageType) -> Result<MessageBody> {
        match kind {
            MessageType::Request => Ok(MessageBody::Request(Self::decode(bytes)?)),
            MessageType::Response => Ok(MessageBody::Response(Self::decode(bytes)?)),
            other => Err(RpcError::Serialization(format!(
                "{:?} frames carry no body",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RpcRequest, RpcResponse};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: TestStruct = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_to_vec_named_produces_map_format() {
        let test = TestStruct {
            id: 1,
            name: "x".to_string(),
            active: false,
        };

        let encoded = MsgPackCodec::encode(&test).unwrap();

        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_binary_buffer() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();

        assert_eq!(encoded[0], 0xc4, "Expected bin8 format");

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data);
    }

    #[test]
    fn test_request_body_with_nested_values() {
        let mut request = RpcRequest::new("demo.Orders", "place")
            .param("Order", json!({"sku": "A-1", "qty": 3, "tags": ["x", "y"]}))
            .param("double", json!(2.5))
            .param("long", json!(-7));
        request.request_id = 11;

        let body = MessageBody::Request(request);
        let bytes = MsgPackCodec.serialize(&body).unwrap();
        let decoded = MsgPackCodec.deserialize(&bytes, MessageType::Request).unwrap();

        assert_eq!(decoded, body);
    }

    #[test]
    fn test_response_body() {
        let body = MessageBody::Response(RpcResponse::success(3, json!([1, 2, 3])));
        let bytes = MsgPackCodec.serialize(&body).unwrap();
        let decoded = MsgPackCodec.deserialize(&bytes, MessageType::Response).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_heartbeat_body_rejected() {
        assert!(MsgPackCodec.serialize(&MessageBody::Ping).is_err());
        assert!(MsgPackCodec
            .deserialize(b"\xc0", MessageType::HeartbeatRequest)
            .is_err());
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result = MsgPackCodec.deserialize(b"not valid msgpack", MessageType::Response);
        assert!(matches!(result, Err(RpcError::Serialization(_))));
    }
}
