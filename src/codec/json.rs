//! JSON codec using `serde_json`.
//!
//! Larger on the wire than MsgPack but readable in packet captures.

use super::{ids, Serializer};
use crate::error::{Result, RpcError};
use crate::protocol::{MessageBody, MessageType};

/// JSON codec for structured data.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn id(&self) -> u8 {
        ids::JSON
    }

    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>> {
        match body {
            MessageBody::Request(request) => Ok(serde_json::to_vec(request)?),
            MessageBody::Response(response) => Ok(serde_json::to_vec(response)?),
            other => Err(RpcError::Serialization(format!(
                "{:?} has no serializable body",
                other
            ))),
        }
    }

    fn deserialize(&self, bytes: &[u8], kind: MessageType) -> Result<MessageBody> {
        match kind {
            MessageType::Request => Ok(MessageBody::Request(serde_json::from_slice(bytes)?)),
            MessageType::Response => Ok(MessageBody::Response(serde_json::from_slice(bytes)?)),
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
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let mut request = RpcRequest::new("demo.Hello", "greet").param("String", json!("bob"));
        request.request_id = 9;
        let body = MessageBody::Request(request);

        let bytes = JsonCodec.serialize(&body).unwrap();
        assert_eq!(bytes[0], b'{');

        let decoded = JsonCodec.deserialize(&bytes, MessageType::Request).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_response_roundtrip() {
        let body = MessageBody::Response(RpcResponse::fail(4, "no such method"));
        let bytes = JsonCodec.serialize(&body).unwrap();
        let decoded = JsonCodec.deserialize(&bytes, MessageType::Response).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_wrong_target_type_fails() {
        let body = MessageBody::Response(RpcResponse::success(1, json!(1)));
        let bytes = JsonCodec.serialize(&body).unwrap();
        assert!(JsonCodec.deserialize(&bytes, MessageType::Request).is_err());
    }
}
