//! Logical messages carried inside frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::wire_format::{MessageType, PING, PONG};

/// A call to `method_name` on a remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, copied into the frame header.
    pub request_id: u32,
    /// Interface (service) name.
    pub interface_name: String,
    /// Method to invoke.
    pub method_name: String,
    /// Declared parameter type names, one per parameter.
    #[serde(default)]
    pub param_types: Vec<String>,
    /// Parameter values.
    #[serde(default)]
    pub parameters: Vec<Value>,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Service group, distinguishes several implementations of one interface.
    #[serde(default)]
    pub group: String,
}

impl RpcRequest {
    /// Create a request without parameters. The request id is assigned by
    /// the client when the request is sent.
    pub fn new(interface_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            request_id: 0,
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            param_types: Vec::new(),
            parameters: Vec::new(),
            version: String::new(),
            group: String::new(),
        }
    }

    /// Append a parameter with its declared type name.
    pub fn param(mut self, type_name: impl Into<String>, value: Value) -> Self {
        self.param_types.push(type_name.into());
        self.parameters.push(value);
        self
    }

    /// Set the service version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the service group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Logical service name used for address resolution.
    ///
    /// ```
    /// use rpcwire::protocol::RpcRequest;
    ///
    /// let req = RpcRequest::new("demo.Hello", "hello").group("g1").version("v2");
    /// assert_eq!(req.service_name(), "demo.Hellog1v2");
    /// ```
    pub fn service_name(&self) -> String {
        format!("{}{}{}", self.interface_name, self.group, self.version)
    }
}

/// Status code of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ResponseCode {
    /// Call succeeded.
    Success,
    /// Call failed remotely.
    Fail,
}

impl From<ResponseCode> for u16 {
    fn from(code: ResponseCode) -> u16 {
        match code {
            ResponseCode::Success => 200,
            ResponseCode::Fail => 500,
        }
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = String;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            200 => Ok(ResponseCode::Success),
            500 => Ok(ResponseCode::Fail),
            other => Err(format!("unknown response code {}", other)),
        }
    }
}

/// Result of an [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation id of the originating request.
    pub request_id: u32,
    /// Status code.
    pub code: ResponseCode,
    /// Human readable status or error detail.
    #[serde(default)]
    pub message: String,
    /// Return value.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Successful response carrying `data`.
    pub fn success(request_id: u32, data: Value) -> Self {
        Self {
            request_id,
            code: ResponseCode::Success,
            message: "The remote call is successful".to_string(),
            data: Some(data),
        }
    }

    /// Failed response with an error detail.
    pub fn fail(request_id: u32, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code: ResponseCode::Fail,
            message: message.into(),
            data: None,
        }
    }

    /// Check if the remote call succeeded.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success
    }
}

/// Decoded content of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Body of a REQUEST.
    Request(RpcRequest),
    /// Body of a RESPONSE.
    Response(RpcResponse),
    /// Heartbeat request sentinel.
    Ping,
    /// Heartbeat response sentinel.
    Pong,
    /// REQUEST or RESPONSE with a zero-length body.
    Empty,
}

impl MessageBody {
    /// Sentinel string of a heartbeat body.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            MessageBody::Ping => Some(PING),
            MessageBody::Pong => Some(PONG),
            _ => None,
        }
    }
}

/// One logical message: header fields plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    /// Kind of message.
    pub message_type: MessageType,
    /// Serialization codec id.
    pub codec: u8,
    /// Compression codec id.
    pub compress: u8,
    /// Correlation id.
    pub request_id: u32,
    /// Decoded body.
    pub body: MessageBody,
}

impl RpcMessage {
    /// REQUEST message; the header request id is taken from the request.
    pub fn request(request: RpcRequest, codec: u8, compress: u8) -> Self {
        Self {
            message_type: MessageType::Request,
            codec,
            compress,
            request_id: request.request_id,
            body: MessageBody::Request(request),
        }
    }

    /// RESPONSE message; the header request id is taken from the response.
    pub fn response(response: RpcResponse, codec: u8, compress: u8) -> Self {
        Self {
            message_type: MessageType::Response,
            codec,
            compress,
            request_id: response.request_id,
            body: MessageBody::Response(response),
        }
    }

    /// HEARTBEAT_REQUEST message.
    pub fn ping(codec: u8, compress: u8) -> Self {
        Self {
            message_type: MessageType::HeartbeatRequest,
            codec,
            compress,
            request_id: 0,
            body: MessageBody::Ping,
        }
    }

    /// HEARTBEAT_RESPONSE message answering `request_id`.
    pub fn pong(request_id: u32, codec: u8, compress: u8) -> Self {
        Self {
            message_type: MessageType::HeartbeatResponse,
            codec,
            compress,
            request_id,
            body: MessageBody::Pong,
        }
    }
}
