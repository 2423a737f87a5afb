//! Error types for rpcwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all rpcwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation (bad magic, version, message type, codec id, oversized frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connect timeout, connect refusal, write failure or unexpected close.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection closed while the operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Address resolution returned nothing for the service.
    #[error("Unresolved service: {0}")]
    UnresolvedService(String),

    /// Request was not answered before its deadline.
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Correlation id of the abandoned request.
        request_id: u32,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Body serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Body compression/decompression failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A pending entry already exists for this request id.
    #[error("Duplicate request id: {0}")]
    DuplicateRequest(u32),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether this error leaves the connection unusable.
    ///
    /// Timeouts, resolution failures and encode-side problems only affect a
    /// single request.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Protocol(_)
                | RpcError::Connection(_)
                | RpcError::ConnectionClosed
        )
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RpcError::Serialization(format!("msgpack encode: {}", e))
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RpcError::Serialization(format!("msgpack decode: {}", e))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Serialization(format!("json: {}", e))
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
