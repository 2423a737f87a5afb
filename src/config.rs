//! Client configuration.
//!
//! Every field has a default, so a JSON document only needs the keys it
//! changes. Durations are written in milliseconds:
//!
//! ```
//! use rpcwire::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{ "request_timeout_ms": 1500 }"#).unwrap();
//! assert_eq!(config.request_timeout, Some(std::time::Duration::from_millis(1500)));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::ids;
use crate::error::{Result, RpcError};
use crate::protocol::{DEFAULT_MAX_FRAME_LENGTH, HEADER_SIZE};
use crate::transport::DEFAULT_READ_BUFFER_SIZE;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default write-idle window before a heartbeat is sent.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables for [`crate::RpcClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on establishing a connection.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Bound on waiting for a response. `None` waits forever.
    #[serde(rename = "request_timeout_ms", with = "opt_millis")]
    pub request_timeout: Option<Duration>,

    /// Write-idle window before a heartbeat is sent.
    #[serde(rename = "heartbeat_interval_ms", with = "millis")]
    pub heartbeat_interval: Duration,

    /// Largest accepted or produced frame, header included.
    pub max_frame_length: u32,

    /// Codec id used for outgoing requests.
    pub serializer: u8,

    /// Compress id used for outgoing requests.
    pub compressor: u8,

    /// Writer queue depth per connection.
    pub channel_capacity: usize,

    /// Reader scratch buffer per connection.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            serializer: ids::MSGPACK,
            compressor: ids::GZIP,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| RpcError::Config(format!("invalid client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(RpcError::Config("connect_timeout must be non-zero".into()));
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RpcError::Config(
                "request_timeout must be non-zero, use null to disable".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(RpcError::Config("heartbeat_interval must be non-zero".into()));
        }
        if (self.max_frame_length as usize) < HEADER_SIZE {
            return Err(RpcError::Config(format!(
                "max_frame_length {} is smaller than the {}-byte header",
                self.max_frame_length, HEADER_SIZE
            )));
        }
        if self.channel_capacity == 0 {
            return Err(RpcError::Config("channel_capacity must be non-zero".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(RpcError::Config("read_buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
