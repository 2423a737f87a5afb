//! Codec module - body serialization and compression.
//!
//! Every frame names its serializer and compressor with a one-byte id. The
//! [`CodecRegistry`] maps those ids (and human names, for configuration) to
//! shared implementations:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (id 1)
//! - [`JsonCodec`] - JSON using `serde_json` (id 2)
//! - [`NoCompression`] - pass-through (id 0)
//! - [`GzipCompressor`] - gzip using `flate2` (id 1)
//!
//! # Design
//!
//! Implementations are stateless, so a single `Arc` instance is shared by
//! every connection and task. Lookups happen once per frame by id.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::{ids, CodecRegistry};
//!
//! let registry = CodecRegistry::with_defaults();
//! assert_eq!(registry.serializer_id("msgpack"), Some(ids::MSGPACK));
//! assert!(registry.compressor(ids::GZIP).is_ok());
//! assert!(registry.serializer(0x7F).is_err());
//! ```

mod gzip;
mod json;
mod msgpack;
mod raw;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use gzip::{GzipCompressor, DEFAULT_MAX_DECOMPRESSED_SIZE};
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::NoCompression;

use crate::error::{Result, RpcError};
use crate::protocol::{MessageBody, MessageType};

/// Built-in codec identifiers.
pub mod ids {
    /// MessagePack serializer.
    pub const MSGPACK: u8 = 0x01;
    /// JSON serializer.
    pub const JSON: u8 = 0x02;

    /// No compression.
    pub const NO_COMPRESSION: u8 = 0x00;
    /// Gzip compression.
    pub const GZIP: u8 = 0x01;
}

/// Converts message bodies to and from bytes.
pub trait Serializer: Send + Sync + 'static {
    /// Identifier written in the `codec` header byte.
    fn id(&self) -> u8;

    /// Name used in configuration.
    fn name(&self) -> &'static str;

    /// Serialize a request or response body.
    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>>;

    /// Deserialize bytes into the body type implied by `kind`.
    fn deserialize(&self, bytes: &[u8], kind: MessageType) -> Result<MessageBody>;
}

/// Converts bytes to and from a compressed form.
pub trait Compressor: Send + Sync + 'static {
    /// Identifier written in the `compress` header byte.
    fn id(&self) -> u8;

    /// Name used in configuration.
    fn name(&self) -> &'static str;

    /// Compress bytes. Must accept zero-length input.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress bytes produced by [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Lookup of serializers and compressors by id or name.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    serializers: HashMap<u8, Arc<dyn Serializer>>,
    compressors: HashMap<u8, Arc<dyn Compressor>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in codec.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_serializer(Arc::new(MsgPackCodec));
        registry.register_serializer(Arc::new(JsonCodec));
        registry.register_compressor(Arc::new(NoCompression));
        registry.register_compressor(Arc::new(GzipCompressor::new()));
        registry
    }

    /// Register a serializer, replacing any previous one with the same id.
    pub fn register_serializer(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(serializer.id(), serializer);
    }

    /// Register a compressor, replacing any previous one with the same id.
    pub fn register_compressor(&mut self, compressor: Arc<dyn Compressor>) {
        self.compressors.insert(compressor.id(), compressor);
    }

    /// Serializer for a header `codec` byte.
    ///
    /// Unknown ids are protocol errors: the peer sent something this side
    /// cannot interpret.
    pub fn serializer(&self, id: u8) -> Result<&Arc<dyn Serializer>> {
        self.serializers
            .get(&id)
            .ok_or_else(|| RpcError::Protocol(format!("Unknown codec type: {}", id)))
    }

    /// Compressor for a header `compress` byte.
    pub fn compressor(&self, id: u8) -> Result<&Arc<dyn Compressor>> {
        self.compressors
            .get(&id)
            .ok_or_else(|| RpcError::Protocol(format!("Unknown compress type: {}", id)))
    }

    /// Id of the serializer registered under `name`.
    pub fn serializer_id(&self, name: &str) -> Option<u8> {
        self.serializers
            .values()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .map(|s| s.id())
    }

    /// Id of the compressor registered under `name`.
    pub fn compressor_id(&self, name: &str) -> Option<u8> {
        self.compressors
            .values()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(|c| c.id())
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializers: Vec<_> = self.serializers.values().map(|s| (s.id(), s.name())).collect();
        let mut compressors: Vec<_> = self.compressors.values().map(|c| (c.id(), c.name())).collect();
        serializers.sort_unstable();
        compressors.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("serializers", &serializers)
            .field("compressors", &compressors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_by_id() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.serializer(ids::MSGPACK).unwrap().name(), "msgpack");
        assert_eq!(registry.serializer(ids::JSON).unwrap().name(), "json");
        assert_eq!(registry.compressor(ids::NO_COMPRESSION).unwrap().name(), "none");
        assert_eq!(registry.compressor(ids::GZIP).unwrap().name(), "gzip");
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.serializer_id("JSON"), Some(ids::JSON));
        assert_eq!(registry.compressor_id("gzip"), Some(ids::GZIP));
        assert_eq!(registry.serializer_id("kryo"), None);
    }

    #[test]
    fn test_unknown_ids_are_protocol_errors() {
        let registry = CodecRegistry::with_defaults();
        let err = registry.serializer(0x42).err().unwrap();
        assert!(matches!(err, RpcError::Protocol(_)));
        let err = registry.compressor(0x42).err().unwrap();
        assert!(err.to_string().contains("Unknown compress type"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = CodecRegistry::new();
        assert!(registry.serializer(ids::MSGPACK).is_err());
    }

    #[test]
    fn test_register_replaces_same_id() {
        struct Shouty;
        impl Compressor for Shouty {
            fn id(&self) -> u8 {
                ids::GZIP
            }
            fn name(&self) -> &'static str {
                "shouty"
            }
            fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
                Ok(data.to_ascii_uppercase())
            }
            fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
                Ok(data.to_ascii_lowercase())
            }
        }

        let mut registry = CodecRegistry::with_defaults();
        registry.register_compressor(Arc::new(Shouty));
        assert_eq!(registry.compressor(ids::GZIP).unwrap().name(), "shouty");
        assert_eq!(registry.compressor_id("gzip"), None);
    }
}
