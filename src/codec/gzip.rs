//! Gzip compressor using `flate2`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{ids, Compressor};
use crate::error::{Result, RpcError};

/// Default cap on decompressed output (64MB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Gzip compressor.
///
/// Decompression output is capped so a small hostile frame cannot expand
/// into an unbounded allocation.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
    max_decompressed_size: usize,
}

impl GzipCompressor {
    /// Create a compressor with the default level and output cap.
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Set the compression level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Set the maximum decompressed size.
    pub fn with_max_decompressed_size(mut self, max: usize) -> Self {
        self.max_decompressed_size = max;
        self
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn id(&self) -> u8 {
        ids::GZIP
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), self.level);
        encoder
            .write_all(data)
            .map_err(|e| RpcError::Compression(format!("gzip compress failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| RpcError::Compression(format!("gzip compress failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.max_decompressed_size as u64;
        let mut out = Vec::new();
        GzDecoder::new(data)
            .take(limit + 1)
            .read_to_end(&mut out)
            .map_err(|e| RpcError::Compression(format!("gzip decompress failed: {}", e)))?;

        if out.len() as u64 > limit {
            return Err(RpcError::Compression(format!(
                "decompressed size exceeds {} bytes",
                limit
            )));
        }

        Ok(out)
    }
}
