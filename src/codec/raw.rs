//! Pass-through compressor.
//!
//! Used when bodies are small enough that compression costs more than it
//! saves, or when the peer does not support any compressor.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::{Compressor, NoCompression};
//!
//! let data = b"binary payload";
//! let packed = NoCompression.compress(data).unwrap();
//! assert_eq!(&packed[..], data);
//! assert_eq!(NoCompression.decompress(&packed).unwrap(), data);
//! ```

use super::{ids, Compressor};
use crate::error::Result;

/// Compressor that passes bytes through without transformation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        ids::NO_COMPRESSION
    }

    fn name(&self) -> &'static str {
        "none"
    }

    #[inline]
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    #[inline]
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
