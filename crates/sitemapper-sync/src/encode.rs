//! Chunk serialization.

use sitemapper_core::{Error, Result};

use crate::record::SitemapRecord;

/// Turns one chunk's records into artifact bytes.
pub trait ChunkEncoder: Send + Sync {
    fn encode(&self, records: &[SitemapRecord]) -> Result<Vec<u8>>;
}

/// JSON array encoder used for cached chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl ChunkEncoder for JsonEncoder {
    fn encode(&self, records: &[SitemapRecord]) -> Result<Vec<u8>> {
        serde_json::to_vec(records).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_encodes_as_array() {
        assert_eq!(JsonEncoder.encode(&[]).unwrap(), b"[]");
    }
}
