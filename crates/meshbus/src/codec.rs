//! # Snapshot Codec
//!
//! Byte transform applied to gossip snapshots before they leave the node.
//! The bus treats it as opaque: whatever `compress` produces, the peer's
//! `decompress` must undo.

use crate::error::CodecError;

// =============================================================================
// CODEC TRAIT
// =============================================================================

/// Compression used for topology snapshots.
pub trait SnapshotCodec: Send + Sync {
    /// Compress serialized snapshot bytes.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Restore bytes produced by [`SnapshotCodec::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// =============================================================================
// ZSTD CODEC
// =============================================================================

/// Zstd codec, the default for every node.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Create a codec with the given zstd level (1-22).
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SnapshotCodec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, self.level).map_err(|e| CodecError::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompress(e.to_string()))
    }
}

// =============================================================================
// NO-OP CODEC
// =============================================================================

/// Pass-through codec, handy when inspecting gossip by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCodec;

impl SnapshotCodec for NoOpCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_restores_input() {
        let codec = ZstdCodec::default();
        let data = br#"{"id":"node-a","graph":{"nodes":[],"edges":[]}}"#.repeat(20);

        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_zstd_rejects_garbage() {
        let codec = ZstdCodec::default();
        let err = codec.decompress(b"definitely not zstd").unwrap_err();
        assert!(matches!(err, CodecError::Decompress(_)));
    }

    #[test]
    fn test_noop_is_identity() {
        let codec = NoOpCodec;
        assert_eq!(codec.compress(b"abc").unwrap(), b"abc");
        assert_eq!(codec.decompress(b"abc").unwrap(), b"abc");
    }
}
