//! Compression codec lookup.
//!
//! Codec implementations are an external concern: the client core only picks
//! the codec a payload's attributes select and applies it to the encoded
//! record data. Only the identity codec ships with the crate; real codecs
//! are registered by the embedding layer.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Compression type as encoded in the low bits of record attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    /// The codec selected by record-batch attributes.
    pub fn from_attributes(attributes: i8) -> Self {
        match attributes & 0x7 {
            1 => Self::Gzip,
            2 => Self::Snappy,
            3 => Self::Lz4,
            4 => Self::Zstd,
            _ => Self::None,
        }
    }

    pub fn attributes(&self) -> i8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Snappy => 2,
            Self::Lz4 => 3,
            Self::Zstd => 4,
        }
    }
}

/// One compression implementation.
pub trait CompressionCodec: Send + Sync {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("no codec registered for {0:?}")]
    NotRegistered(Compression),

    #[error("codec for {0:?} failed: {1}")]
    Codec(Compression, #[source] io::Error),
}

/// Registry of codecs, keyed by compression type.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<Compression, Arc<dyn CompressionCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, compression: Compression, codec: Arc<dyn CompressionCodec>) {
        self.codecs.insert(compression, codec);
    }

    /// Applies the codec the compression type selects; [`Compression::None`]
    /// passes data through untouched.
    pub fn compress(
        &self,
        compression: Compression,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, CompressionError> {
        if compression == Compression::None {
            return Ok(data);
        }
        let codec = self
            .codecs
            .get(&compression)
            .ok_or(CompressionError::NotRegistered(compression))?;
        codec
            .compress(&data)
            .map_err(|e| CompressionError::Codec(compression, e))
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    struct ReverseCodec;

    impl CompressionCodec for ReverseCodec {
        fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    #[test]
    fn test_identity_passthrough() {
        let registry = CodecRegistry::new();
        assert_eq!(
            registry.compress(Compression::None, vec![1, 2, 3]).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_unregistered_codec() {
        let registry = CodecRegistry::new();
        let err = registry.compress(Compression::Gzip, vec![1]).unwrap_err();
        assert_matches!(err, CompressionError::NotRegistered(Compression::Gzip));
    }

    #[test]
    fn test_registered_codec_applied() {
        let mut registry = CodecRegistry::new();
        registry.register(Compression::Gzip, Arc::new(ReverseCodec));
        assert_eq!(
            registry.compress(Compression::Gzip, vec![1, 2, 3]).unwrap(),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn test_attributes_roundtrip() {
        for compression in [
            Compression::None,
            Compression::Gzip,
            Compression::Snappy,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            assert_eq!(
                Compression::from_attributes(compression.attributes()),
                compression
            );
        }
    }
}
