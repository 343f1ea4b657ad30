//! Deflate (zlib wrapper) compression for entry plaintext.
//!
//! The compressed stream does not carry its own length: the caller keeps
//! `original_size` in the entry record and hands it back on decompress.
//! [`DeflateCodec::decompress`] always yields exactly that many bytes;
//! a truncated or damaged stream is padded with zeroes and left for the
//! CRC check to reject.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::debug;

/// zlib best-compression.
pub const DEFAULT_LEVEL: u32 = 9;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(#[from] io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl DeflateCodec {
    /// Levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self { level: Compression::new(level.min(9)) }
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 64), self.level);
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }

    pub fn decompress(&self, data: &[u8], original_size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let mut decoder = ZlibDecoder::new(data).take(original_size as u64);
        if let Err(e) = decoder.read_to_end(&mut out) {
            debug!(error = %e, decoded = out.len(), "deflate stream ended early");
        }
        if out.len() < original_size as usize {
            debug!(decoded = out.len(), expected = original_size, "padding short deflate output");
            out.resize(original_size as usize, 0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_bytes() {
        let codec = DeflateCodec::default();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(codec.decompress(&packed, data.len() as u32), data);
    }

    #[test]
    fn empty_input_roundtrips() {
        let codec = DeflateCodec::default();
        let packed = codec.compress(b"").unwrap();
        assert!(!packed.is_empty());
        assert!(codec.decompress(&packed, 0).is_empty());
    }

    #[test]
    fn output_length_always_matches_declared_size() {
        let codec = DeflateCodec::new(1);
        let data = vec![0xAAu8; 4096];
        let packed = codec.compress(&data).unwrap();

        // Declared smaller: truncated.
        assert_eq!(codec.decompress(&packed, 100), vec![0xAA; 100]);

        // Declared larger: zero padded.
        let out = codec.decompress(&packed, 5000);
        assert_eq!(out.len(), 5000);
        assert_eq!(&out[..4096], &data[..]);
        assert!(out[4096..].iter().all(|&b| b == 0));
    }

    #[test]
    fn garbage_input_does_not_panic() {
        let codec = DeflateCodec::default();
        let out = codec.decompress(b"definitely not zlib", 32);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(DeflateCodec::new(42).level(), 9);
        assert_eq!(DeflateCodec::new(0).level(), 0);
    }
}
