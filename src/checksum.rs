//! CRC-32 (IEEE, reflected polynomial 0xEDB88320) over entry plaintext.
//!
//! Computed before compression on pack and after decompression on unpack,
//! so it catches damage the cipher tag cannot see: a decoder that stops
//! short, or a stream that inflates to the wrong bytes.

use crc32fast::Hasher;

pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// `true` when `data` hashes to `expected`.
pub fn verify(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b"The quick brown fox jumps over the lazy dog"), 0x414F_A339);
    }

    #[test]
    fn order_matters() {
        assert_ne!(crc32(b"ab"), crc32(b"ba"));
    }

    #[test]
    fn verify_detects_single_bit_flip() {
        let mut data = vec![0x5Au8; 256];
        let sum = crc32(&data);
        assert!(verify(&data, sum));
        data[100] ^= 0x01;
        assert!(!verify(&data, sum));
    }
}
