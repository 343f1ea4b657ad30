//! Password → archive key: PBKDF2-HMAC-SHA256, fixed 10 000 iterations.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::{KEY_LEN, SALT_LEN};

pub const KDF_ITERATIONS: u32 = 10_000;

/// A 256-bit key derived from the archive password.
///
/// Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the archive key from `password` and the archive salt.
///
/// Deterministic, and infallible: an empty password is accepted and
/// yields a well-defined (weak) key.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> DerivedKey {
    derive_key_with_iterations(password, salt, KDF_ITERATIONS)
}

pub(crate) fn derive_key_with_iterations(password: &[u8], salt: &[u8], iterations: u32) -> DerivedKey {
    let mut key = DerivedKey { bytes: [0u8; KEY_LEN] };
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key.bytes);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn matches_rfc7914_vector() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", c = 1), first 32 bytes.
        let key = derive_key_with_iterations(b"passwd", b"salt", 1);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn is_deterministic() {
        let salt = [0x42u8; SALT_LEN];
        let a = derive_key(b"correct-horse", &salt);
        let b = derive_key(b"correct-horse", &salt);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn empty_password_is_accepted() {
        let salt = [0u8; SALT_LEN];
        let key = derive_key(b"", &salt);
        assert_ne!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn single_bit_salt_changes_yield_distinct_keys() {
        let base = [0x11u8; SALT_LEN];
        let mut seen = HashSet::new();
        seen.insert(*derive_key_with_iterations(b"pw", &base, 50).as_bytes());
        for bit in 0..(SALT_LEN * 8) {
            let mut salt = base;
            salt[bit / 8] ^= 1 << (bit % 8);
            let key = derive_key_with_iterations(b"pw", &salt, 50);
            assert!(seen.insert(*key.as_bytes()), "collision at bit {bit}");
        }
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = DerivedKey::from_bytes([0xEE; KEY_LEN]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.to_lowercase().contains("ee, "));
    }
}
