//! AES-256-GCM with a 128-bit nonce and PBKDF2-SHA256 key derivation.
//!
//! Key derivation: PBKDF2-HMAC-SHA256(password, salt = archive salt, 10 000) → 32-byte key
//! Encryption:     AES-256-GCM, 16-byte nonce from the archive header
//!
//! Sealed payload layout: [ ciphertext | GCM tag (16 B) ]
//!
//! The nonce is not stored with the payload; every entry derives it from
//! the archive nonce (see [`entry_nonce`]).

pub mod kdf;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

pub use kdf::{derive_key, DerivedKey, KDF_ITERATIONS};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Failed to initialise cipher")]
    CipherInit,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,
    #[error("Encrypted payload too short (minimum {TAG_LEN} bytes)")]
    TooShort,
    #[error("Secure random source unavailable: {0}")]
    Random(String),
}

/// Fresh archive-wide salt and nonce from the OS CSPRNG.
pub fn random_salt_and_nonce() -> Result<([u8; SALT_LEN], [u8; NONCE_LEN]), CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .and_then(|_| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok((salt, nonce))
}

/// Per-entry nonce: the entry index XORed into the trailing 8 bytes
/// (little-endian) of the archive nonce.  Index 0 returns `base` unchanged.
pub fn entry_nonce(base: &[u8; NONCE_LEN], index: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *base;
    for (b, i) in nonce[NONCE_LEN - 8..].iter_mut().zip(index.to_le_bytes()) {
        *b ^= i;
    }
    nonce
}

/// An initialised AES-256-GCM context bound to one archive key.
pub struct EntryCipher {
    cipher: Aes256Gcm16,
}

impl EntryCipher {
    pub fn new(key: &DerivedKey) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::CipherInit)?;
        Ok(Self { cipher })
    }

    /// Returns `ciphertext || tag`.
    pub fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(Nonce::<U16>::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Verify the trailing tag and return the plaintext.
    pub fn open(&self, nonce: &[u8; NONCE_LEN], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < TAG_LEN {
            return Err(CryptoError::TooShort);
        }
        self.cipher
            .decrypt(Nonce::<U16>::from_slice(nonce), Payload { msg: sealed, aad })
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// One-shot encrypt with no associated data.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey, nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, CryptoError> {
    EntryCipher::new(key)?.seal(nonce, plaintext, &[])
}

/// One-shot decrypt of a payload produced by [`encrypt`].
pub fn decrypt(sealed: &[u8], key: &DerivedKey, nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, CryptoError> {
    EntryCipher::new(key)?.open(nonce, sealed, &[])
}
