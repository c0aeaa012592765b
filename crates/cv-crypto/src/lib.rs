//! cv-crypto: envelope encryption for chainvault records
//!
//! Every record is encrypted once under its own random content key; that key
//! is then wrapped separately for each authorized reader.
//!
//! ```text
//! Content Key (256-bit random, one per record)
//!   ├── Payload AEAD: AES-256-GCM (nonce=random_96bit, prepended)
//!   └── Access entries: RSA-OAEP(SHA-256)(reader public key, content key), one per reader
//! ```
//!
//! Sharing never touches the payload: it only produces new wrappings of an
//! existing content key.

pub mod envelope;
pub mod keys;

pub use envelope::{decrypt, encrypt, unwrap_key, wrap_key};
pub use keys::{generate_content_key, ContentKey, KeyPair, PublicKey};

use cv_core::ChainVaultError;
use thiserror::Error;

/// Size of a content key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// RSA modulus size for newly generated key pairs
pub const DEFAULT_RSA_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed wrapped key or a key wrapped for someone else
    #[error("{0}")]
    KeyUnwrap(String),

    /// Authentication tag mismatch or malformed ciphertext
    #[error("{0}")]
    Decryption(String),

    #[error("{0}")]
    Encryption(String),

    #[error("key encoding: {0}")]
    KeyEncoding(String),
}

impl From<CryptoError> for ChainVaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyUnwrap(m) => ChainVaultError::KeyUnwrap(m),
            CryptoError::Decryption(m) => ChainVaultError::Decryption(m),
            CryptoError::Encryption(m) => ChainVaultError::Encryption(m),
            CryptoError::KeyEncoding(m) => ChainVaultError::Codec(m),
        }
    }
}
