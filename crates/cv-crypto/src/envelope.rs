//! Envelope primitives: key wrapping for readers and payload AEAD
//!
//! Wrapped key format: RSA-OAEP(SHA-256) ciphertext, one modulus length.
//!
//! Encrypted payload format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::keys::{ContentKey, KeyPair, PublicKey};
use crate::{CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Wrap a content key for `recipient`.
pub fn wrap_key(recipient: &PublicKey, key: &ContentKey) -> Result<Vec<u8>, CryptoError> {
    recipient
        .as_rsa()
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            key.as_bytes(),
        )
        .map_err(|e| CryptoError::Encryption(format!("key wrapping failed: {e}")))
}

/// Unwrap a content key with the reader's private key.
///
/// Fails on malformed input and on keys wrapped for a different reader; it
/// never returns a key it could not authenticate.
pub fn unwrap_key(keys: &KeyPair, wrapped: &[u8]) -> Result<ContentKey, CryptoError> {
    let mut plaintext = keys
        .as_rsa()
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| {
            CryptoError::KeyUnwrap("invalid private key or corrupted wrapped key".into())
        })?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(CryptoError::KeyUnwrap(format!(
            "unwrapped key has wrong size: {} bytes (expected {})",
            plaintext.len(),
            KEY_SIZE
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(ContentKey::from_bytes(key_bytes))
}

/// Encrypt a payload under a content key.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(key: &ContentKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("payload encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a payload produced by [`encrypt`].
pub fn decrypt(key: &ContentKey, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "payload too short: {} bytes (minimum {})",
            encrypted.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        CryptoError::Decryption("payload authentication failed: wrong key or corrupted data".into())
    })
}
