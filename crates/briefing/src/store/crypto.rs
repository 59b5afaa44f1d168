//! AES-256-GCM encryption for credentials at rest.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;

/// AES-GCM standard nonce size.
const NONCE_SIZE: usize = 12;

/// Required key length in bytes.
pub const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex key: {0}")]
    InvalidKeyHex(String),

    #[error("encryption key must be 32 bytes (256 bits) long")]
    InvalidKeyLength,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Encrypts and decrypts credential strings.
///
/// Ciphertexts are hex strings of `nonce || ciphertext`, with a fresh
/// random nonce per encryption.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Create from a 64-character hex key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, CryptoError> {
        let key_bytes =
            hex::decode(key_hex.trim()).map_err(|e| CryptoError::InvalidKeyHex(e.to_string()))?;
        Self::new(&key_bytes)
    }

    /// Create from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { cipher })
    }

    /// Generate a random key, hex encoded.
    #[must_use]
    pub fn generate_key_hex() -> String {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        hex::encode(key)
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt(&self, plain_text: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain_text.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(hex::encode(result))
    }

    /// Decrypt a value produced by [`SecretCipher::encrypt`].
    pub fn decrypt(&self, cipher_hex: &str) -> Result<String, CryptoError> {
        let data = hex::decode(cipher_hex)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid hex ciphertext: {e}")))?;
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed(
                "ciphertext is too short to contain a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plain = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plain)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}
