//! AES-256-GCM sealing for stored refresh tokens.
//!
//! The cipher is built once from the process key and shared by the vault.
//! Each seal uses a fresh random nonce; the GCM tag makes tampering detectable.

use crate::error::{GatewayError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> anyhow::Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Ciphertext plus the nonce it was sealed under.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedToken {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl fmt::Debug for SealedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedToken")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}

/// Process-wide token cipher.
///
/// Constructed explicitly from the configured key and injected into the
/// [`CredentialVault`](super::CredentialVault); never rebuilt per call.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Builds a cipher from raw key bytes (must be 32 bytes).
    pub fn new(key: &[u8]) -> anyhow::Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher })
    }

    /// Builds a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> anyhow::Result<Self> {
        let key = validate_key(key_base64).context("Invalid encryption key")?;
        Self::new(&key)
    }

    /// Encrypts `plaintext` under a freshly generated nonce.
    pub fn seal(&self, plaintext: &str) -> Result<SealedToken> {
        // Never reuse a nonce under the same key
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| GatewayError::EncryptionFailure(format!("encryption failed: {}", e)))?;

        Ok(SealedToken {
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    /// Decrypts and authenticates a sealed token.
    ///
    /// Fails with `EncryptionFailure` on a wrong key, a wrong nonce or any
    /// modification of the ciphertext; never returns corrupted plaintext.
    pub fn open(&self, sealed: &SealedToken) -> Result<String> {
        if sealed.nonce.len() != NONCE_SIZE {
            return Err(GatewayError::EncryptionFailure(format!(
                "invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                sealed.nonce.len()
            )));
        }

        let nonce = Nonce::from_slice(&sealed.nonce);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.ciphertext.as_ref())
            .map_err(|_| {
                GatewayError::EncryptionFailure(
                    "decryption failed (wrong key or corrupted data)".to_string(),
                )
            })?;

        String::from_utf8(plaintext).map_err(|_| {
            GatewayError::EncryptionFailure("decrypted data is not valid UTF-8".to_string())
        })
    }
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCipher { key: <redacted> }")
    }
}
