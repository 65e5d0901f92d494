//! PKCE (Proof Key for Code Exchange, RFC 7636) material.
//!
//! Verifiers and state tokens are 32 bytes from the thread CSPRNG, encoded as
//! unpadded URL-safe base64 (43 characters).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Challenge method sent alongside the challenge
pub const CHALLENGE_METHOD: &str = "S256";

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a code verifier (256 bits of entropy)
pub fn generate_verifier() -> String {
    random_token()
}

/// Derive the S256 challenge: BASE64URL-NOPAD(SHA256(verifier))
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate an opaque correlation state, independent of any verifier
pub fn generate_state() -> String {
    random_token()
}

/// Verifier and the challenge derived from it.
#[derive(Clone)]
pub struct PkceChallenge {
    /// Kept server-side until the code exchange
    pub verifier: String,
    /// Sent in the authorization request
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}
