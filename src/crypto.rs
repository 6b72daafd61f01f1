//! Sealing of stored connection passwords.
//!
//! Values are AES-256-GCM encrypted with a fresh 96-bit nonce per write and
//! stored as `base64(nonce || ciphertext || tag)`. The column name is bound as
//! additional authenticated data so a sealed value cannot be moved to another
//! column and still open.

use base64::{Engine, engine::general_purpose::STANDARD};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

use crate::error::HubError;

#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(<redacted>)")
    }
}

impl CredentialCipher {
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, HubError> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| HubError::Crypto("app key must be exactly 32 bytes".to_string()))?;
        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Accepts the key as plain base64 or with a `base64:` prefix.
    pub fn from_base64_key(encoded: &str) -> Result<Self, HubError> {
        let trimmed = encoded.trim();
        let raw = trimmed.strip_prefix("base64:").unwrap_or(trimmed);
        let bytes = STANDARD
            .decode(raw)
            .map_err(|e| HubError::Crypto(format!("app key is not valid base64: {e}")))?;
        Self::from_key_bytes(&bytes)
    }

    pub fn encrypt(&self, plaintext: &str, context: &str) -> Result<String, HubError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| HubError::Crypto("failed to generate nonce".to_string()))?;

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(context.as_bytes()),
                &mut sealed,
            )
            .map_err(|_| HubError::Crypto("encryption failed".to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(sealed);
        Ok(STANDARD.encode(combined))
    }

    pub fn decrypt(&self, stored: &str, context: &str) -> Result<String, HubError> {
        let combined = STANDARD
            .decode(stored)
            .map_err(|e| HubError::Crypto(format!("sealed value is not base64: {e}")))?;
        if combined.len() < NONCE_LEN {
            return Err(HubError::Crypto("sealed value too short".to_string()));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| HubError::Crypto("invalid nonce".to_string()))?;
        let mut buf = sealed.to_vec();
        let opened = self
            .key
            .open_in_place(nonce, Aad::from(context.as_bytes()), &mut buf)
            .map_err(|_| HubError::Crypto("authentication failed".to_string()))?;

        String::from_utf8(opened.to_vec())
            .map_err(|e| HubError::Crypto(format!("plaintext is not utf-8: {e}")))
    }
}
