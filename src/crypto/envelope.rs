//! Authenticated encryption for field-level secrets and key wrapping.
//!
//! Records are encrypted under a per-organization key; that key is itself
//! encrypted ("wrapped") under one process-wide master key, so the master key
//! is only needed at startup and when an organization key is created. The
//! ciphertext layout is `nonce || body`, where the body carries the
//! Poly1305 tag; nothing besides the key is required to decrypt.

use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce, aead::Aead};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{PayrollError, Result};

/// Symmetric key length (256 bits).
pub const KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305.
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key. Not serializable; `Debug` is redacted.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generates a fresh key from the OS random number generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// The process-wide master key. Read once from a provisioned secret at
/// startup and threaded through constructors; never written to storage.
#[derive(Clone)]
pub struct MasterKey(SymmetricKey);

impl MasterKey {
    /// Builds a master key from a provisioned byte string. The process must
    /// refuse to start when this fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            PayrollError::MasterKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(SymmetricKey::from_bytes(bytes)))
    }

    /// Parses a hex-encoded master key, the provisioning format used by the
    /// CLI and deployment secrets.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| PayrollError::MasterKey(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    fn key(&self) -> &SymmetricKey {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Encrypts `plaintext` under `key` with a random nonce.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let body = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| PayrollError::Validation(format!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + body.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypts a `nonce || body` ciphertext produced by [`encrypt`].
///
/// Returns `MalformedCiphertext` when the buffer cannot hold a nonce and a
/// tag, and `Integrity` when tag verification fails (wrong key or tampering).
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(PayrollError::MalformedCiphertext(format!(
            "ciphertext too short: {} bytes",
            ciphertext.len()
        )));
    }
    let (nonce, body) = ciphertext.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), body)
        .map_err(|_| PayrollError::Integrity("authentication tag mismatch".to_string()))
}

/// Encrypts a UTF-8 field value.
pub fn encrypt_str(value: &str, key: &SymmetricKey) -> Result<Vec<u8>> {
    encrypt(value.as_bytes(), key)
}

/// Decrypts a UTF-8 field value.
pub fn decrypt_str(ciphertext: &[u8], key: &SymmetricKey) -> Result<String> {
    let plaintext = decrypt(ciphertext, key)?;
    String::from_utf8(plaintext)
        .map_err(|_| PayrollError::MalformedCiphertext("field is not valid UTF-8".to_string()))
}

/// Wraps an organization key under the master key (envelope encryption).
pub fn wrap_key(inner: &SymmetricKey, master: &MasterKey) -> Result<Vec<u8>> {
    encrypt(inner.as_bytes(), master.key())
}

/// Unwraps an organization key previously wrapped with [`wrap_key`].
pub fn unwrap_key(wrapped: &[u8], master: &MasterKey) -> Result<SymmetricKey> {
    let plaintext = decrypt(wrapped, master.key())?;
    let bytes: [u8; KEY_LEN] = plaintext.as_slice().try_into().map_err(|_| {
        PayrollError::MalformedCiphertext(format!(
            "unwrapped key has {} bytes, expected {KEY_LEN}",
            plaintext.len()
        ))
    })?;
    Ok(SymmetricKey::from_bytes(bytes))
}
