//! Deterministic stealth-address derivation.
//!
//! An employee proves ownership of a receiving address by signing a canonical
//! authorization message with their real identity key. The signature bytes
//! are hashed into an Ed25519 seed, so the same (owner key, organization)
//! pair always reproduces the same keypair on any device, while nobody
//! without the owner's private key can derive it. Only the public half ever
//! leaves this module; the derived private key is never persisted.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::ports::Signer;
use crate::error::{PayrollError, Result};

/// Version of the derivation scheme, bound into every authorization message.
/// A future scheme change bumps this so old derivations cannot collide.
pub const STEALTH_DERIVATION_VERSION: u8 = 1;

const DOMAIN_TAG: &[u8] = b"veilpay/stealth-address";

/// A derived stealth receiving address (Ed25519 public key, hex encoded in
/// text form). Carries no identity information and is stored in plaintext.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StealthAddress(pub [u8; 32]);

impl StealthAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| PayrollError::Validation(format!("invalid address hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PayrollError::Validation("address must be 32 bytes".to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for StealthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for StealthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StealthAddress({})", self.to_hex())
    }
}

impl Serialize for StealthAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StealthAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Builds the canonical, versioned message the owner must sign to authorize
/// derivation for one organization.
///
/// Layout is fixed-width: `tag || version || owner key (32) || org id (16)`,
/// so distinct inputs can never produce the same byte string.
pub fn build_authorization_message(owner: &VerifyingKey, organization_id: Uuid) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_TAG.len() + 1 + 32 + 16);
    message.extend_from_slice(DOMAIN_TAG);
    message.push(STEALTH_DERIVATION_VERSION);
    message.extend_from_slice(owner.as_bytes());
    message.extend_from_slice(organization_id.as_bytes());
    message
}

/// Expands signature bytes into a full keypair: SHA-256 of the signature is
/// the 32-byte Ed25519 seed. Pure function; identical input, identical keys.
pub fn derive_keypair(signature: &[u8]) -> SigningKey {
    let seed: [u8; 32] = Sha256::digest(signature).into();
    SigningKey::from_bytes(&seed)
}

/// Derives the stealth receiving address for (owner, organization).
///
/// The signing capability stays with the identity holder; this function sees
/// signature bytes, never the owner's private key, and returns only the
/// public half of the derived keypair.
pub async fn derive_address(
    owner: &VerifyingKey,
    organization_id: Uuid,
    signer: &dyn Signer,
) -> Result<StealthAddress> {
    let message = build_authorization_message(owner, organization_id);
    let signature = signer.sign(&message).await?;
    let keypair = derive_keypair(&signature);
    Ok(StealthAddress::from_bytes(
        keypair.verifying_key().to_bytes(),
    ))
}
