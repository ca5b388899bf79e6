use async_trait::async_trait;
use ed25519_dalek::{Signer as DalekSigner, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::domain::ports::Signer;
use crate::error::Result;

/// An in-process Ed25519 signer for the CLI rehearsal and tests. Production
/// deployments hand the `Signer` port to a wallet or HSM instead.
pub struct LocalSigner {
    signing_key: SigningKey,
}

impl LocalSigner {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex form of the public key, used as an admin address.
    pub fn address(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}
