use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A paying organization (tenant). Employee records under it are encrypted
/// with its own symmetric key, stored here only in wrapped form. The wrapped
/// key is never rotated in place; rotation would require re-encrypting every
/// dependent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// Hex-encoded public address of the administrator. Exactly one
    /// organization may exist per admin address.
    pub admin_address: String,
    /// Ciphertext of the per-organization key under the master key.
    pub wrapped_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, admin_address: impl Into<String>, wrapped_key: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            admin_address: admin_address.into(),
            wrapped_key,
            created_at: Utc::now(),
        }
    }
}
