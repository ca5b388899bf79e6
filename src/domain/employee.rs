use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::derivation::StealthAddress;
use crate::error::{PayrollError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Paused,
    Terminated,
}

/// An employee record. Name, salary and real wallet address are ciphertext
/// under the organization key; the stealth receiving address is public, it
/// carries no identity information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub org_id: Uuid,
    pub enc_name: Vec<u8>,
    /// Salary serialized as decimal text before encryption.
    pub enc_salary: Vec<u8>,
    pub enc_wallet: Option<Vec<u8>>,
    pub stealth_address: Option<StealthAddress>,
    pub status: EmployeeStatus,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        org_id: Uuid,
        enc_name: Vec<u8>,
        enc_salary: Vec<u8>,
        enc_wallet: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            enc_name,
            enc_salary,
            enc_wallet,
            stealth_address: None,
            status: EmployeeStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Sets the stealth receiving address. Immutable once set: relinking the
    /// identical address is a no-op (it is reproducible by re-derivation),
    /// linking a different one is rejected.
    pub fn link_stealth_address(&mut self, address: StealthAddress) -> Result<()> {
        match self.stealth_address {
            None => {
                self.stealth_address = Some(address);
                Ok(())
            }
            Some(existing) if existing == address => Ok(()),
            Some(_) => Err(PayrollError::Validation(format!(
                "employee {} already has a stealth address",
                self.id
            ))),
        }
    }

    pub fn is_payable(&self) -> bool {
        self.status == EmployeeStatus::Active && self.stealth_address.is_some()
    }
}
