use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{PayrollError, Result};

/// Settlement assets the rail supports. A closed enumeration resolved once at
/// the boundary, so the rest of the crate never branches on asset strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementAsset {
    Usdc,
    Sol,
}

impl SettlementAsset {
    /// Decimal precision of one whole unit.
    pub fn decimals(&self) -> u32 {
        match self {
            SettlementAsset::Usdc => 6,
            SettlementAsset::Sol => 9,
        }
    }

    /// Canonical identifier used on the wire and in persisted records.
    pub fn canonical_id(&self) -> &'static str {
        match self {
            SettlementAsset::Usdc => "USDC",
            SettlementAsset::Sol => "SOL",
        }
    }

    /// Converts a decimal amount to integer base units for the rail.
    /// Rejects negative amounts and amounts with sub-unit remainders.
    pub fn base_units(&self, amount: Decimal) -> Result<u64> {
        if amount.is_sign_negative() {
            return Err(PayrollError::Validation(format!(
                "amount must be non-negative, got {amount}"
            )));
        }
        let scaled = amount
            .checked_mul(Decimal::from(10u64.pow(self.decimals())))
            .ok_or_else(|| PayrollError::Validation(format!("amount {amount} overflows")))?;
        if scaled.fract() != Decimal::ZERO {
            return Err(PayrollError::Validation(format!(
                "amount {amount} is below {} base-unit precision",
                self.canonical_id()
            )));
        }
        scaled
            .trunc()
            .to_u64()
            .ok_or_else(|| PayrollError::Validation(format!("amount {amount} overflows u64")))
    }
}

impl FromStr for SettlementAsset {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USDC" => Ok(SettlementAsset::Usdc),
            "SOL" => Ok(SettlementAsset::Sol),
            other => Err(PayrollError::Validation(format!(
                "unsupported settlement asset: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SettlementAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_id())
    }
}
