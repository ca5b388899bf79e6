use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PayrollError, Result};

/// Pricing tiers with fixed percentage rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Standard,
    Growth,
    Enterprise,
}

impl FeeTier {
    /// Rake rate in percent.
    pub fn rate_percent(&self) -> Decimal {
        match self {
            FeeTier::Standard => dec!(1.0),
            FeeTier::Growth => dec!(0.5),
            FeeTier::Enterprise => dec!(0.25),
        }
    }
}

/// Result of a fee computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub fee_rate_percent: Decimal,
}

/// Fee configuration: an absolute floor applied whenever the computed fee is
/// positive but below it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub minimum_fee: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            minimum_fee: dec!(0.10),
        }
    }
}

impl FeeSchedule {
    /// Computes rake and net amount for one payment.
    ///
    /// Total over all non-negative amounts and monotonic in amount for a
    /// fixed tier. Net amount is clamped at zero when the floor exceeds the
    /// payment itself.
    pub fn compute(&self, amount: Decimal, tier: FeeTier) -> Result<FeeBreakdown> {
        if amount.is_sign_negative() {
            return Err(PayrollError::Validation(format!(
                "fee amount must be non-negative, got {amount}"
            )));
        }
        let rate = tier.rate_percent();
        let mut fee = amount * rate / dec!(100);
        if fee > Decimal::ZERO && fee < self.minimum_fee {
            fee = self.minimum_fee;
        }
        let net_amount = (amount - fee).max(Decimal::ZERO);
        Ok(FeeBreakdown {
            fee,
            net_amount,
            fee_rate_percent: rate,
        })
    }
}
