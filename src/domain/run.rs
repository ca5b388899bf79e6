use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::asset::SettlementAsset;
use crate::error::{PayrollError, Result};

/// Payroll run state machine.
///
/// Only `Pending` and the terminal states may persist between orchestrator
/// invocations; the intermediate states belong to a single execution attempt.
/// A run found in an intermediate state on the next attempt is stuck and must
/// be recovered, never left ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Preparing,
    AwaitingAuthorization,
    Submitting,
    Finalizing,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::PartiallyCompleted | RunStatus::Failed
        )
    }

    pub fn is_intermediate(&self) -> bool {
        !self.is_terminal() && *self != RunStatus::Pending
    }

    /// The authoritative transition table.
    pub fn can_transition(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (*self, next) {
            (Pending, Preparing) => true,
            // Resets before any external side effect (cancellation path).
            (Preparing | AwaitingAuthorization, Pending) => true,
            (Preparing, AwaitingAuthorization) => true,
            (AwaitingAuthorization, Submitting) => true,
            (Submitting, Finalizing) => true,
            (Finalizing, Completed | PartiallyCompleted) => true,
            // Any intermediate state may fail (rail rejection or recovery).
            (Preparing | AwaitingAuthorization | Submitting | Finalizing, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Preparing => "preparing",
            RunStatus::AwaitingAuthorization => "awaiting_authorization",
            RunStatus::Submitting => "submitting",
            RunStatus::Finalizing => "finalizing",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyCompleted => "partially_completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// One payment within a run, snapshotted at run creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub run_id: Uuid,
    pub employee_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    /// Opaque transfer receipt from the rail.
    pub settlement_ref: Option<String>,
    pub failure_reason: Option<String>,
}

impl Payment {
    pub fn new(run_id: Uuid, employee_id: Uuid, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            employee_id,
            amount,
            status: PaymentStatus::Pending,
            settlement_ref: None,
            failure_reason: None,
        }
    }

    /// Marks the payment completed with its settlement reference.
    ///
    /// Idempotent: re-applying the identical outcome reports `false`
    /// (unchanged). A conflicting outcome for a settled payment is rejected;
    /// an on-rail success is never downgraded.
    pub fn complete(&mut self, settlement_ref: &str) -> Result<bool> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Completed;
                self.settlement_ref = Some(settlement_ref.to_string());
                self.failure_reason = None;
                Ok(true)
            }
            PaymentStatus::Completed if self.settlement_ref.as_deref() == Some(settlement_ref) => {
                Ok(false)
            }
            _ => Err(PayrollError::Validation(format!(
                "payment {} already settled with a different outcome",
                self.id
            ))),
        }
    }

    /// Marks the payment failed with a reason. Idempotent like [`complete`];
    /// never overwrites a completed payment.
    ///
    /// [`complete`]: Payment::complete
    pub fn fail(&mut self, reason: &str) -> Result<bool> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason.to_string());
                Ok(true)
            }
            PaymentStatus::Failed if self.failure_reason.as_deref() == Some(reason) => Ok(false),
            _ => Err(PayrollError::Validation(format!(
                "payment {} already settled with a different outcome",
                self.id
            ))),
        }
    }
}

/// A payroll run: a snapshot of selected employees and their salary at
/// creation time. Later salary edits never change an existing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRun {
    pub id: Uuid,
    pub org_id: Uuid,
    pub status: RunStatus,
    pub total_amount: Decimal,
    pub asset: SettlementAsset,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl PayrollRun {
    /// Creates a run and its payments from (employee, amount) entries.
    /// The run total equals the payment sum by construction.
    pub fn new(
        org_id: Uuid,
        asset: SettlementAsset,
        entries: &[(Uuid, Decimal)],
        scheduled_at: Option<DateTime<Utc>>,
    ) -> (Self, Vec<Payment>) {
        let id = Uuid::new_v4();
        let payments: Vec<Payment> = entries
            .iter()
            .map(|(employee_id, amount)| Payment::new(id, *employee_id, *amount))
            .collect();
        let total_amount = payments.iter().map(|p| p.amount).sum();
        let run = Self {
            id,
            org_id,
            status: RunStatus::Pending,
            total_amount,
            asset,
            created_at: Utc::now(),
            scheduled_at,
            executed_at: None,
        };
        (run, payments)
    }

    /// Applies a status transition, rejecting anything outside the table.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(PayrollError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
