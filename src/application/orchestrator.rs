use std::sync::Arc;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::ledger::PayrollLedger;
use crate::domain::asset::SettlementAsset;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::fees::{FeeBreakdown, FeeSchedule, FeeTier};
use crate::domain::ports::{
    BatchAuthorization, ProgressEvent, RailOutcome, RailPayment, Signer, TransferRail,
};
use crate::domain::run::{PaymentStatus, RunStatus};
use crate::error::{PayrollError, Result};

const AUTHORIZATION_TAG: &[u8] = b"veilpay/batch-authorization/v1";

/// Output of [`PayrollOrchestrator::prepare`]: the ordered recipient/amount
/// pairs and the run's settlement asset, ready for one rail submission,
/// plus the platform rake per payment. Fees are invoiced to the paying
/// organization, not deducted from what reaches an employee.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub run_id: Uuid,
    pub asset: SettlementAsset,
    pub items: Vec<RailPayment>,
    pub fees: Vec<FeeBreakdown>,
    pub fee_total: Decimal,
}

/// The saga controller.
///
/// Drives a run `Pending -> Preparing -> AwaitingAuthorization -> Submitting
/// -> Finalizing -> terminal`, with every status mutation going through the
/// ledger's transition operations. A rejected authorization is a no-op
/// cancellation (run back to `Pending`); per-payment rail failures are
/// recorded, never retried here; finalize is safely repeatable.
pub struct PayrollOrchestrator {
    ledger: Arc<PayrollLedger>,
    rail: Arc<dyn TransferRail>,
    fee_schedule: FeeSchedule,
    fee_tier: FeeTier,
}

impl PayrollOrchestrator {
    pub fn new(ledger: Arc<PayrollLedger>, rail: Arc<dyn TransferRail>) -> Self {
        Self {
            ledger,
            rail,
            fee_schedule: FeeSchedule::default(),
            fee_tier: FeeTier::Standard,
        }
    }

    pub fn with_fees(mut self, schedule: FeeSchedule, tier: FeeTier) -> Self {
        self.fee_schedule = schedule;
        self.fee_tier = tier;
        self
    }

    /// Loads the run and builds the batch, taking the execution guard.
    ///
    /// Fails with `NotFound` for unknown runs, `AlreadyExecuting` when
    /// another execution holds the guard, and `EmptyBatch` (after returning
    /// the run to `Pending`) when there are zero payments.
    pub async fn prepare(&self, run_id: Uuid) -> Result<PreparedBatch> {
        let run = self.ledger.begin_execution(run_id).await?;

        let payments = self.ledger.payments_for_run(run_id).await?;
        if payments.is_empty() {
            self.ledger.reset_to_pending(run_id).await?;
            return Err(PayrollError::EmptyBatch(run_id));
        }

        let mut items = Vec::with_capacity(payments.len());
        let mut fees = Vec::with_capacity(payments.len());
        let mut fee_total = Decimal::ZERO;
        for payment in &payments {
            let employee = match self.ledger.employee(payment.employee_id).await {
                Ok(employee) => employee,
                Err(e) => {
                    self.ledger.reset_to_pending(run_id).await?;
                    return Err(e);
                }
            };
            let Some(recipient) = employee.stealth_address else {
                self.ledger.reset_to_pending(run_id).await?;
                return Err(PayrollError::Validation(format!(
                    "employee {} has no stealth address",
                    employee.id
                )));
            };
            let breakdown = match self.fee_schedule.compute(payment.amount, self.fee_tier) {
                Ok(breakdown) => breakdown,
                Err(e) => {
                    self.ledger.reset_to_pending(run_id).await?;
                    return Err(e);
                }
            };
            fee_total += breakdown.fee;
            fees.push(breakdown);
            items.push(RailPayment {
                payment_id: payment.id,
                recipient,
                amount: payment.amount,
                asset: run.asset,
            });
        }
        tracing::debug!(run_id = %run_id, %fee_total, "batch prepared");

        Ok(PreparedBatch {
            run_id,
            asset: run.asset,
            items,
            fees,
            fee_total,
        })
    }

    /// Digest covering the run, its asset and every payment, so one signature
    /// authorizes the entire batch.
    pub fn batch_digest(batch: &PreparedBatch) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(AUTHORIZATION_TAG);
        hasher.update(batch.run_id.as_bytes());
        hasher.update(batch.asset.canonical_id().as_bytes());
        for item in &batch.items {
            hasher.update(item.payment_id.as_bytes());
            hasher.update(item.recipient.0);
            hasher.update(item.amount.to_string().as_bytes());
            hasher.update([0u8]);
        }
        hasher.finalize().into()
    }

    /// Obtains the paying party's single authorization for the batch.
    ///
    /// A signer failure is treated as cancellation: the run goes back to
    /// `Pending` with no side effects and `AuthorizationRejected` is
    /// surfaced, so the run can be retried.
    pub async fn authorize(
        &self,
        batch: &PreparedBatch,
        signer: &dyn Signer,
    ) -> Result<BatchAuthorization> {
        self.ledger
            .advance_run(batch.run_id, RunStatus::AwaitingAuthorization)
            .await?;

        let digest = Self::batch_digest(batch);
        match signer.sign(&digest).await {
            Ok(signature) => Ok(BatchAuthorization {
                run_id: batch.run_id,
                digest,
                signature,
            }),
            Err(e) => {
                self.ledger.reset_to_pending(batch.run_id).await?;
                Err(PayrollError::AuthorizationRejected(e.to_string()))
            }
        }
    }

    /// Submits the full batch to the rail once.
    ///
    /// A whole-batch rail error (nothing processed) marks the run `Failed`;
    /// per-payment failures come back as outcomes and are not retried here.
    /// Re-batching the failed subset is the caller's decision.
    pub async fn submit(
        &self,
        batch: &PreparedBatch,
        authorization: &BatchAuthorization,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<Vec<RailOutcome>> {
        let run = self
            .ledger
            .advance_run(batch.run_id, RunStatus::Submitting)
            .await?;
        let org = self.ledger.organization(run.org_id).await?;

        match self
            .rail
            .submit_batch(&batch.items, authorization, progress)
            .await
        {
            Ok(outcomes) => {
                self.ledger
                    .record_audit(AuditEntry::success(
                        AuditAction::RunExecuted,
                        &org.admin_address,
                        Some(run.org_id),
                    ))
                    .await?;
                Ok(outcomes)
            }
            Err(e) => {
                tracing::warn!(run_id = %batch.run_id, error = %e, "rail rejected the batch");
                self.ledger
                    .advance_run(batch.run_id, RunStatus::Failed)
                    .await?;
                self.ledger
                    .record_audit(AuditEntry::failure(
                        AuditAction::RunExecuted,
                        &org.admin_address,
                        Some(run.org_id),
                        e.to_string(),
                    ))
                    .await?;
                Err(PayrollError::Rail(e.to_string()))
            }
        }
    }

    /// Writes per-payment outcomes to the ledger and classifies the run.
    ///
    /// Idempotent: recording is an upsert by payment id, the terminal status
    /// is recomputed from persisted payments, and the audit entry is appended
    /// only when the run actually transitions. A storage error here is
    /// surfaced for retry and never reclassifies an on-rail success.
    pub async fn finalize(&self, run_id: Uuid, results: &[RailOutcome]) -> Result<RunStatus> {
        let run = self.ledger.run(run_id).await?;

        for outcome in results {
            self.ledger.record_outcome(outcome).await?;
        }

        if run.status.is_terminal() {
            return Ok(run.status);
        }
        if run.status == RunStatus::Submitting {
            self.ledger.advance_run(run_id, RunStatus::Finalizing).await?;
        }

        let payments = self.ledger.payments_for_run(run_id).await?;
        let completed = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .count();
        let terminal = if completed == payments.len() {
            RunStatus::Completed
        } else if completed == 0 {
            RunStatus::Failed
        } else {
            RunStatus::PartiallyCompleted
        };

        let final_run = self.ledger.complete_run(run_id, terminal).await?;
        let org = self.ledger.organization(final_run.org_id).await?;
        self.ledger
            .record_audit(AuditEntry::success(
                AuditAction::RunFinalized,
                &org.admin_address,
                Some(final_run.org_id),
            ))
            .await?;
        Ok(final_run.status)
    }

    /// The full saga: prepare, authorize, submit, finalize.
    pub async fn execute_run(
        &self,
        run_id: Uuid,
        signer: &dyn Signer,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<RunStatus> {
        let batch = self.prepare(run_id).await?;
        let authorization = self.authorize(&batch, signer).await?;
        let outcomes = self.submit(&batch, &authorization, progress).await?;
        self.finalize(run_id, &outcomes).await
    }

    /// Recovers a run stranded in an intermediate state by a died execution
    /// attempt.
    ///
    /// Before submission nothing external has happened, so the run simply
    /// returns to `Pending`. From `Submitting` or `Finalizing` onward,
    /// transfers may already have settled irreversibly: the run is marked
    /// `Failed` and reconciliation against the rail's settled-transfer record
    /// is required before re-batching.
    pub async fn recover(&self, run_id: Uuid) -> Result<RunStatus> {
        let run = self.ledger.run(run_id).await?;
        if !run.status.is_intermediate() {
            return Ok(run.status);
        }

        let org = self.ledger.organization(run.org_id).await?;
        match run.status {
            RunStatus::Preparing | RunStatus::AwaitingAuthorization => {
                let run = self.ledger.reset_to_pending(run_id).await?;
                self.ledger
                    .record_audit(AuditEntry::success(
                        AuditAction::RunRecovered,
                        &org.admin_address,
                        Some(run.org_id),
                    ))
                    .await?;
                Ok(run.status)
            }
            _ => {
                tracing::warn!(
                    run_id = %run_id,
                    status = %run.status,
                    "run interrupted after submission; reconcile against the rail before re-batching"
                );
                let run = self.ledger.complete_run(run_id, RunStatus::Failed).await?;
                self.ledger
                    .record_audit(AuditEntry::failure(
                        AuditAction::RunRecovered,
                        &org.admin_address,
                        Some(run.org_id),
                        "interrupted after submission; outcomes may be unrecorded",
                    ))
                    .await?;
                Ok(run.status)
            }
        }
    }
}
