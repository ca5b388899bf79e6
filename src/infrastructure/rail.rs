use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::ports::{
    BatchAuthorization, ProgressEvent, RailOutcome, RailPayment, TransferRail,
};
use crate::error::Result;

/// A rehearsal rail: settles nothing, validates each amount against the
/// asset's base-unit precision, reports valid payments as completed with a
/// synthetic settlement reference, and emits progress events. Used by the
/// CLI to dry-run a payroll before pointing at the real rail.
#[derive(Default)]
pub struct DryRunRail;

impl DryRunRail {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransferRail for DryRunRail {
    async fn submit_batch(
        &self,
        batch: &[RailPayment],
        _authorization: &BatchAuthorization,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<Vec<RailOutcome>> {
        let total = batch.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, payment) in batch.iter().enumerate() {
            if let Some(tx) = &progress {
                // A full channel means the consumer stopped rendering;
                // submission must go on regardless.
                let _ = tx
                    .try_send(ProgressEvent {
                        completed: i,
                        total,
                        current_recipient: payment.recipient,
                    });
            }
            // Same per-payment validation a live rail adapter performs.
            let outcome = match payment.asset.base_units(payment.amount) {
                Ok(_) => RailOutcome {
                    payment_id: payment.payment_id,
                    success: true,
                    settlement_ref: Some(format!("dry-run-{}", payment.payment_id)),
                    error: None,
                },
                Err(e) => RailOutcome {
                    payment_id: payment.payment_id,
                    success: false,
                    settlement_ref: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
