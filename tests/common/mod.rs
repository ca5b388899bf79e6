use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use veilpay::application::ledger::{PayrollLedger, RunSnapshot};
use veilpay::crypto::derivation::{self, StealthAddress};
use veilpay::crypto::envelope::MasterKey;
use veilpay::domain::asset::SettlementAsset;
use veilpay::domain::organization::Organization;
use veilpay::domain::ports::{
    BatchAuthorization, ProgressEvent, RailOutcome, RailPayment, Signer, TransferRail,
};
use veilpay::error::{PayrollError, Result};
use veilpay::infrastructure::in_memory::{
    InMemoryAuditStore, InMemoryEmployeeStore, InMemoryOrganizationStore, InMemoryRunStore,
};
use veilpay::infrastructure::signer::LocalSigner;

pub fn test_master_key() -> MasterKey {
    MasterKey::from_bytes(&[42u8; 32]).unwrap()
}

/// In-memory ledger plus a clone of the employee store, so tests can corrupt
/// records underneath the ledger.
pub fn build_ledger() -> (Arc<PayrollLedger>, InMemoryEmployeeStore) {
    let employees = InMemoryEmployeeStore::new();
    let ledger = PayrollLedger::new(
        Box::new(InMemoryOrganizationStore::new()),
        Box::new(employees.clone()),
        Box::new(InMemoryRunStore::new()),
        Box::new(InMemoryAuditStore::new()),
        test_master_key(),
    );
    (Arc::new(ledger), employees)
}

/// A rail scripted to fail payments of specific amounts. Counts invocations
/// so tests can assert that no call was made.
pub struct ScriptedRail {
    fail_amounts: Vec<Decimal>,
    calls: AtomicUsize,
}

impl ScriptedRail {
    pub fn new(fail_amounts: Vec<Decimal>) -> Self {
        Self {
            fail_amounts,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferRail for ScriptedRail {
    async fn submit_batch(
        &self,
        batch: &[RailPayment],
        _authorization: &BatchAuthorization,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<Vec<RailOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = batch.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, payment) in batch.iter().enumerate() {
            if let Some(tx) = &progress {
                let _ = tx
                    .send(ProgressEvent {
                        completed: i,
                        total,
                        current_recipient: payment.recipient,
                    })
                    .await;
            }
            if self.fail_amounts.contains(&payment.amount) {
                outcomes.push(RailOutcome {
                    payment_id: payment.payment_id,
                    success: false,
                    settlement_ref: None,
                    error: Some("recipient refused transfer".to_string()),
                });
            } else {
                outcomes.push(RailOutcome {
                    payment_id: payment.payment_id,
                    success: true,
                    settlement_ref: Some(format!("settle-{}", payment.payment_id)),
                    error: None,
                });
            }
        }
        Ok(outcomes)
    }
}

/// A rail whose every submission fails wholesale before processing anything.
pub struct RejectingRail {
    calls: AtomicUsize,
}

impl RejectingRail {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferRail for RejectingRail {
    async fn submit_batch(
        &self,
        _batch: &[RailPayment],
        _authorization: &BatchAuthorization,
        _progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<Vec<RailOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PayrollError::Rail("rail unavailable".to_string()))
    }
}

/// A signing capability that always refuses, standing in for a declined
/// wallet prompt.
pub struct RejectingSigner;

#[async_trait]
impl Signer for RejectingSigner {
    async fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
        Err(PayrollError::Signing("user rejected the prompt".to_string()))
    }
}

/// Creates an organization with `salaries.len()` active employees, each with
/// a derived stealth address, and a pending run over all of them.
pub async fn seed_run(
    ledger: &Arc<PayrollLedger>,
    salaries: &[Decimal],
) -> (Organization, Vec<uuid::Uuid>, RunSnapshot) {
    let employer = LocalSigner::generate();
    let org = ledger
        .create_organization("Acme Corp", &employer.address())
        .await
        .unwrap();

    let mut employee_ids = Vec::new();
    for (i, salary) in salaries.iter().enumerate() {
        let employee = ledger
            .add_employee(org.id, &format!("Employee {i}"), *salary, None)
            .await
            .unwrap();
        let identity = LocalSigner::generate();
        let address = derive_for(&identity, org.id).await;
        ledger
            .link_stealth_address(employee.id, address)
            .await
            .unwrap();
        employee_ids.push(employee.id);
    }

    let snapshot = ledger
        .create_run(org.id, &employee_ids, SettlementAsset::Usdc, None)
        .await
        .unwrap();
    (org, employee_ids, snapshot)
}

pub async fn derive_for(identity: &LocalSigner, org_id: uuid::Uuid) -> StealthAddress {
    derivation::derive_address(&identity.verifying_key(), org_id, identity)
        .await
        .unwrap()
}
