//! Port traits at the boundary of the core: persistence stores, the external
//! signing capability, and the private transfer rail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::crypto::derivation::StealthAddress;
use crate::domain::asset::SettlementAsset;
use crate::domain::audit::AuditEntry;
use crate::domain::employee::Employee;
use crate::domain::organization::Organization;
use crate::domain::run::{Payment, PayrollRun, RunStatus};
use crate::error::Result;

pub type OrganizationStoreBox = Box<dyn OrganizationStore>;
pub type EmployeeStoreBox = Box<dyn EmployeeStore>;
pub type RunStoreBox = Box<dyn RunStore>;
pub type AuditStoreBox = Box<dyn AuditStore>;

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn store(&self, org: Organization) -> Result<()>;

    /// Inserts a new organization. The admin-uniqueness check and the insert
    /// happen under one write lock, so two concurrent setups for the same
    /// admin cannot both pass; the loser gets a `Validation` error.
    async fn create(&self, org: Organization) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Organization>>;
    async fn get_by_admin(&self, admin_address: &str) -> Result<Option<Organization>>;
}

#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn store(&self, employee: Employee) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Employee>>;
    async fn get_by_org(&self, org_id: Uuid) -> Result<Vec<Employee>>;

    /// Applies the immutable-once-set rule atomically with the read, so
    /// concurrent link attempts cannot overwrite each other's address.
    async fn link_stealth_address(
        &self,
        employee_id: Uuid,
        address: StealthAddress,
    ) -> Result<Employee>;
}

/// Store for runs and payments. Status mutations go exclusively through
/// [`begin_execution`] and [`update_run_status`], which the implementation
/// must serialize per run so concurrent transitions cannot race.
///
/// [`begin_execution`]: RunStore::begin_execution
/// [`update_run_status`]: RunStore::update_run_status
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn store_run(&self, run: PayrollRun) -> Result<()>;
    async fn get_run(&self, id: Uuid) -> Result<Option<PayrollRun>>;

    /// The status guard: atomically moves a `Pending` run to `Preparing`.
    /// Rejects with `AlreadyExecuting` for any other status, which doubles as
    /// the at-most-one-concurrent-execution-per-run lock.
    async fn begin_execution(&self, run_id: Uuid) -> Result<PayrollRun>;

    /// Applies a transition through the domain table, optionally stamping
    /// `executed_at`. Serialized per run by the implementation.
    async fn update_run_status(
        &self,
        run_id: Uuid,
        next: RunStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<PayrollRun>;

    async fn store_payment(&self, payment: Payment) -> Result<()>;
    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>>;

    /// Payments of a run in creation order.
    async fn payments_for_run(&self, run_id: Uuid) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
    async fn entries_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEntry>>;
}

/// External signing capability, owned by whoever holds a real private key:
/// the employee during address derivation, the employer for batch
/// authorization. This core never holds or requests the raw private key.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// One payment as handed to the rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailPayment {
    pub payment_id: Uuid,
    pub recipient: StealthAddress,
    pub amount: Decimal,
    pub asset: SettlementAsset,
}

/// Per-payment result reported by the rail. Every submitted payment yields
/// exactly one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailOutcome {
    pub payment_id: Uuid,
    pub success: bool,
    pub settlement_ref: Option<String>,
    pub error: Option<String>,
}

/// Incremental progress during batch submission, delivered over a bounded
/// channel so callers can render it without this core assuming an ordering
/// across recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub current_recipient: StealthAddress,
}

/// The employer's single authorization over an entire batch: one signature
/// over a digest covering the run, asset and every payment.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAuthorization {
    pub run_id: Uuid,
    pub digest: [u8; 32],
    pub signature: Vec<u8>,
}

/// The external privacy-preserving transfer rail, consumed as an opaque unit
/// of work. Its internal cryptography (proofs, relaying, settlement) is out
/// of scope here.
#[async_trait]
pub trait TransferRail: Send + Sync {
    async fn submit_batch(
        &self,
        batch: &[RailPayment],
        authorization: &BatchAuthorization,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<Vec<RailOutcome>>;
}
