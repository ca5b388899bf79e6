use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::crypto::derivation::StealthAddress;
use crate::crypto::envelope::{self, MasterKey, SymmetricKey};
use crate::domain::asset::SettlementAsset;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::employee::{Employee, EmployeeStatus};
use crate::domain::organization::Organization;
use crate::domain::ports::{
    AuditStoreBox, EmployeeStoreBox, OrganizationStoreBox, RailOutcome, RunStoreBox,
};
use crate::domain::run::{Payment, PayrollRun, RunStatus};
use crate::error::{PayrollError, Result};

/// An employee left out of a run snapshot, with the reason. A bad record
/// never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEmployee {
    pub employee_id: Uuid,
    pub reason: String,
}

/// Result of run creation: the persisted run, its payments in selection
/// order, and any employees that were skipped.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run: PayrollRun,
    pub payments: Vec<Payment>,
    pub skipped: Vec<SkippedEmployee>,
}

/// Persistence facade over the four stores plus the master key.
///
/// Sole owner of the encrypt/decrypt boundary: employee PII enters and leaves
/// storage through here, encrypted under the organization key, which is
/// itself unwrapped on demand from its master-key envelope. Run and payment
/// status mutate only through the store transition operations.
pub struct PayrollLedger {
    organizations: OrganizationStoreBox,
    employees: EmployeeStoreBox,
    runs: RunStoreBox,
    audit: AuditStoreBox,
    master_key: MasterKey,
}

impl PayrollLedger {
    pub fn new(
        organizations: OrganizationStoreBox,
        employees: EmployeeStoreBox,
        runs: RunStoreBox,
        audit: AuditStoreBox,
        master_key: MasterKey,
    ) -> Self {
        Self {
            organizations,
            employees,
            runs,
            audit,
            master_key,
        }
    }

    /// Creates an organization, generating and wrapping its symmetric key.
    /// Exactly one organization may exist per admin address; the store
    /// enforces that atomically, so concurrent setups cannot both pass.
    pub async fn create_organization(
        &self,
        name: &str,
        admin_address: &str,
    ) -> Result<Organization> {
        let org_key = SymmetricKey::generate();
        let wrapped_key = envelope::wrap_key(&org_key, &self.master_key)?;
        let org = Organization::new(name, admin_address, wrapped_key);
        self.organizations.create(org.clone()).await?;
        self.audit
            .append(AuditEntry::success(
                AuditAction::OrganizationCreated,
                admin_address,
                Some(org.id),
            ))
            .await?;
        Ok(org)
    }

    fn org_key(&self, org: &Organization) -> Result<SymmetricKey> {
        envelope::unwrap_key(&org.wrapped_key, &self.master_key)
    }

    pub async fn organization(&self, id: Uuid) -> Result<Organization> {
        self.organizations
            .get(id)
            .await?
            .ok_or_else(|| PayrollError::NotFound(format!("organization {id}")))
    }

    /// Adds an employee, encrypting name, salary and (optionally) the real
    /// wallet address under the organization key.
    pub async fn add_employee(
        &self,
        org_id: Uuid,
        name: &str,
        salary: Decimal,
        wallet: Option<&str>,
    ) -> Result<Employee> {
        if salary.is_sign_negative() {
            return Err(PayrollError::Validation(format!(
                "salary must be non-negative, got {salary}"
            )));
        }
        let org = self.organization(org_id).await?;
        let key = self.org_key(&org)?;

        let enc_name = envelope::encrypt_str(name, &key)?;
        let enc_salary = envelope::encrypt_str(&salary.to_string(), &key)?;
        let enc_wallet = wallet
            .map(|w| envelope::encrypt_str(w, &key))
            .transpose()?;

        let employee = Employee::new(org_id, enc_name, enc_salary, enc_wallet);
        self.employees.store(employee.clone()).await?;
        self.audit
            .append(AuditEntry::success(
                AuditAction::EmployeeAdded,
                &org.admin_address,
                Some(org_id),
            ))
            .await?;
        Ok(employee)
    }

    pub async fn employee(&self, id: Uuid) -> Result<Employee> {
        self.employees
            .get(id)
            .await?
            .ok_or_else(|| PayrollError::NotFound(format!("employee {id}")))
    }

    /// Caches the derived stealth receiving address. Immutable once set; the
    /// store applies the rule atomically with the read.
    pub async fn link_stealth_address(
        &self,
        employee_id: Uuid,
        address: StealthAddress,
    ) -> Result<Employee> {
        let employee = self
            .employees
            .link_stealth_address(employee_id, address)
            .await?;
        self.audit
            .append(AuditEntry::success(
                AuditAction::StealthAddressLinked,
                employee_id.to_string(),
                Some(employee.org_id),
            ))
            .await?;
        Ok(employee)
    }

    /// Re-encrypts a new salary. Runs created before the edit keep their
    /// snapshot; only future runs see the new amount.
    pub async fn update_salary(&self, employee_id: Uuid, salary: Decimal) -> Result<Employee> {
        if salary.is_sign_negative() {
            return Err(PayrollError::Validation(format!(
                "salary must be non-negative, got {salary}"
            )));
        }
        let mut employee = self.employee(employee_id).await?;
        let org = self.organization(employee.org_id).await?;
        let key = self.org_key(&org)?;
        employee.enc_salary = envelope::encrypt_str(&salary.to_string(), &key)?;
        self.employees.store(employee.clone()).await?;
        Ok(employee)
    }

    pub async fn set_employee_status(
        &self,
        employee_id: Uuid,
        status: EmployeeStatus,
    ) -> Result<Employee> {
        let mut employee = self.employee(employee_id).await?;
        employee.status = status;
        self.employees.store(employee.clone()).await?;
        Ok(employee)
    }

    pub async fn decrypted_name(&self, employee: &Employee) -> Result<String> {
        let org = self.organization(employee.org_id).await?;
        let key = self.org_key(&org)?;
        envelope::decrypt_str(&employee.enc_name, &key)
    }

    pub async fn decrypted_salary(&self, employee: &Employee) -> Result<Decimal> {
        let org = self.organization(employee.org_id).await?;
        let key = self.org_key(&org)?;
        let text = envelope::decrypt_str(&employee.enc_salary, &key)?;
        text.parse::<Decimal>().map_err(|e| {
            PayrollError::MalformedCiphertext(format!("salary field is not a decimal: {e}"))
        })
    }

    /// Creates a `Pending` run over the selected employees, snapshotting each
    /// one's current salary. Decrypts only the salary field.
    ///
    /// Employees that cannot be paid (unknown id, not active, no stealth
    /// address, or a record that fails decryption) are skipped and reported,
    /// never aborting the batch.
    pub async fn create_run(
        &self,
        org_id: Uuid,
        employee_ids: &[Uuid],
        asset: SettlementAsset,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<RunSnapshot> {
        let org = self.organization(org_id).await?;
        let key = self.org_key(&org)?;

        let mut entries = Vec::with_capacity(employee_ids.len());
        let mut skipped = Vec::new();
        for &employee_id in employee_ids {
            let Some(employee) = self.employees.get(employee_id).await? else {
                skipped.push(SkippedEmployee {
                    employee_id,
                    reason: "employee not found".to_string(),
                });
                continue;
            };
            if employee.org_id != org_id {
                skipped.push(SkippedEmployee {
                    employee_id,
                    reason: "employee belongs to another organization".to_string(),
                });
                continue;
            }
            if !employee.is_payable() {
                skipped.push(SkippedEmployee {
                    employee_id,
                    reason: "employee is not active or has no stealth address".to_string(),
                });
                continue;
            }
            let salary = match envelope::decrypt_str(&employee.enc_salary, &key)
                .and_then(|text| {
                    text.parse::<Decimal>().map_err(|e| {
                        PayrollError::MalformedCiphertext(format!(
                            "salary field is not a decimal: {e}"
                        ))
                    })
                }) {
                Ok(salary) => salary,
                Err(e @ (PayrollError::Integrity(_) | PayrollError::MalformedCiphertext(_))) => {
                    skipped.push(SkippedEmployee {
                        employee_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            entries.push((employee_id, salary));
        }

        let (run, payments) = PayrollRun::new(org_id, asset, &entries, scheduled_at);
        self.runs.store_run(run.clone()).await?;
        for payment in &payments {
            self.runs.store_payment(payment.clone()).await?;
        }
        self.audit
            .append(AuditEntry::success(
                AuditAction::RunCreated,
                &org.admin_address,
                Some(org_id),
            ))
            .await?;

        Ok(RunSnapshot {
            run,
            payments,
            skipped,
        })
    }

    pub async fn run(&self, run_id: Uuid) -> Result<PayrollRun> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| PayrollError::NotFound(format!("payroll run {run_id}")))
    }

    pub async fn payments_for_run(&self, run_id: Uuid) -> Result<Vec<Payment>> {
        self.runs.payments_for_run(run_id).await
    }

    /// The execution guard: atomically `Pending -> Preparing`, rejecting a
    /// second concurrent attempt with `AlreadyExecuting`.
    pub async fn begin_execution(&self, run_id: Uuid) -> Result<PayrollRun> {
        self.runs.begin_execution(run_id).await
    }

    pub async fn advance_run(&self, run_id: Uuid, next: RunStatus) -> Result<PayrollRun> {
        self.runs.update_run_status(run_id, next, None).await
    }

    /// Cancellation path: returns a pre-submission run to `Pending` so it can
    /// be retried without side effects.
    pub async fn reset_to_pending(&self, run_id: Uuid) -> Result<PayrollRun> {
        self.runs
            .update_run_status(run_id, RunStatus::Pending, None)
            .await
    }

    /// Moves a run into a terminal state, stamping `executed_at`.
    pub async fn complete_run(&self, run_id: Uuid, terminal: RunStatus) -> Result<PayrollRun> {
        self.runs
            .update_run_status(run_id, terminal, Some(Utc::now()))
            .await
    }

    /// Idempotent upsert of one payment outcome. Returns whether anything
    /// changed; re-applying an identical outcome is a no-op.
    pub async fn record_outcome(&self, outcome: &RailOutcome) -> Result<bool> {
        let mut payment = self
            .runs
            .get_payment(outcome.payment_id)
            .await?
            .ok_or_else(|| {
                PayrollError::NotFound(format!("payment {}", outcome.payment_id))
            })?;

        let changed = if outcome.success {
            let settlement_ref = outcome.settlement_ref.as_deref().ok_or_else(|| {
                PayrollError::Validation(format!(
                    "successful payment {} is missing a settlement reference",
                    outcome.payment_id
                ))
            })?;
            payment.complete(settlement_ref)?
        } else {
            let reason = outcome.error.as_deref().unwrap_or("unspecified rail failure");
            payment.fail(reason)?
        };

        if changed {
            self.runs.store_payment(payment).await?;
        }
        Ok(changed)
    }

    pub async fn record_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit.append(entry).await
    }

    pub async fn audit_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEntry>> {
        self.audit.entries_for_org(org_id).await
    }
}
