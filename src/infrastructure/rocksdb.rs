use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::crypto::derivation::StealthAddress;
use crate::domain::audit::AuditEntry;
use crate::domain::employee::Employee;
use crate::domain::organization::Organization;
use crate::domain::ports::{AuditStore, EmployeeStore, OrganizationStore, RunStore};
use crate::domain::run::{Payment, PayrollRun, RunStatus};
use crate::error::{PayrollError, Result};

/// Column family for organizations.
pub const CF_ORGANIZATIONS: &str = "organizations";
/// Column family for employee records (PII fields already encrypted).
pub const CF_EMPLOYEES: &str = "employees";
/// Column family for payroll runs.
pub const CF_RUNS: &str = "runs";
/// Column family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column family mapping a run id to its payment ids in creation order.
pub const CF_RUN_INDEX: &str = "run_index";
/// Column family for the append-only audit trail.
pub const CF_AUDIT: &str = "audit";

/// Persistent store backed by RocksDB, one column family per entity.
///
/// `Clone` shares the underlying `Arc<DB>`. Every read-modify-write over
/// shared state (run transitions, the run index, admin-uniqueness checks,
/// stealth-address linking) is serialized behind one mutex, so the
/// `begin_execution` guard and the uniqueness invariants stay atomic under
/// concurrent executions.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database at `path`, ensuring all column families
    /// exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_ORGANIZATIONS,
            CF_EMPLOYEES,
            CF_RUNS,
            CF_PAYMENTS,
            CF_RUN_INDEX,
            CF_AUDIT,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| PayrollError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PayrollError::Storage(format!("column family {name} not found")))
    }

    fn put<T: serde::Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db
            .put_cf(self.cf(cf)?, key, bytes)
            .map_err(|e| PayrollError::Storage(e.to_string()))
    }

    fn read<T: serde::de::DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let bytes = self
            .db
            .get_cf(self.cf(cf)?, key)
            .map_err(|e| PayrollError::Storage(e.to_string()))?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: serde::de::DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| PayrollError::Storage(e.to_string()))?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn run_payment_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .read::<Vec<Uuid>>(CF_RUN_INDEX, run_id.as_bytes())?
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrganizationStore for RocksDbStore {
    async fn store(&self, org: Organization) -> Result<()> {
        self.put(CF_ORGANIZATIONS, org.id.as_bytes(), &org)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>> {
        self.read(CF_ORGANIZATIONS, id.as_bytes())
    }

    async fn create(&self, org: Organization) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let organizations: Vec<Organization> = self.scan(CF_ORGANIZATIONS)?;
        if organizations
            .iter()
            .any(|o| o.admin_address == org.admin_address)
        {
            return Err(PayrollError::Validation(format!(
                "an organization already exists for admin {}",
                org.admin_address
            )));
        }
        self.put(CF_ORGANIZATIONS, org.id.as_bytes(), &org)
    }

    async fn get_by_admin(&self, admin_address: &str) -> Result<Option<Organization>> {
        let organizations: Vec<Organization> = self.scan(CF_ORGANIZATIONS)?;
        Ok(organizations
            .into_iter()
            .find(|o| o.admin_address == admin_address))
    }
}

#[async_trait]
impl EmployeeStore for RocksDbStore {
    async fn store(&self, employee: Employee) -> Result<()> {
        self.put(CF_EMPLOYEES, employee.id.as_bytes(), &employee)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Employee>> {
        self.read(CF_EMPLOYEES, id.as_bytes())
    }

    async fn get_by_org(&self, org_id: Uuid) -> Result<Vec<Employee>> {
        let mut employees: Vec<Employee> = self.scan(CF_EMPLOYEES)?;
        employees.retain(|e| e.org_id == org_id);
        employees.sort_by_key(|e| e.created_at);
        Ok(employees)
    }

    async fn link_stealth_address(
        &self,
        employee_id: Uuid,
        address: StealthAddress,
    ) -> Result<Employee> {
        let _guard = self.write_lock.lock().await;
        let mut employee: Employee = self
            .read(CF_EMPLOYEES, employee_id.as_bytes())?
            .ok_or_else(|| PayrollError::NotFound(format!("employee {employee_id}")))?;
        employee.link_stealth_address(address)?;
        self.put(CF_EMPLOYEES, employee_id.as_bytes(), &employee)?;
        Ok(employee)
    }
}

#[async_trait]
impl RunStore for RocksDbStore {
    async fn store_run(&self, run: PayrollRun) -> Result<()> {
        self.put(CF_RUNS, run.id.as_bytes(), &run)
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PayrollRun>> {
        self.read(CF_RUNS, id.as_bytes())
    }

    async fn begin_execution(&self, run_id: Uuid) -> Result<PayrollRun> {
        let _guard = self.write_lock.lock().await;
        let mut run: PayrollRun = self
            .read(CF_RUNS, run_id.as_bytes())?
            .ok_or_else(|| PayrollError::NotFound(format!("payroll run {run_id}")))?;
        if run.status != RunStatus::Pending {
            return Err(PayrollError::AlreadyExecuting(run_id));
        }
        run.transition(RunStatus::Preparing)?;
        self.put(CF_RUNS, run_id.as_bytes(), &run)?;
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        next: RunStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<PayrollRun> {
        let _guard = self.write_lock.lock().await;
        let mut run: PayrollRun = self
            .read(CF_RUNS, run_id.as_bytes())?
            .ok_or_else(|| PayrollError::NotFound(format!("payroll run {run_id}")))?;
        run.transition(next)?;
        if executed_at.is_some() {
            run.executed_at = executed_at;
        }
        self.put(CF_RUNS, run_id.as_bytes(), &run)?;
        Ok(run)
    }

    async fn store_payment(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.run_payment_ids(payment.run_id)?;
        if !index.contains(&payment.id) {
            index.push(payment.id);
            self.put(CF_RUN_INDEX, payment.run_id.as_bytes(), &index)?;
        }
        self.put(CF_PAYMENTS, payment.id.as_bytes(), &payment)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn payments_for_run(&self, run_id: Uuid) -> Result<Vec<Payment>> {
        let mut payments = Vec::new();
        for id in self.run_payment_ids(run_id)? {
            if let Some(payment) = self.read(CF_PAYMENTS, id.as_bytes())? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }
}

#[async_trait]
impl AuditStore for RocksDbStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        // Zero-padded so keys sort lexicographically in timestamp order and
        // iteration yields chronological entries.
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let key = format!("{nanos:020}:{}", entry.id);
        self.put(CF_AUDIT, key.as_bytes(), &entry)
    }

    async fn entries_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self.scan(CF_AUDIT)?;
        entries.retain(|e| e.org_id == Some(org_id));
        Ok(entries)
    }
}
