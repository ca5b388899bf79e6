use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::crypto::derivation::StealthAddress;
use crate::domain::audit::AuditEntry;
use crate::domain::employee::Employee;
use crate::domain::organization::Organization;
use crate::domain::ports::{AuditStore, EmployeeStore, OrganizationStore, RunStore};
use crate::domain::run::{Payment, PayrollRun, RunStatus};
use crate::error::{PayrollError, Result};

/// Thread-safe in-memory organization store.
#[derive(Default, Clone)]
pub struct InMemoryOrganizationStore {
    organizations: Arc<RwLock<HashMap<Uuid, Organization>>>,
}

impl InMemoryOrganizationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrganizationStore for InMemoryOrganizationStore {
    async fn store(&self, org: Organization) -> Result<()> {
        let mut organizations = self.organizations.write().await;
        organizations.insert(org.id, org);
        Ok(())
    }

    async fn create(&self, org: Organization) -> Result<()> {
        let mut organizations = self.organizations.write().await;
        if organizations
            .values()
            .any(|o| o.admin_address == org.admin_address)
        {
            return Err(PayrollError::Validation(format!(
                "an organization already exists for admin {}",
                org.admin_address
            )));
        }
        organizations.insert(org.id, org);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>> {
        let organizations = self.organizations.read().await;
        Ok(organizations.get(&id).cloned())
    }

    async fn get_by_admin(&self, admin_address: &str) -> Result<Option<Organization>> {
        let organizations = self.organizations.read().await;
        Ok(organizations
            .values()
            .find(|o| o.admin_address == admin_address)
            .cloned())
    }
}

/// Thread-safe in-memory employee store.
#[derive(Default, Clone)]
pub struct InMemoryEmployeeStore {
    employees: Arc<RwLock<HashMap<Uuid, Employee>>>,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn store(&self, employee: Employee) -> Result<()> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id, employee);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id).cloned())
    }

    async fn get_by_org(&self, org_id: Uuid) -> Result<Vec<Employee>> {
        let employees = self.employees.read().await;
        let mut matching: Vec<Employee> = employees
            .values()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }

    async fn link_stealth_address(
        &self,
        employee_id: Uuid,
        address: StealthAddress,
    ) -> Result<Employee> {
        let mut employees = self.employees.write().await;
        let employee = employees
            .get_mut(&employee_id)
            .ok_or_else(|| PayrollError::NotFound(format!("employee {employee_id}")))?;
        employee.link_stealth_address(address)?;
        Ok(employee.clone())
    }
}

#[derive(Default)]
struct RunState {
    runs: HashMap<Uuid, PayrollRun>,
    payments: HashMap<Uuid, Payment>,
    // Payment ids per run, in creation order.
    run_index: HashMap<Uuid, Vec<Uuid>>,
}

/// Thread-safe in-memory run/payment store. The single write lock serializes
/// status transitions per run, making `begin_execution` an atomic guard.
#[derive(Default, Clone)]
pub struct InMemoryRunStore {
    state: Arc<RwLock<RunState>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn store_run(&self, run: PayrollRun) -> Result<()> {
        let mut state = self.state.write().await;
        state.run_index.entry(run.id).or_default();
        state.runs.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PayrollRun>> {
        let state = self.state.read().await;
        Ok(state.runs.get(&id).cloned())
    }

    async fn begin_execution(&self, run_id: Uuid) -> Result<PayrollRun> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| PayrollError::NotFound(format!("payroll run {run_id}")))?;
        if run.status != RunStatus::Pending {
            return Err(PayrollError::AlreadyExecuting(run_id));
        }
        run.transition(RunStatus::Preparing)?;
        Ok(run.clone())
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        next: RunStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<PayrollRun> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| PayrollError::NotFound(format!("payroll run {run_id}")))?;
        run.transition(next)?;
        if executed_at.is_some() {
            run.executed_at = executed_at;
        }
        Ok(run.clone())
    }

    async fn store_payment(&self, payment: Payment) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state.run_index.entry(payment.run_id).or_default();
        if !index.contains(&payment.id) {
            index.push(payment.id);
        }
        state.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn payments_for_run(&self, run_id: Uuid) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let ids = state.run_index.get(&run_id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.payments.get(id).cloned())
            .collect())
    }
}

/// Append-only in-memory audit store.
#[derive(Default, Clone)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn entries_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.org_id == Some(org_id))
            .cloned()
            .collect())
    }
}
