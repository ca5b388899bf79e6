use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use veilpay::application::ledger::PayrollLedger;
use veilpay::application::orchestrator::PayrollOrchestrator;
use veilpay::crypto::derivation;
use veilpay::crypto::envelope::MasterKey;
use veilpay::domain::asset::SettlementAsset;
use veilpay::domain::ports::{
    AuditStoreBox, EmployeeStoreBox, OrganizationStoreBox, ProgressEvent, RunStoreBox,
};
use veilpay::infrastructure::in_memory::{
    InMemoryAuditStore, InMemoryEmployeeStore, InMemoryOrganizationStore, InMemoryRunStore,
};
use veilpay::infrastructure::rail::DryRunRail;
use veilpay::infrastructure::signer::LocalSigner;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payroll instruction JSON file
    input: PathBuf,

    /// File containing the hex-encoded 256-bit master key
    #[arg(long)]
    master_key_file: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct Instructions {
    organization: String,
    asset: String,
    employees: Vec<EmployeeEntry>,
}

#[derive(Deserialize)]
struct EmployeeEntry {
    name: String,
    salary: Decimal,
}

type Stores = (
    OrganizationStoreBox,
    EmployeeStoreBox,
    RunStoreBox,
    AuditStoreBox,
);

fn in_memory_stores() -> Stores {
    (
        Box::new(InMemoryOrganizationStore::new()),
        Box::new(InMemoryEmployeeStore::new()),
        Box::new(InMemoryRunStore::new()),
        Box::new(InMemoryAuditStore::new()),
    )
}

fn build_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = veilpay::infrastructure::rocksdb::RocksDbStore::open(path)
                .into_diagnostic()?;
            Ok((
                Box::new(store.clone()),
                Box::new(store.clone()),
                Box::new(store.clone()),
                Box::new(store),
            ))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // No request is served without a verified master key.
    let key_hex = std::fs::read_to_string(&cli.master_key_file).into_diagnostic()?;
    let master_key = MasterKey::from_hex(&key_hex).into_diagnostic()?;

    let instructions: Instructions =
        serde_json::from_str(&std::fs::read_to_string(&cli.input).into_diagnostic()?)
            .into_diagnostic()?;
    let asset: SettlementAsset = instructions.asset.parse().into_diagnostic()?;

    let (organizations, employees, runs, audit) = build_stores(cli.db_path)?;
    let ledger = Arc::new(PayrollLedger::new(
        organizations,
        employees,
        runs,
        audit,
        master_key,
    ));

    // The employer key would live in a wallet; a local one rehearses the flow.
    let employer = LocalSigner::generate();
    let org = ledger
        .create_organization(&instructions.organization, &employer.address())
        .await
        .into_diagnostic()?;

    let mut employee_ids = Vec::with_capacity(instructions.employees.len());
    for entry in &instructions.employees {
        let employee = ledger
            .add_employee(org.id, &entry.name, entry.salary, None)
            .await
            .into_diagnostic()?;
        // Each employee derives their receiving address with their own
        // identity key; a throwaway key stands in for it here.
        let identity = LocalSigner::generate();
        let address =
            derivation::derive_address(&identity.verifying_key(), org.id, &identity)
                .await
                .into_diagnostic()?;
        ledger
            .link_stealth_address(employee.id, address)
            .await
            .into_diagnostic()?;
        employee_ids.push(employee.id);
    }

    let snapshot = ledger
        .create_run(org.id, &employee_ids, asset, None)
        .await
        .into_diagnostic()?;
    for skipped in &snapshot.skipped {
        eprintln!(
            "skipping employee {}: {}",
            skipped.employee_id, skipped.reason
        );
    }

    let orchestrator = PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(DryRunRail::new()));

    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressEvent>(32);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            eprintln!(
                "submitting {}/{} -> {}",
                event.completed + 1,
                event.total,
                event.current_recipient
            );
        }
    });

    let status = orchestrator
        .execute_run(snapshot.run.id, &employer, Some(progress_tx))
        .await
        .into_diagnostic()?;
    progress_task.await.map_err(|e| miette!("{e}"))?;

    let payments = ledger
        .payments_for_run(snapshot.run.id)
        .await
        .into_diagnostic()?;
    let report = serde_json::json!({
        "run_id": snapshot.run.id,
        "status": status,
        "total_amount": snapshot.run.total_amount,
        "asset": asset,
        "payments": payments,
    });
    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);

    Ok(())
}
