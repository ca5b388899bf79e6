#![cfg(feature = "storage-rocksdb")]

use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

use veilpay::application::ledger::PayrollLedger;
use veilpay::crypto::envelope::MasterKey;
use veilpay::domain::asset::SettlementAsset;
use veilpay::domain::ports::{OrganizationStore, RunStore};
use veilpay::domain::run::PayrollRun;
use veilpay::infrastructure::rocksdb::RocksDbStore;

fn ledger_over(store: RocksDbStore) -> Arc<PayrollLedger> {
    Arc::new(PayrollLedger::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store),
        MasterKey::from_bytes(&[42u8; 32]).unwrap(),
    ))
}

#[tokio::test]
async fn test_entities_survive_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("payroll_db");

    let (org_id, employee_id, run_id) = {
        let store = RocksDbStore::open(&db_path).unwrap();
        let ledger = ledger_over(store);
        let org = ledger.create_organization("Acme", "admin-1").await.unwrap();
        let employee = ledger
            .add_employee(org.id, "Jane Doe", dec!(1500), None)
            .await
            .unwrap();
        let snapshot = ledger
            .create_run(org.id, &[], SettlementAsset::Usdc, None)
            .await
            .unwrap();
        (org.id, employee.id, snapshot.run.id)
    };

    // Reopen from disk: records decrypt under the same master key.
    let store = RocksDbStore::open(&db_path).unwrap();
    let ledger = ledger_over(store);
    let org = ledger.organization(org_id).await.unwrap();
    assert_eq!(org.name, "Acme");
    let employee = ledger.employee(employee_id).await.unwrap();
    assert_eq!(ledger.decrypted_name(&employee).await.unwrap(), "Jane Doe");
    assert_eq!(
        ledger.decrypted_salary(&employee).await.unwrap(),
        dec!(1500)
    );
    assert!(ledger.run(run_id).await.is_ok());
}

#[tokio::test]
async fn test_payment_order_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("order_db");

    let (run, payments) = PayrollRun::new(
        Uuid::new_v4(),
        SettlementAsset::Sol,
        &[
            (Uuid::new_v4(), dec!(1)),
            (Uuid::new_v4(), dec!(2)),
            (Uuid::new_v4(), dec!(3)),
        ],
        None,
    );
    let run_id = run.id;
    {
        let store = RocksDbStore::open(&db_path).unwrap();
        store.store_run(run).await.unwrap();
        for p in &payments {
            store.store_payment(p.clone()).await.unwrap();
        }
    }

    let store = RocksDbStore::open(&db_path).unwrap();
    assert_eq!(store.payments_for_run(run_id).await.unwrap(), payments);
    assert!(
        OrganizationStore::get_by_admin(&store, "nobody")
            .await
            .unwrap()
            .is_none()
    );
}
