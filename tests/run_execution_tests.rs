mod common;

use common::{RejectingRail, RejectingSigner, ScriptedRail, build_ledger, seed_run};
use rust_decimal_macros::dec;
use std::sync::Arc;
use veilpay::application::orchestrator::PayrollOrchestrator;
use veilpay::domain::audit::AuditAction;
use veilpay::domain::fees::{FeeSchedule, FeeTier};
use veilpay::domain::run::{PaymentStatus, RunStatus};
use veilpay::error::PayrollError;
use veilpay::infrastructure::signer::LocalSigner;

#[tokio::test]
async fn test_partial_completion_end_to_end() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100), dec!(200), dec!(300)]).await;
    assert_eq!(snapshot.run.total_amount, dec!(600));

    let rail = Arc::new(ScriptedRail::new(vec![dec!(200)]));
    let orchestrator = PayrollOrchestrator::new(Arc::clone(&ledger), rail);
    let employer = LocalSigner::generate();

    let status = orchestrator
        .execute_run(snapshot.run.id, &employer, None)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::PartiallyCompleted);

    let payments = ledger.payments_for_run(snapshot.run.id).await.unwrap();
    assert_eq!(payments.len(), 3);
    for payment in &payments {
        if payment.amount == dec!(200) {
            assert_eq!(payment.status, PaymentStatus::Failed);
            assert!(!payment.failure_reason.as_deref().unwrap().is_empty());
            assert!(payment.settlement_ref.is_none());
        } else {
            assert_eq!(payment.status, PaymentStatus::Completed);
            assert!(payment.settlement_ref.is_some());
        }
    }

    let run = ledger.run(snapshot.run.id).await.unwrap();
    assert!(run.executed_at.is_some());
}

#[tokio::test]
async fn test_all_payments_succeed() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(50), dec!(75)]).await;

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    let status = orchestrator
        .execute_run(snapshot.run.id, &LocalSigner::generate(), None)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Completed);
}

#[tokio::test]
async fn test_all_payments_fail_is_failed() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(10), dec!(20)]).await;

    let rail = Arc::new(ScriptedRail::new(vec![dec!(10), dec!(20)]));
    let orchestrator = PayrollOrchestrator::new(Arc::clone(&ledger), rail);
    let status = orchestrator
        .execute_run(snapshot.run.id, &LocalSigner::generate(), None)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Failed);
}

#[tokio::test]
async fn test_authorization_rejection_is_noop_cancellation() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100)]).await;

    let rail = Arc::new(ScriptedRail::new(vec![]));
    let rail_port: Arc<dyn veilpay::domain::ports::TransferRail> = rail.clone();
    let orchestrator = PayrollOrchestrator::new(Arc::clone(&ledger), rail_port);

    let result = orchestrator
        .execute_run(snapshot.run.id, &RejectingSigner, None)
        .await;
    assert!(matches!(result, Err(PayrollError::AuthorizationRejected(_))));

    // Run back to pending, nothing reached the rail, no payment touched.
    let run = ledger.run(snapshot.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(rail.calls(), 0);
    let payments = ledger.payments_for_run(snapshot.run.id).await.unwrap();
    assert!(payments.iter().all(|p| p.status == PaymentStatus::Pending));

    // And the run is retryable afterwards.
    let status = orchestrator
        .execute_run(snapshot.run.id, &LocalSigner::generate(), None)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Completed);
}

#[tokio::test]
async fn test_whole_batch_rail_error_fails_run() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100)]).await;

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(RejectingRail::new()));
    let result = orchestrator
        .execute_run(snapshot.run.id, &LocalSigner::generate(), None)
        .await;
    assert!(matches!(result, Err(PayrollError::Rail(_))));

    let run = ledger.run(snapshot.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_prepare_exactly_one_wins() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100), dec!(200)]).await;

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));

    let (a, b) = tokio::join!(
        orchestrator.prepare(snapshot.run.id),
        orchestrator.prepare(snapshot.run.id)
    );
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one prepare may take the guard");
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(PayrollError::AlreadyExecuting(_))));
}

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let (ledger, _) = build_ledger();
    let (org, _ids, snapshot) = seed_run(&ledger, &[dec!(100), dec!(200)]).await;

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![dec!(200)])));
    let employer = LocalSigner::generate();

    let batch = orchestrator.prepare(snapshot.run.id).await.unwrap();
    let authorization = orchestrator.authorize(&batch, &employer).await.unwrap();
    let outcomes = orchestrator
        .submit(&batch, &authorization, None)
        .await
        .unwrap();

    let first = orchestrator.finalize(snapshot.run.id, &outcomes).await.unwrap();
    assert_eq!(first, RunStatus::PartiallyCompleted);
    let payments_after_first = ledger.payments_for_run(snapshot.run.id).await.unwrap();
    let audit_after_first = ledger.audit_for_org(org.id).await.unwrap();

    // The same results list again: no status flips, no duplicate audit rows.
    let second = orchestrator.finalize(snapshot.run.id, &outcomes).await.unwrap();
    assert_eq!(second, RunStatus::PartiallyCompleted);
    assert_eq!(
        ledger.payments_for_run(snapshot.run.id).await.unwrap(),
        payments_after_first
    );
    let audit_after_second = ledger.audit_for_org(org.id).await.unwrap();
    assert_eq!(audit_after_second.len(), audit_after_first.len());
    assert_eq!(
        audit_after_second
            .iter()
            .filter(|e| e.action == AuditAction::RunFinalized)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_prepare_computes_platform_rake() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100), dec!(200)]).await;

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    let batch = orchestrator.prepare(snapshot.run.id).await.unwrap();

    // Standard tier: 1% of each payment, invoiced on top of the batch.
    assert_eq!(batch.fee_total, dec!(3.00));
    assert_eq!(batch.fees.len(), 2);
    assert_eq!(batch.items[0].amount, dec!(100), "rail amounts stay gross");

    // A cheaper tier shrinks the rake for the same batch.
    ledger.reset_to_pending(snapshot.run.id).await.unwrap();
    let enterprise =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])))
            .with_fees(FeeSchedule::default(), FeeTier::Enterprise);
    let batch = enterprise.prepare(snapshot.run.id).await.unwrap();
    assert_eq!(batch.fee_total, dec!(0.75));
}

#[tokio::test]
async fn test_empty_run_rejected_at_prepare() {
    let (ledger, _) = build_ledger();
    let employer = LocalSigner::generate();
    let org = ledger
        .create_organization("Acme Corp", &employer.address())
        .await
        .unwrap();
    let snapshot = ledger
        .create_run(org.id, &[], veilpay::domain::asset::SettlementAsset::Usdc, None)
        .await
        .unwrap();

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    assert!(matches!(
        orchestrator.prepare(snapshot.run.id).await,
        Err(PayrollError::EmptyBatch(_))
    ));
    // Guard released: the run is back to pending, not stuck in preparing.
    let run = ledger.run(snapshot.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let (ledger, _) = build_ledger();
    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    assert!(matches!(
        orchestrator.prepare(uuid::Uuid::new_v4()).await,
        Err(PayrollError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_recover_pre_submission_resets_to_pending() {
    let (ledger, _) = build_ledger();
    let (_org, _ids, snapshot) = seed_run(&ledger, &[dec!(100)]).await;

    // Simulate an attempt that died right after taking the guard.
    ledger.begin_execution(snapshot.run.id).await.unwrap();

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    let status = orchestrator.recover(snapshot.run.id).await.unwrap();
    assert_eq!(status, RunStatus::Pending);

    // The recovered run executes normally.
    let status = orchestrator
        .execute_run(snapshot.run.id, &LocalSigner::generate(), None)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Completed);
}

#[tokio::test]
async fn test_recover_post_submission_marks_failed() {
    let (ledger, _) = build_ledger();
    let (org, _ids, snapshot) = seed_run(&ledger, &[dec!(100)]).await;

    // Simulate an attempt that died mid-submission.
    ledger.begin_execution(snapshot.run.id).await.unwrap();
    ledger
        .advance_run(snapshot.run.id, RunStatus::AwaitingAuthorization)
        .await
        .unwrap();
    ledger
        .advance_run(snapshot.run.id, RunStatus::Submitting)
        .await
        .unwrap();

    let orchestrator =
        PayrollOrchestrator::new(Arc::clone(&ledger), Arc::new(ScriptedRail::new(vec![])));
    let status = orchestrator.recover(snapshot.run.id).await.unwrap();
    assert_eq!(status, RunStatus::Failed);

    let audit = ledger.audit_for_org(org.id).await.unwrap();
    assert!(audit
        .iter()
        .any(|e| e.action == AuditAction::RunRecovered && !e.success));
}
