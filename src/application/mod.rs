//! Application layer: the `PayrollLedger` persistence facade (the only
//! component that touches plaintext PII) and the `PayrollOrchestrator` saga
//! controller that drives a run through its state machine.

pub mod ledger;
pub mod orchestrator;
