//! Confidential payroll rail core.
//!
//! Employee PII (name, salary, wallet) is envelope-encrypted at rest under a
//! per-organization key wrapped by a process-wide master key. Each employee
//! receives salary at a stealth address derived deterministically from a
//! signature over a canonical message, so the employer never learns the
//! employee's real identity key. Payroll runs execute as a saga: prepare a
//! batch, obtain one authorization from the paying party, submit to the
//! external transfer rail, and reconcile per-payment outcomes in the ledger.

pub mod application;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod infrastructure;
