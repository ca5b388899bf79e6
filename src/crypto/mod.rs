//! Cryptographic leaf modules: envelope encryption for employee PII and
//! deterministic stealth-address derivation.

pub mod derivation;
pub mod envelope;
