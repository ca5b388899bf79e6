use thiserror::Error;
use uuid::Uuid;

/// Crate-wide error type covering the crypto, ledger and orchestration layers.
#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
    #[error("master key error: {0}")]
    MasterKey(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payroll run {0} has no payments")]
    EmptyBatch(Uuid),
    #[error("payroll run {0} is already executing")]
    AlreadyExecuting(Uuid),
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),
    #[error("invalid run status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("transfer rail error: {0}")]
    Rail(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PayrollError>;
