use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Security-relevant actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    OrganizationCreated,
    EmployeeAdded,
    StealthAddressLinked,
    RunCreated,
    RunExecuted,
    RunFinalized,
    RunRecovered,
}

/// Append-only audit record. Never updated or deleted; the store exposes no
/// mutation surface beyond `append`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor: String,
    pub org_id: Option<Uuid>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn success(action: AuditAction, actor: impl Into<String>, org_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            actor: actor.into(),
            org_id,
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        action: AuditAction,
        actor: impl Into<String>,
        org_id: Option<Uuid>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            actor: actor.into(),
            org_id,
            success: false,
            error_message: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}
