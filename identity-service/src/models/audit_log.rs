//! Append-only audit records. Never updated or deleted by this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PrincipalKind;

/// Audit action names. One record per logical action, success or failure.
pub mod actions {
    pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const LOGOUT: &str = "LOGOUT";
    pub const REFRESH_TOKEN_SUCCESS: &str = "REFRESH_TOKEN_SUCCESS";
    pub const REFRESH_TOKEN_INVALID: &str = "REFRESH_TOKEN_INVALID";
    pub const REFRESH_TOKEN_USER_NOT_FOUND: &str = "REFRESH_TOKEN_USER_NOT_FOUND";
    pub const PASSWORD_RESET_REQUESTED: &str = "PASSWORD_RESET_REQUESTED";
    pub const PASSWORD_RESET_COMPLETED: &str = "PASSWORD_RESET_COMPLETED";
    pub const PASSWORD_RESET_FAILED: &str = "PASSWORD_RESET_FAILED";
    pub const EMAIL_VERIFIED: &str = "EMAIL_VERIFIED";
    pub const EMAIL_VERIFICATION_FAILED: &str = "EMAIL_VERIFICATION_FAILED";
    pub const CREDENTIALS_UPDATED: &str = "CREDENTIALS_UPDATED";
    pub const CREDENTIALS_UPDATE_BLOCKED: &str = "CREDENTIALS_UPDATE_BLOCKED";
}

/// Failure reasons recorded in audit metadata. Far more detail lands here
/// than is ever returned to the caller.
pub mod reasons {
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const INVALID_PASSWORD: &str = "INVALID_PASSWORD";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const ORIGIN_NOT_WHITELISTED: &str = "ORIGIN_NOT_WHITELISTED";
    pub const IP_NOT_WHITELISTED: &str = "IP_NOT_WHITELISTED";
    pub const TOKEN_MISMATCH: &str = "TOKEN_MISMATCH";
    pub const TOKEN_DENYLISTED: &str = "TOKEN_DENYLISTED";
    pub const TOKEN_EXPIRED_OR_MALFORMED: &str = "TOKEN_EXPIRED_OR_MALFORMED";
}

/// A single structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<Uuid>,
    pub performed_by_id: Option<Uuid>,
    /// Kind of the acting principal, or "anonymous" before authentication.
    pub performed_by_kind: String,
    pub description: String,
    pub ip: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: &str,
        entity: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: None,
            performed_by_id: None,
            performed_by_kind: "anonymous".to_string(),
            description: description.into(),
            ip: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn entity_id(mut self, id: Uuid) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn performer(mut self, id: Uuid, kind: PrincipalKind) -> Self {
        self.performed_by_id = Some(id);
        self.performed_by_kind = kind.as_str().to_string();
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(|s| s.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
