//! Credential updates: who may set whose password and transaction PIN.
//!
//! The trust rules are positional, not role-named: a business user reaches
//! only strict descendants of its own hierarchy path, an employee reaches
//! business users only with an explicit grant, and nothing an ADMIN created
//! ever reaches the admin level itself. Unmatched combinations are refused.

use std::sync::Arc;

use serde_json::json;

use crate::models::{
    actions, is_descendant_path, AuditRecord, CreatorKind, Principal, PrincipalKind, LEVEL_ADMIN,
};

use super::audit::AuditRecorder;
use super::error::ServiceError;
use super::permissions::{effective_permissions, PERM_MANAGE_CREDENTIALS};
use super::secrets::SecretCodec;
use super::store::IdentityStore;
use uuid::Uuid;

const AUDIT_ENTITY: &str = "credential";
const MIN_PASSWORD_LEN: usize = 8;
const PIN_LEN: usize = 6;

/// Requested changes. At least one of the new values must be present;
/// `current_*` fields are required for self-service updates.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    pub new_password: Option<String>,
    pub new_pin: Option<String>,
    pub current_password: Option<String>,
    pub current_pin: Option<String>,
}

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn IdentityStore>,
    secrets: SecretCodec,
    audit: AuditRecorder,
}

impl CredentialService {
    pub fn new(store: Arc<dyn IdentityStore>, secrets: SecretCodec, audit: AuditRecorder) -> Self {
        Self {
            store,
            secrets,
            audit,
        }
    }

    /// Can `actor` administer `target`'s credentials at all? Self-updates
    /// are handled separately by the caller.
    fn authorize(actor: &Principal, target: &Principal) -> Result<(), String> {
        match (actor, target) {
            (Principal::Root(_), _) => Ok(()),

            (Principal::Business(actor), Principal::Business(target)) => {
                if is_descendant_path(&actor.hierarchy_path, &target.hierarchy_path) {
                    Ok(())
                } else {
                    Err("Target is not a descendant of the acting business user".to_string())
                }
            }

            (Principal::Employee(actor), Principal::Business(target)) => {
                if !effective_permissions(&Principal::Employee(actor.clone()))
                    .allows(PERM_MANAGE_CREDENTIALS)
                {
                    return Err(format!(
                        "Employee lacks the {} permission",
                        PERM_MANAGE_CREDENTIALS
                    ));
                }
                // An admin-created employee works inside one admin's tree
                // and never reaches the admin level itself.
                if actor.created_by_kind == CreatorKind::Admin
                    && target.role.level == LEVEL_ADMIN
                {
                    return Err(
                        "Admin-created employees cannot update admin credentials".to_string()
                    );
                }
                Ok(())
            }

            // Everything else is refused: business users do not manage
            // employees or Root, employees do not manage each other.
            _ => Err(format!(
                "{} principals cannot update {} credentials",
                actor.kind().as_str(),
                target.kind().as_str()
            )),
        }
    }

    /// Where the acting principal's authority derives from, for the audit
    /// trail: the hierarchy position for business users, the creator for
    /// employees.
    fn actor_lineage(actor: &Principal) -> serde_json::Value {
        match actor {
            Principal::Root(_) => json!({
                "kind": PrincipalKind::Root.as_str(),
            }),
            Principal::Business(user) => json!({
                "kind": PrincipalKind::Business.as_str(),
                "role": user.role.name,
                "hierarchy_path": user.hierarchy_path,
            }),
            Principal::Employee(employee) => json!({
                "kind": PrincipalKind::Employee.as_str(),
                "created_by_kind": employee.created_by_kind.as_str(),
            }),
        }
    }

    async fn audit_blocked(
        &self,
        actor: &Principal,
        target_kind: PrincipalKind,
        target_id: Uuid,
        reason: &str,
        ip: Option<&str>,
    ) {
        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::CREDENTIALS_UPDATE_BLOCKED,
                    AUDIT_ENTITY,
                    "Credential update refused",
                )
                .entity_id(target_id)
                .performer(actor.id(), actor.kind())
                .ip(ip)
                .metadata(json!({
                    "reason": reason,
                    "target_user_type": target_kind.as_str(),
                    "actor": Self::actor_lineage(actor),
                })),
            )
            .await;
    }

    /// Update the password and/or PIN of `target_id`, acting as `actor`.
    pub async fn update_credentials(
        &self,
        actor: &Principal,
        target_kind: PrincipalKind,
        target_id: Uuid,
        update: CredentialUpdate,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        if update.new_password.is_none() && update.new_pin.is_none() {
            return Err(ServiceError::Validation(
                "Nothing to update: provide a new password or PIN".to_string(),
            ));
        }
        if let Some(password) = &update.new_password {
            if password.len() < MIN_PASSWORD_LEN {
                return Err(ServiceError::Validation(format!(
                    "Password must be at least {} characters",
                    MIN_PASSWORD_LEN
                )));
            }
        }
        if let Some(pin) = &update.new_pin {
            if pin.len() != PIN_LEN || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(ServiceError::Validation(format!(
                    "PIN must be exactly {} digits",
                    PIN_LEN
                )));
            }
        }

        let target = self
            .store
            .resolve_by_id(target_kind, target_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Target principal not found".to_string()))?;

        let is_own_update = actor.kind() == target.kind() && actor.id() == target.id();

        if !is_own_update {
            if let Err(reason) = Self::authorize(actor, &target) {
                self.audit_blocked(actor, target_kind, target_id, &reason, ip)
                    .await;
                return Err(ServiceError::NotPermitted(reason));
            }
        }

        // PINs exist only on business accounts
        if update.new_pin.is_some() && target.kind() != PrincipalKind::Business {
            let reason = "Only business users hold a transaction PIN";
            self.audit_blocked(actor, target_kind, target_id, reason, ip)
                .await;
            return Err(ServiceError::Validation(reason.to_string()));
        }

        // Self-service password changes must prove possession of the current
        // password; Root resets are unconditional, and hierarchy operators
        // reissue passwords their subordinates may have lost.
        if is_own_update && update.new_password.is_some() {
            let current = update.current_password.as_deref().ok_or_else(|| {
                ServiceError::Validation("Current password is required".to_string())
            })?;
            if !self
                .secrets
                .verify_secret(current, &target.base().password_enc)?
            {
                return Err(ServiceError::InvalidCredentials);
            }
        }

        // Replacing a PIN always proves the current one, whoever performs
        // the change; only Root may set a PIN without presenting it.
        if update.new_pin.is_some() && actor.kind() != PrincipalKind::Root {
            if let Some(stored_pin) = target.pin_enc() {
                let current = update.current_pin.as_deref().ok_or_else(|| {
                    ServiceError::Validation("Current PIN is required".to_string())
                })?;
                if !self.secrets.verify_secret(current, stored_pin)? {
                    return Err(ServiceError::InvalidCredentials);
                }
            }
        }

        if let Some(password) = &update.new_password {
            let password_enc = self.secrets.encrypt(password)?;
            self.store
                .set_password(target.kind(), target.id(), &password_enc)
                .await?;
        }
        if let Some(pin) = &update.new_pin {
            let pin_enc = self.secrets.encrypt(pin)?;
            self.store.set_pin(target.id(), &pin_enc).await?;
        }

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::CREDENTIALS_UPDATED,
                    AUDIT_ENTITY,
                    "Credentials updated",
                )
                .entity_id(target.id())
                .performer(actor.id(), actor.kind())
                .ip(ip)
                .metadata(json!({
                    "is_own_update": is_own_update,
                    "target_user_type": target.kind().as_str(),
                    "password_changed": update.new_password.is_some(),
                    "pin_changed": update.new_pin.is_some(),
                    "actor": Self::actor_lineage(actor),
                })),
            )
            .await;

        Ok(())
    }
}
