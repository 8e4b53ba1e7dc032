//! Persistence trait for principals, credentials and whitelist entries.
//! Backed by Postgres in production and by [`MemoryStore`] in tests.
//!
//! [`MemoryStore`]: super::memory_store::MemoryStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{BusinessUser, Employee, Principal, PrincipalKind, RootAccount, WhitelistEntry};

/// Which refresh-token slot state a CAS write observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The expected hash was present and has been replaced.
    Swapped,
    /// Someone else rotated (or cleared) the slot first.
    Lost,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    // Lookup by login identifier (email case-insensitive, username exact)

    async fn find_business_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<BusinessUser>, AppError>;

    async fn find_employee_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Employee>, AppError>;

    async fn find_root_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<RootAccount>, AppError>;

    // Lookup by id

    async fn find_business_by_id(&self, id: Uuid) -> Result<Option<BusinessUser>, AppError>;

    async fn find_employee_by_id(&self, id: Uuid) -> Result<Option<Employee>, AppError>;

    async fn find_root_by_id(&self, id: Uuid) -> Result<Option<RootAccount>, AppError>;

    // Token lookups

    /// Find the principal holding an unexpired reset token with this digest.
    async fn find_by_reset_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError>;

    async fn find_by_verification_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError>;

    // Credential writes

    /// Store (or clear) the refresh-token digest for a principal.
    async fn set_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), AppError>;

    /// Replace the refresh-token digest only if the stored digest still
    /// equals `expected_hash`. Exactly one concurrent caller wins.
    async fn swap_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<SwapOutcome, AppError>;

    /// Store a new password ciphertext and invalidate the active session.
    async fn set_password(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        password_enc: &str,
    ) -> Result<(), AppError>;

    /// Store a new PIN ciphertext (business principals only).
    async fn set_pin(&self, id: Uuid, pin_enc: &str) -> Result<(), AppError>;

    async fn set_reset_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn clear_reset_token(&self, kind: PrincipalKind, id: Uuid) -> Result<(), AppError>;

    /// Mark the email verified and clear the verification token.
    async fn consume_verification_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> Result<(), AppError>;

    // Whitelist

    /// All entries owned by one Root or Business principal.
    async fn whitelist_entries(
        &self,
        owner_kind: PrincipalKind,
        owner_id: Uuid,
    ) -> Result<Vec<WhitelistEntry>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;

    // Provided resolution helpers

    /// Resolve a login identifier across the three principal kinds, in the
    /// order business, employee, root.
    async fn resolve_identifier(&self, identifier: &str) -> Result<Option<Principal>, AppError> {
        if let Some(user) = self.find_business_by_identifier(identifier).await? {
            return Ok(Some(Principal::Business(user)));
        }
        if let Some(employee) = self.find_employee_by_identifier(identifier).await? {
            return Ok(Some(Principal::Employee(employee)));
        }
        if let Some(root) = self.find_root_by_identifier(identifier).await? {
            return Ok(Some(Principal::Root(root)));
        }
        Ok(None)
    }

    /// Resolve an id for a known principal kind.
    async fn resolve_by_id(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> Result<Option<Principal>, AppError> {
        Ok(match kind {
            PrincipalKind::Business => self.find_business_by_id(id).await?.map(Principal::Business),
            PrincipalKind::Employee => self.find_employee_by_id(id).await?.map(Principal::Employee),
            PrincipalKind::Root => self.find_root_by_id(id).await?.map(Principal::Root),
        })
    }
}
