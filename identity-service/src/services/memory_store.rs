//! In-memory [`IdentityStore`] used by tests and local runs without a
//! database. All state sits behind one mutex, which also makes the
//! refresh-token swap an atomic compare-and-set.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    AccountBase, BusinessUser, Employee, Principal, PrincipalKind, PrincipalStatus, RootAccount,
    WhitelistEntry,
};

use super::store::{IdentityStore, SwapOutcome};

#[derive(Default)]
struct State {
    roots: Vec<RootAccount>,
    business_users: Vec<BusinessUser>,
    employees: Vec<Employee>,
    whitelist: Vec<WhitelistEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_root(&self, root: RootAccount) {
        self.lock().roots.push(root);
    }

    pub fn seed_business(&self, user: BusinessUser) {
        self.lock().business_users.push(user);
    }

    pub fn seed_employee(&self, employee: Employee) {
        self.lock().employees.push(employee);
    }

    pub fn seed_whitelist(&self, entry: WhitelistEntry) {
        self.lock().whitelist.push(entry);
    }

    /// Flip a seeded principal's status, e.g. to suspend it mid-test.
    pub fn set_status(&self, kind: PrincipalKind, id: Uuid, status: PrincipalStatus) {
        let mut state = self.lock();
        let _ = Self::with_base(&mut state, kind, id, |base| base.status = status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Test-only backend: a poisoned lock means a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_base<R>(
        state: &mut State,
        kind: PrincipalKind,
        id: Uuid,
        f: impl FnOnce(&mut AccountBase) -> R,
    ) -> Result<R, AppError> {
        let base = match kind {
            PrincipalKind::Root => state
                .roots
                .iter_mut()
                .find(|r| r.base.id == id)
                .map(|r| &mut r.base),
            PrincipalKind::Business => state
                .business_users
                .iter_mut()
                .find(|u| u.base.id == id)
                .map(|u| &mut u.base),
            PrincipalKind::Employee => state
                .employees
                .iter_mut()
                .find(|e| e.base.id == id)
                .map(|e| &mut e.base),
        };
        base.map(f)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Principal {} not found", id)))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_business_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<BusinessUser>, AppError> {
        Ok(self
            .lock()
            .business_users
            .iter()
            .find(|u| u.base.matches_identifier(identifier))
            .cloned())
    }

    async fn find_employee_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Employee>, AppError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .find(|e| e.base.matches_identifier(identifier))
            .cloned())
    }

    async fn find_root_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<RootAccount>, AppError> {
        Ok(self
            .lock()
            .roots
            .iter()
            .find(|r| r.base.matches_identifier(identifier))
            .cloned())
    }

    async fn find_business_by_id(&self, id: Uuid) -> Result<Option<BusinessUser>, AppError> {
        Ok(self
            .lock()
            .business_users
            .iter()
            .find(|u| u.base.id == id)
            .cloned())
    }

    async fn find_employee_by_id(&self, id: Uuid) -> Result<Option<Employee>, AppError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .find(|e| e.base.id == id)
            .cloned())
    }

    async fn find_root_by_id(&self, id: Uuid) -> Result<Option<RootAccount>, AppError> {
        Ok(self.lock().roots.iter().find(|r| r.base.id == id).cloned())
    }

    async fn find_by_reset_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        let now = Utc::now();
        let unexpired = |base: &AccountBase| {
            base.reset_token_hash.as_deref() == Some(token_hash)
                && base.reset_token_expires.is_some_and(|at| at > now)
        };

        let state = self.lock();
        if let Some(user) = state.business_users.iter().find(|u| unexpired(&u.base)) {
            return Ok(Some(Principal::Business(user.clone())));
        }
        if let Some(employee) = state.employees.iter().find(|e| unexpired(&e.base)) {
            return Ok(Some(Principal::Employee(employee.clone())));
        }
        if let Some(root) = state.roots.iter().find(|r| unexpired(&r.base)) {
            return Ok(Some(Principal::Root(root.clone())));
        }
        Ok(None)
    }

    async fn find_by_verification_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        let now = Utc::now();
        let unexpired = |base: &AccountBase| {
            base.verification_token_hash.as_deref() == Some(token_hash)
                && base.verification_token_expires.is_some_and(|at| at > now)
        };

        let state = self.lock();
        if let Some(user) = state.business_users.iter().find(|u| unexpired(&u.base)) {
            return Ok(Some(Principal::Business(user.clone())));
        }
        if let Some(employee) = state.employees.iter().find(|e| unexpired(&e.base)) {
            return Ok(Some(Principal::Employee(employee.clone())));
        }
        if let Some(root) = state.roots.iter().find(|r| unexpired(&r.base)) {
            return Ok(Some(Principal::Root(root.clone())));
        }
        Ok(None)
    }

    async fn set_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            base.refresh_token_hash = token_hash.map(|s| s.to_string());
        })
    }

    async fn swap_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<SwapOutcome, AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            if base.refresh_token_hash.as_deref() == Some(expected_hash) {
                base.refresh_token_hash = Some(new_hash.to_string());
                SwapOutcome::Swapped
            } else {
                SwapOutcome::Lost
            }
        })
    }

    async fn set_password(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        password_enc: &str,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            base.password_enc = password_enc.to_string();
            base.refresh_token_hash = None;
        })
    }

    async fn set_pin(&self, id: Uuid, pin_enc: &str) -> Result<(), AppError> {
        let mut state = self.lock();
        state
            .business_users
            .iter_mut()
            .find(|u| u.base.id == id)
            .map(|u| u.pin_enc = Some(pin_enc.to_string()))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Business user {} not found", id)))
    }

    async fn set_reset_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            base.reset_token_hash = Some(token_hash.to_string());
            base.reset_token_expires = Some(expires_at);
        })
    }

    async fn clear_reset_token(&self, kind: PrincipalKind, id: Uuid) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            base.reset_token_hash = None;
            base.reset_token_expires = None;
        })
    }

    async fn consume_verification_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::with_base(&mut state, kind, id, |base| {
            base.email_verified = true;
            base.verification_token_hash = None;
            base.verification_token_expires = None;
        })
    }

    async fn whitelist_entries(
        &self,
        owner_kind: PrincipalKind,
        owner_id: Uuid,
    ) -> Result<Vec<WhitelistEntry>, AppError> {
        Ok(self
            .lock()
            .whitelist
            .iter()
            .filter(|e| e.principal_kind == owner_kind && e.principal_id == owner_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountBase, RootAccount};

    fn root_with(email: &str, username: &str) -> RootAccount {
        RootAccount {
            base: AccountBase::new(email.to_string(), username.to_string(), "enc".to_string()),
        }
    }

    #[tokio::test]
    async fn test_identifier_resolution_order_and_case() {
        let store = MemoryStore::new();
        store.seed_root(root_with("Ops@Example.com", "ops-root"));

        let by_email = store.resolve_identifier("ops@example.com").await.unwrap();
        assert!(matches!(by_email, Some(Principal::Root(_))));

        let by_username = store.resolve_identifier("ops-root").await.unwrap();
        assert!(by_username.is_some());

        // Usernames are exact-match
        assert!(store
            .resolve_identifier("OPS-ROOT")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_swap_refresh_token_is_compare_and_set() {
        let store = MemoryStore::new();
        let root = root_with("a@b.c", "a");
        let id = root.base.id;
        store.seed_root(root);

        store
            .set_refresh_token(PrincipalKind::Root, id, Some("hash-1"))
            .await
            .unwrap();

        let won = store
            .swap_refresh_token(PrincipalKind::Root, id, "hash-1", "hash-2")
            .await
            .unwrap();
        assert_eq!(won, SwapOutcome::Swapped);

        // Replay of the old hash loses
        let lost = store
            .swap_refresh_token(PrincipalKind::Root, id, "hash-1", "hash-3")
            .await
            .unwrap();
        assert_eq!(lost, SwapOutcome::Lost);
    }

    #[tokio::test]
    async fn test_set_password_clears_refresh_token() {
        let store = MemoryStore::new();
        let root = root_with("a@b.c", "a");
        let id = root.base.id;
        store.seed_root(root);

        store
            .set_refresh_token(PrincipalKind::Root, id, Some("hash"))
            .await
            .unwrap();
        store
            .set_password(PrincipalKind::Root, id, "new-enc")
            .await
            .unwrap();

        let reloaded = store.find_root_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded.base.password_enc, "new-enc");
        assert!(reloaded.base.refresh_token_hash.is_none());
    }
}
