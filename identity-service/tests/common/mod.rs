//! Shared test harness: an AuthService wired to in-memory backends, plus
//! seed helpers for the three principal kinds.

use std::sync::Arc;

use uuid::Uuid;

use identity_service::config::JwtConfig;
use identity_service::models::{
    apex_hierarchy_path, child_hierarchy_path, AccountBase, BusinessUser, CreatorKind, Employee,
    PermissionGrant, PrincipalKind, Role, RootAccount, WhitelistEntry,
};
use identity_service::services::{
    AttemptPolicy, AuditRecorder, AuthService, CredentialService, JwtService, MemoryAuditSink,
    MemoryKv, MemoryStore, MockNotifier, SecretCodec, SharedKv,
};

// Fixed key material keeps ciphertexts decryptable across harness clones.
pub const MASTER_KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub const MAX_ATTEMPTS: u64 = 3;

pub struct TestHarness {
    pub auth: AuthService,
    pub credentials: CredentialService,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<MockNotifier>,
    pub secrets: SecretCodec,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_kv(Arc::new(MemoryKv::new()))
    }

    /// Harness over a custom shared-KV backend, e.g. one that simulates a
    /// denylist outage.
    pub fn with_kv(kv: Arc<dyn SharedKv>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let notifier = Arc::new(MockNotifier::new());
        let secrets = SecretCodec::from_hex(MASTER_KEY_HEX).unwrap();
        let jwt = JwtService::new(&JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        })
        .unwrap();

        let auth = AuthService::new(
            store.clone(),
            kv,
            jwt,
            secrets.clone(),
            AuditRecorder::new(audit.clone()),
            notifier.clone(),
            AttemptPolicy {
                max_attempts: MAX_ATTEMPTS,
                window_seconds: 300,
            },
        );
        let credentials = CredentialService::new(
            store.clone(),
            secrets.clone(),
            AuditRecorder::new(audit.clone()),
        );

        Self {
            auth,
            credentials,
            store,
            audit,
            notifier,
            secrets,
        }
    }

    fn base(&self, email: &str, username: &str, password: &str) -> AccountBase {
        AccountBase::new(
            email.to_string(),
            username.to_string(),
            self.secrets.encrypt(password).unwrap(),
        )
    }

    pub fn seed_root(&self, email: &str, username: &str, password: &str) -> RootAccount {
        let root = RootAccount {
            base: self.base(email, username, password),
        };
        self.store.seed_root(root.clone());
        root
    }

    /// Level-0 admin at the apex of a fresh hierarchy, created by `root`.
    pub fn seed_admin(
        &self,
        root: &RootAccount,
        email: &str,
        username: &str,
        password: &str,
    ) -> BusinessUser {
        let mut base = self.base(email, username, password);
        base.created_by_kind = Some(PrincipalKind::Root);
        base.created_by_id = Some(root.base.id);
        let admin = BusinessUser {
            hierarchy_path: apex_hierarchy_path(base.id),
            base,
            role: Role::admin(),
            parent_id: None,
            hierarchy_level: 0,
            pin_enc: Some(self.secrets.encrypt("111111").unwrap()),
            permissions: vec![],
        };
        self.store.seed_business(admin.clone());
        admin
    }

    /// Business user one level below `parent`.
    pub fn seed_business_child(
        &self,
        parent: &BusinessUser,
        role: Role,
        email: &str,
        username: &str,
        password: &str,
    ) -> BusinessUser {
        let mut base = self.base(email, username, password);
        base.created_by_kind = Some(PrincipalKind::Business);
        base.created_by_id = Some(parent.base.id);
        let child = BusinessUser {
            hierarchy_path: child_hierarchy_path(&parent.hierarchy_path, base.id),
            base,
            role,
            parent_id: Some(parent.base.id),
            hierarchy_level: parent.hierarchy_level + 1,
            pin_enc: Some(self.secrets.encrypt("222222").unwrap()),
            permissions: vec![],
        };
        self.store.seed_business(child.clone());
        child
    }

    pub fn seed_employee(
        &self,
        created_by_kind: CreatorKind,
        email: &str,
        username: &str,
        password: &str,
        permissions: Vec<PermissionGrant>,
    ) -> Employee {
        let mut base = self.base(email, username, password);
        base.created_by_kind = Some(match created_by_kind {
            CreatorKind::Root => PrincipalKind::Root,
            CreatorKind::Admin => PrincipalKind::Business,
        });
        let employee = Employee {
            base,
            department_id: Uuid::new_v4(),
            hierarchy_level: 1,
            created_by_kind,
            permissions,
        };
        self.store.seed_employee(employee.clone());
        employee
    }

    pub fn seed_whitelist(&self, entry: WhitelistEntry) {
        self.store.seed_whitelist(entry);
    }
}
