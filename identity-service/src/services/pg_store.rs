//! PostgreSQL [`IdentityStore`] backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    AccountBase, BusinessUser, CreatorKind, Employee, PermissionGrant, Principal, PrincipalKind,
    PrincipalStatus, Role, RootAccount, WhitelistEntry,
};

use super::store::{IdentityStore, SwapOutcome};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Flat row shared by all three principal tables.
#[derive(FromRow)]
struct BaseRow {
    id: Uuid,
    email: String,
    username: String,
    password_enc: String,
    status: String,
    created_by_kind: Option<String>,
    created_by_id: Option<Uuid>,
    refresh_token_hash: Option<String>,
    reset_token_hash: Option<String>,
    reset_token_expires: Option<DateTime<Utc>>,
    verification_token_hash: Option<String>,
    verification_token_expires: Option<DateTime<Utc>>,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl BaseRow {
    fn into_base(self) -> Result<AccountBase, AppError> {
        let status: PrincipalStatus = self
            .status
            .parse()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        let created_by_kind = self
            .created_by_kind
            .as_deref()
            .map(|s| s.parse::<PrincipalKind>())
            .transpose()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(AccountBase {
            id: self.id,
            email: self.email,
            username: self.username,
            password_enc: self.password_enc,
            status,
            created_by_kind,
            created_by_id: self.created_by_id,
            refresh_token_hash: self.refresh_token_hash,
            reset_token_hash: self.reset_token_hash,
            reset_token_expires: self.reset_token_expires,
            verification_token_hash: self.verification_token_hash,
            verification_token_expires: self.verification_token_expires,
            email_verified: self.email_verified,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct BusinessRow {
    #[sqlx(flatten)]
    base: BaseRow,
    role_id: Uuid,
    role_name: String,
    role_level: i32,
    parent_id: Option<Uuid>,
    hierarchy_level: i32,
    hierarchy_path: String,
    pin_enc: Option<String>,
}

#[derive(FromRow)]
struct EmployeeRow {
    #[sqlx(flatten)]
    base: BaseRow,
    department_id: Uuid,
    hierarchy_level: i32,
    creator_kind: String,
}

#[derive(FromRow)]
struct GrantRow {
    id: Uuid,
    name: String,
    service: Option<String>,
    is_active: bool,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<GrantRow> for PermissionGrant {
    fn from(row: GrantRow) -> Self {
        PermissionGrant {
            id: row.id,
            name: row.name,
            service: row.service,
            is_active: row.is_active,
            revoked_at: row.revoked_at,
        }
    }
}

#[derive(FromRow)]
struct WhitelistRow {
    id: Uuid,
    principal_kind: String,
    principal_id: Uuid,
    domain: Option<String>,
    server_ip: Option<String>,
    local_ip: Option<String>,
}

const BASE_COLS: &str = "id, email, username, password_enc, status, created_by_kind, \
     created_by_id, refresh_token_hash, reset_token_hash, reset_token_expires, \
     verification_token_hash, verification_token_expires, email_verified, created_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(kind: PrincipalKind) -> &'static str {
        match kind {
            PrincipalKind::Business => "business_users",
            PrincipalKind::Employee => "employees",
            PrincipalKind::Root => "root_accounts",
        }
    }

    async fn user_grants(&self, user_id: Uuid) -> Result<Vec<PermissionGrant>, AppError> {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT id, name, service, is_active, revoked_at FROM user_permissions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(rows.into_iter().map(PermissionGrant::from).collect())
    }

    async fn employee_grants(&self, employee_id: Uuid) -> Result<Vec<PermissionGrant>, AppError> {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT id, name, service, is_active, revoked_at FROM employee_permissions WHERE employee_id = $1",
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(rows.into_iter().map(PermissionGrant::from).collect())
    }

    async fn hydrate_business(&self, row: BusinessRow) -> Result<BusinessUser, AppError> {
        let permissions = self.user_grants(row.base.id).await?;
        Ok(BusinessUser {
            base: row.base.into_base()?,
            role: Role {
                id: row.role_id,
                name: row.role_name,
                level: row.role_level,
            },
            parent_id: row.parent_id,
            hierarchy_level: row.hierarchy_level,
            hierarchy_path: row.hierarchy_path,
            pin_enc: row.pin_enc,
            permissions,
        })
    }

    async fn hydrate_employee(&self, row: EmployeeRow) -> Result<Employee, AppError> {
        let permissions = self.employee_grants(row.base.id).await?;
        let created_by_kind: CreatorKind = row
            .creator_kind
            .parse()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(Employee {
            base: row.base.into_base()?,
            department_id: row.department_id,
            hierarchy_level: row.hierarchy_level,
            created_by_kind,
            permissions,
        })
    }

    async fn fetch_business(&self, clause: &str, arg: &str) -> Result<Option<BusinessUser>, AppError> {
        let query = format!(
            "SELECT u.{}, u.parent_id, u.hierarchy_level, u.hierarchy_path, u.pin_enc, \
             r.id AS role_id, r.name AS role_name, r.level AS role_level \
             FROM business_users u JOIN roles r ON r.id = u.role_id WHERE {}",
            BASE_COLS.replace(", ", ", u."),
            clause
        );
        let row = sqlx::query_as::<_, BusinessRow>(&query)
            .bind(arg)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        match row {
            Some(row) => Ok(Some(self.hydrate_business(row).await?)),
            None => Ok(None),
        }
    }

    async fn fetch_employee(&self, clause: &str, arg: &str) -> Result<Option<Employee>, AppError> {
        let query = format!(
            "SELECT {}, department_id, hierarchy_level, creator_kind FROM employees WHERE {}",
            BASE_COLS, clause
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(arg)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        match row {
            Some(row) => Ok(Some(self.hydrate_employee(row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_business_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<BusinessUser>, AppError> {
        self.fetch_business("(LOWER(u.email) = LOWER($1) OR u.username = $1)", identifier)
            .await
    }

    async fn find_employee_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Employee>, AppError> {
        self.fetch_employee("(LOWER(email) = LOWER($1) OR username = $1)", identifier)
            .await
    }

    async fn find_root_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<RootAccount>, AppError> {
        let query = format!(
            "SELECT {} FROM root_accounts WHERE LOWER(email) = LOWER($1) OR username = $1",
            BASE_COLS
        );
        let row = sqlx::query_as::<_, BaseRow>(&query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        row.map(|r| r.into_base().map(|base| RootAccount { base }))
            .transpose()
    }

    async fn find_business_by_id(&self, id: Uuid) -> Result<Option<BusinessUser>, AppError> {
        let query = format!(
            "SELECT u.{}, u.parent_id, u.hierarchy_level, u.hierarchy_path, u.pin_enc, \
             r.id AS role_id, r.name AS role_name, r.level AS role_level \
             FROM business_users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1",
            BASE_COLS.replace(", ", ", u.")
        );
        let row = sqlx::query_as::<_, BusinessRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        match row {
            Some(row) => Ok(Some(self.hydrate_business(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_employee_by_id(&self, id: Uuid) -> Result<Option<Employee>, AppError> {
        let query = format!(
            "SELECT {}, department_id, hierarchy_level, creator_kind FROM employees WHERE id = $1",
            BASE_COLS
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        match row {
            Some(row) => Ok(Some(self.hydrate_employee(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_root_by_id(&self, id: Uuid) -> Result<Option<RootAccount>, AppError> {
        let query = format!("SELECT {} FROM root_accounts WHERE id = $1", BASE_COLS);
        let row = sqlx::query_as::<_, BaseRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        row.map(|r| r.into_base().map(|base| RootAccount { base }))
            .transpose()
    }

    async fn find_by_reset_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        if let Some(user) = self
            .fetch_business(
                "u.reset_token_hash = $1 AND u.reset_token_expires > NOW()",
                token_hash,
            )
            .await?
        {
            return Ok(Some(Principal::Business(user)));
        }
        if let Some(employee) = self
            .fetch_employee(
                "reset_token_hash = $1 AND reset_token_expires > NOW()",
                token_hash,
            )
            .await?
        {
            return Ok(Some(Principal::Employee(employee)));
        }
        let query = format!(
            "SELECT {} FROM root_accounts WHERE reset_token_hash = $1 AND reset_token_expires > NOW()",
            BASE_COLS
        );
        let row = sqlx::query_as::<_, BaseRow>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        row.map(|r| {
            r.into_base()
                .map(|base| Principal::Root(RootAccount { base }))
        })
        .transpose()
    }

    async fn find_by_verification_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, AppError> {
        if let Some(user) = self
            .fetch_business(
                "u.verification_token_hash = $1 AND u.verification_token_expires > NOW()",
                token_hash,
            )
            .await?
        {
            return Ok(Some(Principal::Business(user)));
        }
        if let Some(employee) = self
            .fetch_employee(
                "verification_token_hash = $1 AND verification_token_expires > NOW()",
                token_hash,
            )
            .await?
        {
            return Ok(Some(Principal::Employee(employee)));
        }
        let query = format!(
            "SELECT {} FROM root_accounts WHERE verification_token_hash = $1 AND verification_token_expires > NOW()",
            BASE_COLS
        );
        let row = sqlx::query_as::<_, BaseRow>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        row.map(|r| {
            r.into_base()
                .map(|base| Principal::Root(RootAccount { base }))
        })
        .transpose()
    }

    async fn set_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET refresh_token_hash = $1 WHERE id = $2",
            Self::table(kind)
        );
        sqlx::query(&query)
            .bind(token_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<SwapOutcome, AppError> {
        // Conditional update: the row predicate is the compare of the CAS,
        // so concurrent rotations resolve inside Postgres.
        let query = format!(
            "UPDATE {} SET refresh_token_hash = $1 WHERE id = $2 AND refresh_token_hash = $3",
            Self::table(kind)
        );
        let result = sqlx::query(&query)
            .bind(new_hash)
            .bind(id)
            .bind(expected_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(if result.rows_affected() == 1 {
            SwapOutcome::Swapped
        } else {
            SwapOutcome::Lost
        })
    }

    async fn set_password(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        password_enc: &str,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET password_enc = $1, refresh_token_hash = NULL WHERE id = $2",
            Self::table(kind)
        );
        sqlx::query(&query)
            .bind(password_enc)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn set_pin(&self, id: Uuid, pin_enc: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE business_users SET pin_enc = $1 WHERE id = $2")
            .bind(pin_enc)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET reset_token_hash = $1, reset_token_expires = $2 WHERE id = $3",
            Self::table(kind)
        );
        sqlx::query(&query)
            .bind(token_hash)
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn clear_reset_token(&self, kind: PrincipalKind, id: Uuid) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET reset_token_hash = NULL, reset_token_expires = NULL WHERE id = $1",
            Self::table(kind)
        );
        sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET email_verified = TRUE, verification_token_hash = NULL, \
             verification_token_expires = NULL WHERE id = $1",
            Self::table(kind)
        );
        sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn whitelist_entries(
        &self,
        owner_kind: PrincipalKind,
        owner_id: Uuid,
    ) -> Result<Vec<WhitelistEntry>, AppError> {
        let rows = sqlx::query_as::<_, WhitelistRow>(
            "SELECT id, principal_kind, principal_id, domain, server_ip, local_ip \
             FROM whitelist_entries WHERE principal_kind = $1 AND principal_id = $2",
        )
        .bind(owner_kind.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        rows.into_iter()
            .map(|row| {
                let kind: PrincipalKind = row
                    .principal_kind
                    .parse()
                    .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
                Ok(WhitelistEntry {
                    id: row.id,
                    principal_kind: kind,
                    principal_id: row.principal_id,
                    domain: row.domain,
                    server_ip: row.server_ip,
                    local_ip: row.local_ip,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}
