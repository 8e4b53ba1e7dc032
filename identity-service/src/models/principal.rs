//! Principal variants: the three authenticatable identity kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{PermissionGrant, Role};

/// The three principal kinds, in credential-store lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Business,
    Employee,
    Root,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Business => "business",
            PrincipalKind::Employee => "employee",
            PrincipalKind::Root => "root",
        }
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "business" => Ok(PrincipalKind::Business),
            "employee" => Ok(PrincipalKind::Employee),
            "root" => Ok(PrincipalKind::Root),
            _ => Err(format!("Invalid principal kind: {}", s)),
        }
    }
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status shared by every principal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrincipalStatus {
    Active,
    Inactive,
    Suspended,
    Deleted,
}

impl PrincipalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalStatus::Active => "ACTIVE",
            PrincipalStatus::Inactive => "INACTIVE",
            PrincipalStatus::Suspended => "SUSPENDED",
            PrincipalStatus::Deleted => "DELETED",
        }
    }
}

impl std::str::FromStr for PrincipalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PrincipalStatus::Active),
            "INACTIVE" => Ok(PrincipalStatus::Inactive),
            "SUSPENDED" => Ok(PrincipalStatus::Suspended),
            "DELETED" => Ok(PrincipalStatus::Deleted),
            _ => Err(format!("Invalid principal status: {}", s)),
        }
    }
}

impl std::fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of principal provisioned an employee account. Governs what the
/// employee may later modify: an employee created by an Admin must never
/// touch another Admin's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CreatorKind {
    Root,
    Admin,
}

impl CreatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatorKind::Root => "ROOT",
            CreatorKind::Admin => "ADMIN",
        }
    }
}

impl std::str::FromStr for CreatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ROOT" => Ok(CreatorKind::Root),
            "ADMIN" => Ok(CreatorKind::Admin),
            _ => Err(format!("Invalid creator kind: {}", s)),
        }
    }
}

/// Credential and token material common to every principal kind.
///
/// Passwords are stored reversibly encrypted (not hashed) so that operators
/// higher in the hierarchy can view and reissue them; reset and verification
/// tokens are stored as one-way digests because they are only ever compared.
#[derive(Debug, Clone)]
pub struct AccountBase {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_enc: String,
    pub status: PrincipalStatus,
    pub created_by_kind: Option<PrincipalKind>,
    pub created_by_id: Option<Uuid>,
    /// Digest of the single currently-valid refresh token, if a session is
    /// active. Rotated on refresh, cleared on logout and password change.
    pub refresh_token_hash: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub verification_token_hash: Option<String>,
    pub verification_token_expires: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl AccountBase {
    pub fn new(email: String, username: String, password_enc: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_enc,
            status: PrincipalStatus::Active,
            created_by_kind: None,
            created_by_id: None,
            refresh_token_hash: None,
            reset_token_hash: None,
            reset_token_expires: None,
            verification_token_hash: None,
            verification_token_expires: None,
            email_verified: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }

    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.email.eq_ignore_ascii_case(identifier) || self.username == identifier
    }
}

/// Platform operator account. Sits above the business hierarchy.
#[derive(Debug, Clone)]
pub struct RootAccount {
    pub base: AccountBase,
}

/// Reseller account in the tiered hierarchy (admin → state head → master
/// distributor → distributor → retailer).
#[derive(Debug, Clone)]
pub struct BusinessUser {
    pub base: AccountBase,
    pub role: Role,
    pub parent_id: Option<Uuid>,
    pub hierarchy_level: i32,
    /// Ancestor chain encoded as `/<id>/<id>/.../`; a child's path always
    /// starts with its parent's path.
    pub hierarchy_path: String,
    pub pin_enc: Option<String>,
    pub permissions: Vec<PermissionGrant>,
}

impl BusinessUser {
    /// Id of the level-0 admin at the top of this user's hierarchy path.
    pub fn hierarchy_apex(&self) -> Option<Uuid> {
        hierarchy_apex(&self.hierarchy_path)
    }
}

/// Internal workforce account.
#[derive(Debug, Clone)]
pub struct Employee {
    pub base: AccountBase,
    pub department_id: Uuid,
    pub hierarchy_level: i32,
    pub created_by_kind: CreatorKind,
    pub permissions: Vec<PermissionGrant>,
}

/// An authenticated identity, tagged with its kind. Exhaustively matched
/// wherever per-kind trust rules differ.
#[derive(Debug, Clone)]
pub enum Principal {
    Business(BusinessUser),
    Employee(Employee),
    Root(RootAccount),
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::Business(_) => PrincipalKind::Business,
            Principal::Employee(_) => PrincipalKind::Employee,
            Principal::Root(_) => PrincipalKind::Root,
        }
    }

    pub fn base(&self) -> &AccountBase {
        match self {
            Principal::Business(u) => &u.base,
            Principal::Employee(e) => &e.base,
            Principal::Root(r) => &r.base,
        }
    }

    pub fn id(&self) -> Uuid {
        self.base().id
    }

    pub fn status(&self) -> PrincipalStatus {
        self.base().status
    }

    pub fn role(&self) -> Option<&Role> {
        match self {
            Principal::Business(u) => Some(&u.role),
            _ => None,
        }
    }

    pub fn pin_enc(&self) -> Option<&str> {
        match self {
            Principal::Business(u) => u.pin_enc.as_deref(),
            _ => None,
        }
    }

    /// Response form with all secret material stripped.
    pub fn sanitized(&self) -> SanitizedPrincipal {
        let base = self.base();
        SanitizedPrincipal {
            id: base.id,
            kind: self.kind(),
            email: base.email.clone(),
            username: base.username.clone(),
            status: base.status,
            email_verified: base.email_verified,
            role: self.role().map(|r| r.name.clone()),
            role_level: self.role().map(|r| r.level),
            hierarchy_level: match self {
                Principal::Business(u) => Some(u.hierarchy_level),
                Principal::Employee(e) => Some(e.hierarchy_level),
                Principal::Root(_) => None,
            },
            department_id: match self {
                Principal::Employee(e) => Some(e.department_id),
                _ => None,
            },
            created_at: base.created_at,
        }
    }
}

/// Principal view returned to API callers: no password, PIN, refresh token
/// or one-time-token material.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SanitizedPrincipal {
    pub id: Uuid,
    pub kind: PrincipalKind,
    pub email: String,
    pub username: String,
    pub status: PrincipalStatus,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Build a child's hierarchy path from its parent's.
pub fn child_hierarchy_path(parent_path: &str, child_id: Uuid) -> String {
    format!("{}{}/", parent_path, child_id)
}

/// Hierarchy path of a top-of-hierarchy (level 0) business user.
pub fn apex_hierarchy_path(id: Uuid) -> String {
    format!("/{}/", id)
}

/// First id segment of a hierarchy path: the level-0 admin of the lineage.
pub fn hierarchy_apex(path: &str) -> Option<Uuid> {
    path.trim_matches('/')
        .split('/')
        .next()
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Strict descendant test via path prefix. A principal is not its own
/// descendant.
pub fn is_descendant_path(ancestor_path: &str, candidate_path: &str) -> bool {
    candidate_path != ancestor_path && candidate_path.starts_with(ancestor_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_path_construction() {
        let admin = Uuid::new_v4();
        let distributor = Uuid::new_v4();
        let retailer = Uuid::new_v4();

        let admin_path = apex_hierarchy_path(admin);
        let dist_path = child_hierarchy_path(&admin_path, distributor);
        let retail_path = child_hierarchy_path(&dist_path, retailer);

        assert!(dist_path.starts_with(&admin_path));
        assert!(retail_path.starts_with(&dist_path));
        assert_eq!(hierarchy_apex(&retail_path), Some(admin));
    }

    #[test]
    fn test_descendant_is_asymmetric() {
        let a = apex_hierarchy_path(Uuid::new_v4());
        let b = child_hierarchy_path(&a, Uuid::new_v4());
        let c = child_hierarchy_path(&b, Uuid::new_v4());

        assert!(is_descendant_path(&a, &c));
        assert!(!is_descendant_path(&c, &a));
        assert!(!is_descendant_path(&a, &a));
    }

    #[test]
    fn test_identifier_matching_is_case_insensitive_for_email() {
        let base = AccountBase::new(
            "Admin@Example.com".to_string(),
            "admin01".to_string(),
            "enc".to_string(),
        );
        assert!(base.matches_identifier("admin@example.com"));
        assert!(base.matches_identifier("admin01"));
        assert!(!base.matches_identifier("ADMIN01"));
    }
}
