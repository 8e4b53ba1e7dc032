//! Effective-permission resolution. Computed once at token issuance; the
//! result rides inside the access token for its lifetime.

use std::collections::BTreeSet;

use crate::models::{
    EffectivePermissions, PermissionGrant, Principal, LEVEL_ADMIN, LEVEL_DISTRIBUTOR,
    LEVEL_MASTER_DISTRIBUTOR, LEVEL_RETAILER, LEVEL_STATE_HEAD,
};

/// Permission an employee needs before it may update business-user
/// credentials.
pub const PERM_MANAGE_CREDENTIALS: &str = "users.credentials.update";

/// Baseline permissions a business role holds before explicit grants.
/// Deeper levels get strictly narrower defaults.
pub fn role_defaults(level: i32) -> BTreeSet<String> {
    let names: &[&str] = match level {
        LEVEL_STATE_HEAD => &[
            "wallet.view",
            "wallet.transfer",
            "reports.view",
            "network.view",
            "network.manage",
            "users.credentials.update",
        ],
        LEVEL_MASTER_DISTRIBUTOR => &[
            "wallet.view",
            "wallet.transfer",
            "reports.view",
            "network.view",
            "network.manage",
        ],
        LEVEL_DISTRIBUTOR => &["wallet.view", "wallet.transfer", "reports.view", "network.view"],
        LEVEL_RETAILER => &["wallet.view", "wallet.transfer"],
        _ => &[],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn granted_names(grants: &[PermissionGrant]) -> impl Iterator<Item = String> + '_ {
    grants
        .iter()
        .filter(|g| g.is_effective())
        .map(|g| g.qualified_name())
}

/// Resolve the permission set a principal authenticates with.
///
/// Root and level-0 business admins hold everything. Other business users
/// get their role defaults plus active explicit grants; employees get only
/// explicit grants.
pub fn effective_permissions(principal: &Principal) -> EffectivePermissions {
    match principal {
        Principal::Root(_) => EffectivePermissions::All,
        Principal::Business(user) => {
            if user.role.level == LEVEL_ADMIN {
                return EffectivePermissions::All;
            }
            let mut names = role_defaults(user.role.level);
            names.extend(granted_names(&user.permissions));
            EffectivePermissions::Granted(names)
        }
        Principal::Employee(employee) => {
            EffectivePermissions::Granted(granted_names(&employee.permissions).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountBase, BusinessUser, CreatorKind, Employee, PermissionGrant, Role, RootAccount,
    };
    use uuid::Uuid;

    fn base() -> AccountBase {
        AccountBase::new(
            "user@example.com".to_string(),
            "user".to_string(),
            "enc".to_string(),
        )
    }

    fn business(role: Role, permissions: Vec<PermissionGrant>) -> Principal {
        Principal::Business(BusinessUser {
            base: base(),
            hierarchy_level: role.level,
            role,
            parent_id: None,
            hierarchy_path: format!("/{}/", Uuid::new_v4()),
            pin_enc: None,
            permissions,
        })
    }

    #[test]
    fn test_root_and_admin_hold_everything() {
        let root = Principal::Root(RootAccount { base: base() });
        assert_eq!(effective_permissions(&root), EffectivePermissions::All);

        let admin = business(Role::admin(), vec![]);
        assert_eq!(effective_permissions(&admin), EffectivePermissions::All);
    }

    #[test]
    fn test_deeper_roles_get_narrower_defaults() {
        let retailer = effective_permissions(&business(Role::retailer(), vec![]));
        let distributor = effective_permissions(&business(Role::distributor(), vec![]));

        assert!(retailer.allows("wallet.transfer"));
        assert!(!retailer.allows("reports.view"));
        assert!(distributor.allows("reports.view"));
        assert!(!distributor.allows("network.manage"));
    }

    #[test]
    fn test_explicit_grants_extend_defaults_unless_revoked() {
        let active = PermissionGrant::scoped("refunds.issue", "payments");
        let mut revoked = PermissionGrant::scoped("settlement.run", "payments");
        revoked.revoked_at = Some(chrono::Utc::now());

        let perms = effective_permissions(&business(Role::retailer(), vec![active, revoked]));
        assert!(perms.allows("payments:refunds.issue"));
        assert!(!perms.allows("payments:settlement.run"));
        assert!(perms.allows("wallet.view"));
    }

    #[test]
    fn test_employee_has_no_role_defaults() {
        let employee = Principal::Employee(Employee {
            base: base(),
            department_id: Uuid::new_v4(),
            hierarchy_level: 1,
            created_by_kind: CreatorKind::Root,
            permissions: vec![PermissionGrant::new(PERM_MANAGE_CREDENTIALS)],
        });
        let perms = effective_permissions(&employee);
        assert!(perms.allows(PERM_MANAGE_CREDENTIALS));
        assert!(!perms.allows("wallet.view"));
    }
}
