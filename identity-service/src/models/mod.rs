pub mod audit_log;
pub mod permission;
pub mod principal;
pub mod role;
pub mod whitelist;

pub use audit_log::{actions, reasons, AuditRecord};
pub use permission::{EffectivePermissions, PermissionGrant};
pub use principal::{
    apex_hierarchy_path, child_hierarchy_path, hierarchy_apex, is_descendant_path, AccountBase,
    BusinessUser, CreatorKind, Employee, Principal, PrincipalKind, PrincipalStatus, RootAccount,
    SanitizedPrincipal,
};
pub use role::{
    Role, LEVEL_ADMIN, LEVEL_DISTRIBUTOR, LEVEL_MASTER_DISTRIBUTOR, LEVEL_RETAILER,
    LEVEL_STATE_HEAD,
};
pub use whitelist::WhitelistEntry;
