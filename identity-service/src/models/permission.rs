//! Individual permission grants and the resolved effective set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A single individually granted permission (UserPermission /
/// EmployeePermission record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub name: String,
    /// Optional service scope; a scoped grant is namespaced as
    /// `<service>:<name>`.
    pub service: Option<String>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            service: None,
            is_active: true,
            revoked_at: None,
        }
    }

    pub fn scoped(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            ..Self::new(name)
        }
    }

    pub fn is_effective(&self) -> bool {
        self.is_active && self.revoked_at.is_none()
    }

    pub fn qualified_name(&self) -> String {
        match &self.service {
            Some(service) => format!("{}:{}", service, self.name),
            None => self.name.clone(),
        }
    }
}

/// The merged permission set a token is issued with. Root carries an
/// all-permissions sentinel instead of an enumerated list; it serializes as
/// the string `"*"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectivePermissions {
    All,
    Granted(BTreeSet<String>),
}

impl EffectivePermissions {
    pub fn empty() -> Self {
        EffectivePermissions::Granted(BTreeSet::new())
    }

    pub fn allows(&self, permission: &str) -> bool {
        match self {
            EffectivePermissions::All => true,
            EffectivePermissions::Granted(set) => set.contains(permission),
        }
    }
}

impl Serialize for EffectivePermissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EffectivePermissions::All => serializer.serialize_str("*"),
            EffectivePermissions::Granted(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EffectivePermissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Sentinel(String),
            List(BTreeSet<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Sentinel(s) if s == "*" => Ok(EffectivePermissions::All),
            Repr::Sentinel(s) => Err(serde::de::Error::custom(format!(
                "invalid permission sentinel: {}",
                s
            ))),
            Repr::List(set) => Ok(EffectivePermissions::Granted(set)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        let all = EffectivePermissions::All;
        let json = serde_json::to_string(&all).unwrap();
        assert_eq!(json, "\"*\"");
        assert_eq!(
            serde_json::from_str::<EffectivePermissions>(&json).unwrap(),
            all
        );

        let granted = EffectivePermissions::Granted(
            ["wallet.view".to_string(), "reports.view".to_string()]
                .into_iter()
                .collect(),
        );
        let json = serde_json::to_string(&granted).unwrap();
        assert_eq!(
            serde_json::from_str::<EffectivePermissions>(&json).unwrap(),
            granted
        );
    }

    #[test]
    fn test_revoked_grant_is_not_effective() {
        let mut grant = PermissionGrant::new("wallet.transfer");
        assert!(grant.is_effective());
        grant.revoked_at = Some(Utc::now());
        assert!(!grant.is_effective());

        let mut inactive = PermissionGrant::new("wallet.transfer");
        inactive.is_active = false;
        assert!(!inactive.is_effective());
    }

    #[test]
    fn test_scoped_grant_is_namespaced() {
        let grant = PermissionGrant::scoped("recharge", "payments");
        assert_eq!(grant.qualified_name(), "payments:recharge");
    }
}
