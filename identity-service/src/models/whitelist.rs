//! Network allow-list entries, scoped to a hierarchy root.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PrincipalKind;

/// One allow-list entry belonging to a Root or Business principal. Any
/// subset of the origin/IP fields may be set; an entry with none set imposes
/// no restriction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub id: Uuid,
    pub principal_kind: PrincipalKind,
    pub principal_id: Uuid,
    pub domain: Option<String>,
    pub server_ip: Option<String>,
    pub local_ip: Option<String>,
}

impl WhitelistEntry {
    pub fn new(principal_kind: PrincipalKind, principal_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_kind,
            principal_id,
            domain: None,
            server_ip: None,
            local_ip: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_server_ip(mut self, ip: impl Into<String>) -> Self {
        self.server_ip = Some(ip.into());
        self
    }

    pub fn with_local_ip(mut self, ip: impl Into<String>) -> Self {
        self.local_ip = Some(ip.into());
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.domain.is_none() && self.server_ip.is_none() && self.local_ip.is_none()
    }
}
