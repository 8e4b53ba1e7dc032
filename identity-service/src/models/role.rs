//! Business hierarchy roles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Level 0 is the administrative apex of the business hierarchy (distinct
/// from Root, which is the platform operator, not a business role).
pub const LEVEL_ADMIN: i32 = 0;
pub const LEVEL_STATE_HEAD: i32 = 1;
pub const LEVEL_MASTER_DISTRIBUTOR: i32 = 2;
pub const LEVEL_DISTRIBUTOR: i32 = 3;
pub const LEVEL_RETAILER: i32 = 4;

/// Immutable role definition for a business user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub level: i32,
}

impl Role {
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            level,
        }
    }

    pub fn admin() -> Self {
        Self::new("ADMIN", LEVEL_ADMIN)
    }

    pub fn state_head() -> Self {
        Self::new("STATE_HEAD", LEVEL_STATE_HEAD)
    }

    pub fn master_distributor() -> Self {
        Self::new("MASTER_DISTRIBUTOR", LEVEL_MASTER_DISTRIBUTOR)
    }

    pub fn distributor() -> Self {
        Self::new("DISTRIBUTOR", LEVEL_DISTRIBUTOR)
    }

    pub fn retailer() -> Self {
        Self::new("RETAILER", LEVEL_RETAILER)
    }

    pub fn is_admin(&self) -> bool {
        self.level == LEVEL_ADMIN
    }
}
