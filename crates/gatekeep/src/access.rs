//! Role-based access control
//!
//! Two roles gate proxy administration:
//! - `DAO_ROLE`: calls through the proxy without a delegation, grants and
//!   kills delegations, and administers both roles
//! - `EMERGENCY_ADMIN_ROLE`: may only kill delegations

use crate::error::ProxyError;
use gatekeep_core::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Privilege tiers recognised by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Owner tier. Full control.
    Dao,

    /// Incident response tier. Revoke only.
    EmergencyAdmin,
}

/// Owner/DAO tier
pub const DAO_ROLE: Role = Role::Dao;

/// Emergency tier
pub const EMERGENCY_ADMIN_ROLE: Role = Role::EmergencyAdmin;

impl Role {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dao" | "dao_role" | "owner" => Some(Role::Dao),
            "emergency" | "emergency_admin" | "emergency_admin_role" => Some(Role::EmergencyAdmin),
            _ => None,
        }
    }

    /// Get the string name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dao => "DAO_ROLE",
            Role::EmergencyAdmin => "EMERGENCY_ADMIN_ROLE",
        }
    }

    /// Role whose holders may grant and revoke this role
    pub fn admin(&self) -> Role {
        Role::Dao
    }

    /// Every role
    pub fn all() -> [Role; 2] {
        [Role::Dao, Role::EmergencyAdmin]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role membership table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: HashMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `account` holds `role`
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map_or(false, |set| set.contains(account))
    }

    /// Fail with the missing-role error unless `account` holds `role`
    pub fn check_role(&self, role: Role, account: &Address) -> Result<(), ProxyError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(ProxyError::MissingRole)
        }
    }

    /// Grant `role` to `account`; returns false if it was already held
    pub fn grant_role(&mut self, role: Role, account: Address) -> bool {
        let granted = self.members.entry(role).or_default().insert(account);
        if granted {
            tracing::info!(%role, %account, "role granted");
        }
        granted
    }

    /// Revoke `role` from `account`; returns false if it was not held
    pub fn revoke_role(&mut self, role: Role, account: &Address) -> bool {
        let revoked = self
            .members
            .get_mut(&role)
            .map_or(false, |set| set.remove(account));
        if revoked {
            tracing::info!(%role, %account, "role revoked");
        }
        revoked
    }

    /// Holders of `role`, sorted
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
