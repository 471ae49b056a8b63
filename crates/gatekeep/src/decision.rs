//! Authorization decisions
//!
//! The outcome of running a caller through the gate's privilege and
//! delegation steps, in a form that can be printed, serialized and audited.

use crate::registry::Delegation;
use gatekeep_core::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of evaluating a caller against the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The final decision
    pub action: Action,

    /// Reason for the decision
    pub reason: Reason,

    /// Details about the evaluation
    pub details: String,

    /// Delegation that authorized the call (if any)
    pub delegation: Option<Delegation>,
}

/// What the gate does with a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Forward the call
    Allow,
    /// Abort the call
    Deny,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Allow => write!(f, "ALLOW"),
            Action::Deny => write!(f, "DENY"),
        }
    }
}

/// Reason for the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Allowed by DAO role
    Role,
    /// Allowed by a live delegation
    Delegation,
    /// Denied: caller has no delegation
    NoDelegation,
    /// Denied: caller's delegation has expired
    Expired,
    /// Denied by the delegation's checker
    CheckerDenied,
    /// Denied: the delegation's checker address holds no code
    CheckerMissing,
    /// Authorized, but the target aborted the forwarded call
    TargetFailed,
}

impl Decision {
    pub fn allow(reason: Reason, details: impl Into<String>, delegation: Option<Delegation>) -> Self {
        Self {
            action: Action::Allow,
            reason,
            details: details.into(),
            delegation,
        }
    }

    pub fn deny(reason: Reason, details: impl Into<String>) -> Self {
        Self {
            action: Action::Deny,
            reason,
            details: details.into(),
            delegation: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    /// Checker that must approve before forwarding, if any
    pub fn checker(&self) -> Option<Address> {
        self.delegation
            .map(|d| d.checker)
            .filter(|checker| !checker.is_zero())
    }

    /// Expiry of the authorizing delegation
    pub fn expiry(&self) -> Option<U256> {
        self.delegation.map(|d| d.expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_skips_null_address() {
        let granted = Decision::allow(
            Reason::Delegation,
            "selector grant",
            Some(Delegation::new(U256::from(10), Address::ZERO)),
        );
        assert_eq!(granted.checker(), None);
        assert_eq!(granted.expiry(), Some(U256::from(10)));

        let denied = Decision::deny(Reason::Expired, "expired");
        assert!(!denied.is_allowed());
        assert_eq!(serde_json::to_string(&denied.action).unwrap(), "\"deny\"");
    }
}
