//! Gatekeep - Time-bounded call delegation behind a forwarding proxy
//!
//! A proxy forwards every call it receives to one fixed target, but only
//! after deciding whether the caller may make it:
//!
//! - holders of `DAO_ROLE` pass straight through
//! - anyone else needs a live delegation (`expiry > now`)
//! - a delegation names a checker contract that sees the full call and may
//!   veto it
//!
//! Delegations are granted by the DAO and can be killed by the DAO or, in an
//! emergency, by holders of `EMERGENCY_ADMIN_ROLE`. Checkers are ordinary
//! contracts; the built-ins in [`checker`] are backed by the rule stores of
//! the `permissions` crate.

pub mod access;
pub mod audit;
pub mod checker;
pub mod config;
pub mod decision;
pub mod error;
pub mod gate;
pub mod registry;
pub mod state;

pub use access::{AccessControl, Role, DAO_ROLE, EMERGENCY_ADMIN_ROLE};
pub use audit::AuditLog;
pub use checker::{deploy_checker, Checker};
pub use config::GatekeepConfig;
pub use decision::{Action, Decision, Reason};
pub use error::ProxyError;
pub use gate::{Authorization, Proxy, ProxyParams, ProxyState};
pub use registry::{Delegation, DelegationRegistry, KeyMode};
pub use state::StateStore;
