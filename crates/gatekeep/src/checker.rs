//! Checker protocol and built-in checkers
//!
//! A checker is consulted by the gate before a delegated call is forwarded.
//! It receives the original call context (call data and attached value,
//! with the proxy as sender) on its default entry point. Returning normally
//! approves; aborting denies, and the abort reason reaches the caller as is.
//!
//! Primitive-backed checkers keep their store in host storage at their own
//! address, so a checker's whitelist, cooldowns or intervals are configured
//! with [`Host::storage_mut`] on the checker address.

use gatekeep_core::{Address, Bytes, Contract, Host, Message, NamespaceKey, Revert, U256};
use permissions::{Cooldowns, Intervals, Whitelist};
use std::sync::Arc;

/// Reason used by [`DenyAll`] unless told otherwise
pub const CHECKER_DENIED: &str = "Checker denied";

/// Reason used when a checker cannot read the value it was set up to inspect
pub const CHECKER_VALIDATION_FAILED: &str = "Checker validation failed";

/// Approves or denies a delegated call
pub trait Checker: Send + Sync {
    /// Approve by returning `Ok`, deny by aborting
    fn check(&self, host: &mut Host, call: &Message) -> Result<(), Revert>;
}

impl<F> Checker for F
where
    F: Fn(&mut Host, &Message) -> Result<(), Revert> + Send + Sync,
{
    fn check(&self, host: &mut Host, call: &Message) -> Result<(), Revert> {
        self(host, call)
    }
}

/// Deployable wrapper exposing a [`Checker`] as a contract's default entry point
pub struct CheckerContract<C>(pub C);

impl<C: Checker> Contract for CheckerContract<C> {
    fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert> {
        self.0.check(host, msg)?;
        Ok(Bytes::new())
    }
}

/// Install a checker at a fresh address
pub fn deploy_checker(host: &mut Host, checker: impl Checker + 'static) -> Address {
    host.deploy_arc(Arc::new(CheckerContract(checker)))
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Checker for AcceptAll {
    fn check(&self, _host: &mut Host, _call: &Message) -> Result<(), Revert> {
        Ok(())
    }
}

/// Denies everything with a fixed reason
#[derive(Debug, Clone)]
pub struct DenyAll {
    pub reason: String,
}

impl DenyAll {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DenyAll {
    fn default() -> Self {
        Self::new(CHECKER_DENIED)
    }
}

impl Checker for DenyAll {
    fn check(&self, _host: &mut Host, _call: &Message) -> Result<(), Revert> {
        Err(Revert::new(self.reason.clone()))
    }
}

/// A contract with no default entry point; any call to it aborts bare
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaultHandler;

impl Contract for NoDefaultHandler {
    fn call(&self, _host: &mut Host, _msg: &Message) -> Result<Bytes, Revert> {
        Err(Revert::silent())
    }
}

/// Which part of the call context a primitive-backed checker inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    /// Sender of the outermost frame
    Origin,
    /// Value attached to the call
    Value,
    /// A 32-byte argument word after the selector
    Word(usize),
}

impl Subject {
    fn address(&self, host: &Host, call: &Message) -> Result<Address, Revert> {
        let address = match self {
            Subject::Origin => host.origin(),
            Subject::Word(index) => call.address_arg(*index),
            Subject::Value => None,
        };
        address.ok_or_else(|| Revert::new(CHECKER_VALIDATION_FAILED))
    }

    fn uint(&self, host: &Host, call: &Message) -> Result<U256, Revert> {
        let value = match self {
            Subject::Value => Some(call.value),
            Subject::Word(index) => call.uint_arg(*index),
            Subject::Origin => host.origin().map(|a| U256::from_big_endian(&a.to_word())),
        };
        value.ok_or_else(|| Revert::new(CHECKER_VALIDATION_FAILED))
    }
}

/// Approves when the subject address is whitelisted under `key`
#[derive(Debug, Clone, Copy)]
pub struct WhitelistChecker {
    pub key: NamespaceKey,
    pub subject: Subject,
}

impl Checker for WhitelistChecker {
    fn check(&self, host: &mut Host, call: &Message) -> Result<(), Revert> {
        let address = self.subject.address(host, call)?;
        let whitelisted = host
            .storage::<Whitelist>(call.to)
            .map_or(false, |wl| wl.is_whitelisted(&self.key, &address));
        if whitelisted {
            Ok(())
        } else {
            tracing::debug!(checker = %call.to, %address, "whitelist checker denied");
            Err(permissions::PermissionError::NotWhitelisted.into())
        }
    }
}

/// Approves at most once per cooldown period under `key`
///
/// The cooldown is re-armed on approval. The re-arm is undone if the
/// forwarded call later aborts.
#[derive(Debug, Clone, Copy)]
pub struct CooldownChecker {
    pub key: NamespaceKey,
}

impl Checker for CooldownChecker {
    fn check(&self, host: &mut Host, call: &Message) -> Result<(), Revert> {
        let now = host.timestamp();
        host.storage_mut::<Cooldowns>(call.to)
            .check_and_reset(self.key, now)?;
        Ok(())
    }
}

/// Approves when the subject value lies within the interval under `key`
#[derive(Debug, Clone, Copy)]
pub struct IntervalChecker {
    pub key: NamespaceKey,
    pub subject: Subject,
}

impl Checker for IntervalChecker {
    fn check(&self, host: &mut Host, call: &Message) -> Result<(), Revert> {
        let value = self.subject.uint(host, call)?;
        match host.storage::<Intervals>(call.to) {
            Some(intervals) => intervals.check(&self.key, value)?,
            None => return Err(permissions::PermissionError::IntervalMissing.into()),
        }
        Ok(())
    }
}
