//! Forwarding gate
//!
//! The proxy contract. Every call it receives goes through, in order:
//!
//! 1. Role bypass: a caller holding `DAO_ROLE` is authorized outright.
//! 2. Delegation lookup: otherwise the caller needs a live delegation
//!    (`expiry > now`), or the call aborts with the missing-role error.
//! 3. Checker: the delegation's checker is consulted with the original call
//!    data and value. Its abort reason reaches the caller unchanged.
//!    A checker address without code denies the call with "checker has no
//!    code", even though a plain call to such an address would succeed.
//! 4. Forwarding: call data and value go to the fixed target; the target's
//!    return data (up to `max_outsize` bytes) or abort is relayed.
//!
//! There is no reentrancy lock. A checker or target that calls back into the
//! proxy is evaluated again from step 1 as a fresh caller.

use crate::access::{AccessControl, Role, DAO_ROLE, EMERGENCY_ADMIN_ROLE};
use crate::audit::{AuditEntry, AuditLog};
use crate::decision::{Action, Decision, Reason};
use crate::error::ProxyError;
use crate::registry::{Delegation, DelegationRegistry, KeyMode};
use gatekeep_core::{Address, Bytes, Contract, Host, Message, Revert, Selector, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default ceiling on relayed return data, in bytes
pub const DEFAULT_MAX_OUTSIZE: usize = 262_144;

/// Deployment parameters of a proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyParams {
    /// Fixed forwardee
    pub target: Address,
    /// Initial holder of `DAO_ROLE`
    pub dao: Address,
    /// Initial holders of `EMERGENCY_ADMIN_ROLE`
    pub emergency_admins: Vec<Address>,
    /// Return data ceiling
    pub max_outsize: usize,
    /// Delegation keying
    pub mode: KeyMode,
}

impl ProxyParams {
    pub fn new(target: Address, dao: Address) -> Self {
        Self {
            target,
            dao,
            emergency_admins: Vec::new(),
            max_outsize: DEFAULT_MAX_OUTSIZE,
            mode: KeyMode::default(),
        }
    }

    pub fn with_emergency_admin(mut self, admin: Address) -> Self {
        self.emergency_admins.push(admin);
        self
    }

    pub fn with_max_outsize(mut self, max_outsize: usize) -> Self {
        self.max_outsize = max_outsize;
        self
    }

    pub fn with_mode(mut self, mode: KeyMode) -> Self {
        self.mode = mode;
        self
    }
}

/// What steps 1-2 granted a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Caller holds `DAO_ROLE`
    Role,
    /// Caller holds a live delegation
    Delegation { expiry: U256, checker: Address },
}

/// Roles and delegations of one proxy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyState {
    pub roles: AccessControl,
    pub delegations: DelegationRegistry,
}

impl ProxyState {
    /// Initial state for a freshly deployed proxy
    pub fn new(params: &ProxyParams) -> Self {
        let mut roles = AccessControl::new();
        roles.grant_role(DAO_ROLE, params.dao);
        for admin in &params.emergency_admins {
            roles.grant_role(EMERGENCY_ADMIN_ROLE, *admin);
        }
        Self {
            roles,
            delegations: DelegationRegistry::new(params.mode),
        }
    }

    /// Run `caller` through the role and delegation steps
    pub fn evaluate(&self, caller: &Address, selector: &Selector, now: u64) -> Decision {
        if self.roles.has_role(DAO_ROLE, caller) {
            return Decision::allow(Reason::Role, format!("{} holds {}", caller, DAO_ROLE), None);
        }

        let delegation = self.delegations.lookup(selector, caller);
        if delegation.expiry.is_zero() {
            return Decision::deny(Reason::NoDelegation, format!("no delegation for {}", caller));
        }
        if !delegation.is_live(now) {
            return Decision::deny(
                Reason::Expired,
                format!("delegation for {} expired at {}", caller, delegation.expiry),
            );
        }

        let details = if delegation.checker.is_zero() {
            format!("live until {}, no checker", delegation.expiry)
        } else {
            format!("live until {}, checker {}", delegation.expiry, delegation.checker)
        };
        Decision::allow(Reason::Delegation, details, Some(delegation))
    }

    /// Steps 1-2 as a result
    pub fn authorize(
        &self,
        caller: &Address,
        selector: &Selector,
        now: u64,
    ) -> Result<Authorization, ProxyError> {
        let decision = self.evaluate(caller, selector, now);
        match (decision.action, decision.delegation) {
            (Action::Deny, _) => Err(ProxyError::MissingRole),
            (Action::Allow, None) => Ok(Authorization::Role),
            (Action::Allow, Some(d)) => Ok(Authorization::Delegation {
                expiry: d.expiry,
                checker: d.checker,
            }),
        }
    }
}

/// Code installed at a proxy address
struct ProxyCode {
    target: Address,
    max_outsize: usize,
    audit: Option<Arc<AuditLog>>,
}

impl ProxyCode {
    fn record(&self, host: &Host, msg: &Message, decision: &Decision) {
        tracing::debug!(
            proxy = %msg.to,
            caller = %msg.sender,
            action = %decision.action,
            reason = ?decision.reason,
            "{}",
            decision.details
        );
        if let Some(audit) = &self.audit {
            let entry = AuditEntry::from_decision(decision, msg, host.timestamp());
            if let Err(err) = audit.log(&entry) {
                tracing::warn!(error = %err, "failed to write audit entry");
            }
        }
    }

    fn consult_checker(&self, host: &mut Host, msg: &Message, checker: Address) -> Result<(), ProxyError> {
        if !host.has_code(&checker) {
            return Err(ProxyError::CheckerHasNoCode);
        }
        let query = Message::new(msg.to, checker, msg.data.clone()).with_value(msg.value);
        host.consult(&query).map_err(ProxyError::Checker)?;
        Ok(())
    }

    fn forward(&self, host: &mut Host, msg: &Message) -> Result<Bytes, ProxyError> {
        let forwarded = Message::new(msg.to, self.target, msg.data.clone()).with_value(msg.value);
        let mut out = host.call(&forwarded).map_err(ProxyError::Target)?;
        if out.len() > self.max_outsize {
            tracing::warn!(
                proxy = %msg.to,
                len = out.len(),
                max_outsize = self.max_outsize,
                "return data truncated"
            );
            out.truncate(self.max_outsize);
        }
        Ok(out)
    }

    fn handle(&self, host: &mut Host, msg: &Message) -> Result<Bytes, ProxyError> {
        let selector = msg.selector().unwrap_or_default();
        let now = host.timestamp();
        let decision = host
            .storage::<ProxyState>(msg.to)
            .map(|state| state.evaluate(&msg.sender, &selector, now))
            .unwrap_or_else(|| Decision::deny(Reason::NoDelegation, "proxy has no state"));

        if !decision.is_allowed() {
            self.record(host, msg, &decision);
            return Err(ProxyError::MissingRole);
        }

        if let Some(checker) = decision.checker() {
            if let Err(err) = self.consult_checker(host, msg, checker) {
                let denial = match &err {
                    ProxyError::CheckerHasNoCode => {
                        Decision::deny(Reason::CheckerMissing, format!("{} has no code", checker))
                    }
                    other => Decision::deny(Reason::CheckerDenied, other.to_string()),
                };
                self.record(host, msg, &Decision { delegation: decision.delegation, ..denial });
                return Err(err);
            }
        }

        match self.forward(host, msg) {
            Ok(out) => {
                self.record(host, msg, &decision);
                Ok(out)
            }
            Err(err) => {
                let failed = Decision::deny(Reason::TargetFailed, err.to_string());
                self.record(host, msg, &Decision { delegation: decision.delegation, ..failed });
                Err(err)
            }
        }
    }
}

impl Contract for ProxyCode {
    fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert> {
        Ok(self.handle(host, msg)?)
    }
}

/// Handle on a deployed proxy
///
/// Administrative operations run in their own host frame with `sender` as
/// the caller, so a failed validation leaves no trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proxy {
    address: Address,
}

impl Proxy {
    /// Install a proxy and grant its initial roles
    pub fn deploy(host: &mut Host, params: &ProxyParams) -> Self {
        Self::deploy_with_audit(host, params, None)
    }

    /// Install a proxy that records every decision to `audit`
    pub fn deploy_with_audit(host: &mut Host, params: &ProxyParams, audit: Option<Arc<AuditLog>>) -> Self {
        let address = host.deploy(ProxyCode {
            target: params.target,
            max_outsize: params.max_outsize,
            audit,
        });
        host.set_storage(address, ProxyState::new(params));
        tracing::info!(proxy = %address, target = %params.target, mode = %params.mode, "proxy deployed");
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Call the proxy as `sender`
    pub fn call(&self, host: &mut Host, sender: Address, data: impl Into<Bytes>) -> Result<Bytes, Revert> {
        host.call(&Message::new(sender, self.address, data))
    }

    /// Call the proxy as `sender` with native value attached
    pub fn call_with_value(
        &self,
        host: &mut Host,
        sender: Address,
        data: impl Into<Bytes>,
        value: U256,
    ) -> Result<Bytes, Revert> {
        host.call(&Message::new(sender, self.address, data).with_value(value))
    }

    fn admin<T>(
        &self,
        host: &mut Host,
        sender: Address,
        f: impl FnOnce(&mut ProxyState, u64) -> Result<T, ProxyError>,
    ) -> Result<T, ProxyError> {
        let proxy = self.address;
        host.transact(sender, |host| {
            let now = host.timestamp();
            f(host.storage_mut::<ProxyState>(proxy), now)
        })
    }

    /// Grant or overwrite the delegation of `delegate`. Requires `DAO_ROLE`.
    pub fn set_delegation(
        &self,
        host: &mut Host,
        sender: Address,
        delegate: Address,
        expiry: U256,
        checker: Address,
    ) -> Result<(), ProxyError> {
        self.admin(host, sender, |state, now| {
            state.roles.check_role(DAO_ROLE, &sender)?;
            state
                .delegations
                .set(delegate, Delegation::new(expiry, checker), now)?;
            tracing::info!(%delegate, %expiry, %checker, "delegation set");
            Ok(())
        })
    }

    /// Grant or overwrite the delegation of `delegate` for one selector.
    /// Requires `DAO_ROLE`; a null checker skips the checker step.
    pub fn set_selector_delegation(
        &self,
        host: &mut Host,
        sender: Address,
        selector: Selector,
        delegate: Address,
        expiry: U256,
        checker: Address,
    ) -> Result<(), ProxyError> {
        self.admin(host, sender, |state, now| {
            state.roles.check_role(DAO_ROLE, &sender)?;
            state
                .delegations
                .set_for_selector(selector, delegate, Delegation::new(expiry, checker), now)?;
            tracing::info!(%selector, %delegate, %expiry, %checker, "selector delegation set");
            Ok(())
        })
    }

    /// Reset a delegation. Requires `DAO_ROLE`.
    pub fn kill_delegation(
        &self,
        host: &mut Host,
        sender: Address,
        selector: Selector,
        delegate: Address,
    ) -> Result<(), ProxyError> {
        self.kill_as(host, sender, DAO_ROLE, selector, delegate)
    }

    /// Reset a delegation. Requires `EMERGENCY_ADMIN_ROLE`.
    pub fn emergency_kill_delegation(
        &self,
        host: &mut Host,
        sender: Address,
        selector: Selector,
        delegate: Address,
    ) -> Result<(), ProxyError> {
        self.kill_as(host, sender, EMERGENCY_ADMIN_ROLE, selector, delegate)
    }

    fn kill_as(
        &self,
        host: &mut Host,
        sender: Address,
        role: Role,
        selector: Selector,
        delegate: Address,
    ) -> Result<(), ProxyError> {
        self.admin(host, sender, |state, _| {
            state.roles.check_role(role, &sender)?;
            if state.delegations.kill(selector, &delegate).is_some() {
                tracing::info!(%delegate, %selector, by = %role, "delegation killed");
            }
            Ok(())
        })
    }

    /// `(expiry, checker)` of `delegate`; zeros when absent
    pub fn delegations(&self, host: &Host, delegate: &Address) -> (U256, Address) {
        host.storage::<ProxyState>(self.address)
            .map(|state| state.delegations.get(delegate).as_tuple())
            .unwrap_or_default()
    }

    /// `(expiry, checker)` of `delegate` for `selector`; zeros when absent
    pub fn selector_delegations(&self, host: &Host, selector: &Selector, delegate: &Address) -> (U256, Address) {
        host.storage::<ProxyState>(self.address)
            .map(|state| state.delegations.get_for_selector(selector, delegate).as_tuple())
            .unwrap_or_default()
    }

    /// Grant `role` to `account`. Requires the role's admin role.
    pub fn grant_role(
        &self,
        host: &mut Host,
        sender: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, ProxyError> {
        self.admin(host, sender, |state, _| {
            state.roles.check_role(role.admin(), &sender)?;
            Ok(state.roles.grant_role(role, account))
        })
    }

    /// Revoke `role` from `account`. Requires the role's admin role.
    pub fn revoke_role(
        &self,
        host: &mut Host,
        sender: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, ProxyError> {
        self.admin(host, sender, |state, _| {
            state.roles.check_role(role.admin(), &sender)?;
            Ok(state.roles.revoke_role(role, &account))
        })
    }

    pub fn has_role(&self, host: &Host, role: Role, account: &Address) -> bool {
        host.storage::<ProxyState>(self.address)
            .map_or(false, |state| state.roles.has_role(role, account))
    }

    /// Dry-run steps 1-2 for `caller` sending `data` at the current time
    pub fn evaluate(&self, host: &Host, caller: &Address, data: &[u8]) -> Decision {
        let selector = Selector::of(data).unwrap_or_default();
        match host.storage::<ProxyState>(self.address) {
            Some(state) => state.evaluate(caller, &selector, host.timestamp()),
            None => Decision::deny(Reason::NoDelegation, "proxy has no state"),
        }
    }

    /// Steps 1-2 for `caller` calling `selector` at the current time
    pub fn authorize(
        &self,
        host: &Host,
        caller: &Address,
        selector: &Selector,
    ) -> Result<Authorization, ProxyError> {
        match host.storage::<ProxyState>(self.address) {
            Some(state) => state.authorize(caller, selector, host.timestamp()),
            None => Err(ProxyError::MissingRole),
        }
    }

    /// Current roles and delegations
    pub fn state(&self, host: &Host) -> Option<ProxyState> {
        host.storage::<ProxyState>(self.address).cloned()
    }

    /// Replace roles and delegations, e.g. from a persisted snapshot
    pub fn restore_state(&self, host: &mut Host, state: ProxyState) {
        host.set_storage(self.address, state);
    }
}
