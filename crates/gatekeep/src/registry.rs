//! Delegation registry
//!
//! Maps a delegate to `{ expiry, checker }`. A delegation is live while
//! `expiry > now`; the zero entry means "no delegation" and is what a kill
//! leaves behind.
//!
//! Two keying modes exist:
//! - `PerDelegate` (default): one slot per delegate. The checker is mandatory
//!   and decides which calls are acceptable by inspecting call data.
//! - `PerSelector`: one slot per `(selector, delegate)`. The checker may be
//!   the null address, meaning the selector alone is the grant.
//!
//! Privilege checks belong to the gate; the registry only validates entries.

use crate::error::ProxyError;
use gatekeep_core::{Address, Selector, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How delegations are keyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    #[default]
    PerDelegate,
    PerSelector,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::PerDelegate => write!(f, "per_delegate"),
            KeyMode::PerSelector => write!(f, "per_selector"),
        }
    }
}

/// A time-bounded grant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Exclusive end of validity
    pub expiry: U256,
    /// Contract consulted before each forwarded call
    pub checker: Address,
}

impl Delegation {
    pub fn new(expiry: U256, checker: Address) -> Self {
        Self { expiry, checker }
    }

    /// Live iff `expiry > now`
    pub fn is_live(&self, now: u64) -> bool {
        self.expiry > U256::from(now)
    }

    /// The zero entry
    pub fn is_empty(&self) -> bool {
        self.expiry.is_zero() && self.checker.is_zero()
    }

    /// `(expiry, checker)` as returned by the read accessor
    pub fn as_tuple(&self) -> (U256, Address) {
        (self.expiry, self.checker)
    }
}

/// A registry row, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationEntry {
    pub selector: Option<Selector>,
    pub delegate: Address,
    pub delegation: Delegation,
}

/// Storage for delegations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRegistry {
    mode: KeyMode,
    #[serde(default)]
    by_delegate: HashMap<Address, Delegation>,
    #[serde(default)]
    by_selector: HashMap<Selector, HashMap<Address, Delegation>>,
}

impl DelegationRegistry {
    /// Create an empty registry
    pub fn new(mode: KeyMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Keying mode
    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    fn validate(&self, delegate: &Address, expiry: U256, now: u64) -> Result<(), ProxyError> {
        if delegate.is_zero() {
            return Err(ProxyError::ZeroDelegate);
        }
        if expiry <= U256::from(now) {
            return Err(ProxyError::ExpiryNotInFuture);
        }
        Ok(())
    }

    /// Store a per-delegate delegation, replacing any previous one
    pub fn set(
        &mut self,
        delegate: Address,
        delegation: Delegation,
        now: u64,
    ) -> Result<(), ProxyError> {
        if self.mode != KeyMode::PerDelegate {
            return Err(ProxyError::ModeMismatch);
        }
        self.validate(&delegate, delegation.expiry, now)?;
        if delegation.checker.is_zero() {
            return Err(ProxyError::ZeroChecker);
        }

        self.by_delegate.insert(delegate, delegation);
        Ok(())
    }

    /// Store a per-selector delegation; a null checker skips the check step
    pub fn set_for_selector(
        &mut self,
        selector: Selector,
        delegate: Address,
        delegation: Delegation,
        now: u64,
    ) -> Result<(), ProxyError> {
        if self.mode != KeyMode::PerSelector {
            return Err(ProxyError::ModeMismatch);
        }
        self.validate(&delegate, delegation.expiry, now)?;

        self.by_selector
            .entry(selector)
            .or_default()
            .insert(delegate, delegation);
        Ok(())
    }

    /// Reset a delegation to the zero entry, returning what was there
    ///
    /// `selector` only matters in per-selector mode. Killing a delegation
    /// that does not exist is not an error.
    pub fn kill(&mut self, selector: Selector, delegate: &Address) -> Option<Delegation> {
        match self.mode {
            KeyMode::PerDelegate => self.by_delegate.remove(delegate),
            KeyMode::PerSelector => {
                let slots = self.by_selector.get_mut(&selector)?;
                let removed = slots.remove(delegate);
                if slots.is_empty() {
                    self.by_selector.remove(&selector);
                }
                removed
            }
        }
    }

    /// Per-delegate read accessor
    pub fn get(&self, delegate: &Address) -> Delegation {
        self.by_delegate.get(delegate).copied().unwrap_or_default()
    }

    /// Per-selector read accessor
    pub fn get_for_selector(&self, selector: &Selector, delegate: &Address) -> Delegation {
        self.by_selector
            .get(selector)
            .and_then(|slots| slots.get(delegate))
            .copied()
            .unwrap_or_default()
    }

    /// The delegation that governs a call with `selector` from `delegate`
    pub fn lookup(&self, selector: &Selector, delegate: &Address) -> Delegation {
        match self.mode {
            KeyMode::PerDelegate => self.get(delegate),
            KeyMode::PerSelector => self.get_for_selector(selector, delegate),
        }
    }

    /// All stored delegations, ordered by selector then delegate
    pub fn entries(&self) -> Vec<DelegationEntry> {
        let mut entries: Vec<DelegationEntry> = self
            .by_delegate
            .iter()
            .map(|(delegate, delegation)| DelegationEntry {
                selector: None,
                delegate: *delegate,
                delegation: *delegation,
            })
            .chain(self.by_selector.iter().flat_map(|(selector, slots)| {
                slots.iter().map(move |(delegate, delegation)| DelegationEntry {
                    selector: Some(*selector),
                    delegate: *delegate,
                    delegation: *delegation,
                })
            }))
            .collect();
        entries.sort_by(|a, b| (a.selector, a.delegate).cmp(&(b.selector, b.delegate)));
        entries
    }

    /// Number of delegations live at `now`
    pub fn live_count(&self, now: u64) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.delegation.is_live(now))
            .count()
    }
}
