//! Inclusive numeric intervals scoped by namespace key

use crate::error::PermissionError;
use gatekeep_core::{NamespaceKey, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inclusive range `[lb, ub]` with `lb <= ub`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub lb: U256,
    pub ub: U256,
}

impl Interval {
    /// Whether `value` lies within the bounds
    pub fn contains(&self, value: U256) -> bool {
        self.lb <= value && value <= self.ub
    }

    /// Whether the interval admits exactly one value
    pub fn is_singleton(&self) -> bool {
        self.lb == self.ub
    }
}

/// Intervals, one per namespace key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervals {
    entries: HashMap<NamespaceKey, Interval>,
}

impl Intervals {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `[lb, ub]` under `key`
    pub fn add(
        &mut self,
        key: NamespaceKey,
        lb: U256,
        ub: U256,
        override_existing: bool,
    ) -> Result<(), PermissionError> {
        if lb > ub {
            return Err(PermissionError::InvertedRange);
        }
        if !override_existing && self.entries.contains_key(&key) {
            return Err(PermissionError::IntervalExists);
        }
        self.entries.insert(key, Interval { lb, ub });
        tracing::debug!(%key, %lb, %ub, "interval stored");
        Ok(())
    }

    /// Store the single-value interval `[value, value]`
    pub fn add_singleton(
        &mut self,
        key: NamespaceKey,
        value: U256,
        override_existing: bool,
    ) -> Result<(), PermissionError> {
        self.add(key, value, value, override_existing)
    }

    /// Assert that `value` lies within the interval under `key`
    ///
    /// A key that was never added fails with its own reason rather than
    /// being treated as an empty or unbounded range.
    pub fn check(&self, key: &NamespaceKey, value: U256) -> Result<(), PermissionError> {
        let interval = self.get(key).ok_or(PermissionError::IntervalMissing)?;
        if interval.contains(value) {
            Ok(())
        } else {
            Err(PermissionError::OutOfInterval)
        }
    }

    /// The interval under `key`, if any
    pub fn get(&self, key: &NamespaceKey) -> Option<&Interval> {
        self.entries.get(key)
    }

    /// Read accessor returning `(lb, ub)`; unset keys read as `(0, 0)`
    pub fn intervals(&self, key: &NamespaceKey) -> (U256, U256) {
        self.get(key)
            .map(|i| (i.lb, i.ub))
            .unwrap_or_default()
    }
}
