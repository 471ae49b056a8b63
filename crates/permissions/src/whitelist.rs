//! Address whitelists scoped by namespace key

use crate::error::PermissionError;
use gatekeep_core::{Address, NamespaceKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Set membership of addresses, one set per namespace key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    entries: HashMap<NamespaceKey, HashSet<Address>>,
}

impl Whitelist {
    /// Create an empty whitelist
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelist `address` under `key`
    ///
    /// Fails if the address is already present, unless `override_existing`.
    pub fn add(
        &mut self,
        key: NamespaceKey,
        address: Address,
        override_existing: bool,
    ) -> Result<(), PermissionError> {
        if !override_existing && self.is_whitelisted(&key, &address) {
            return Err(PermissionError::AlreadyWhitelisted);
        }
        self.entries.entry(key).or_default().insert(address);
        tracing::debug!(%key, %address, "address whitelisted");
        Ok(())
    }

    /// Whitelist every address in `addresses` under `key`
    ///
    /// Applies `add` semantics to each address. Without override, a batch
    /// that repeats an address, or names one already present, fails as a
    /// whole and nothing is inserted.
    pub fn add_multiple(
        &mut self,
        key: NamespaceKey,
        addresses: &[Address],
        override_existing: bool,
    ) -> Result<(), PermissionError> {
        if addresses.is_empty() {
            return Err(PermissionError::NoAddresses);
        }

        if !override_existing {
            let mut seen = HashSet::with_capacity(addresses.len());
            for address in addresses {
                if self.is_whitelisted(&key, address) || !seen.insert(*address) {
                    return Err(PermissionError::AlreadyWhitelisted);
                }
            }
        }

        let set = self.entries.entry(key).or_default();
        set.extend(addresses.iter().copied());
        tracing::debug!(%key, count = addresses.len(), "addresses whitelisted");
        Ok(())
    }

    /// Remove `address` from the whitelist under `key`
    pub fn remove(&mut self, key: NamespaceKey, address: Address) -> Result<(), PermissionError> {
        let removed = self
            .entries
            .get_mut(&key)
            .map_or(false, |set| set.remove(&address));
        if !removed {
            return Err(PermissionError::NotWhitelisted);
        }
        if self.entries.get(&key).map_or(false, HashSet::is_empty) {
            self.entries.remove(&key);
        }
        tracing::debug!(%key, %address, "address removed from whitelist");
        Ok(())
    }

    /// Assert that `address` is whitelisted under `key`
    pub fn check(&self, key: &NamespaceKey, address: &Address) -> Result<(), PermissionError> {
        if self.is_whitelisted(key, address) {
            Ok(())
        } else {
            Err(PermissionError::NotWhitelisted)
        }
    }

    /// Membership read accessor
    pub fn is_whitelisted(&self, key: &NamespaceKey, address: &Address) -> bool {
        self.entries
            .get(key)
            .map_or(false, |set| set.contains(address))
    }

    /// All members under `key`, sorted
    pub fn members(&self, key: &NamespaceKey) -> Vec<Address> {
        let mut members: Vec<Address> = self
            .entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(label: &str) -> NamespaceKey {
        NamespaceKey::from_label(label)
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    #[test]
    fn test_add_then_check() {
        let mut wl = Whitelist::new();
        wl.add(key("test_whitelist"), addr("alice"), false).unwrap();

        assert!(wl.is_whitelisted(&key("test_whitelist"), &addr("alice")));
        assert!(wl.check(&key("test_whitelist"), &addr("alice")).is_ok());
    }

    #[test]
    fn test_add_existing_without_override() {
        let mut wl = Whitelist::new();
        wl.add(key("test_existing"), addr("alice"), false).unwrap();

        assert_eq!(
            wl.add(key("test_existing"), addr("alice"), false),
            Err(PermissionError::AlreadyWhitelisted)
        );
    }

    #[test]
    fn test_add_existing_with_override() {
        let mut wl = Whitelist::new();
        wl.add(key("test_override"), addr("alice"), false).unwrap();
        wl.add(key("test_override"), addr("alice"), true).unwrap();

        assert!(wl.is_whitelisted(&key("test_override"), &addr("alice")));
    }

    #[test]
    fn test_add_multiple() {
        let mut wl = Whitelist::new();
        let addrs: Vec<Address> = (0..5).map(|i| addr(&format!("user{}", i))).collect();
        wl.add_multiple(key("test_multiple"), &addrs, false).unwrap();

        for a in &addrs {
            assert!(wl.is_whitelisted(&key("test_multiple"), a));
        }
        assert_eq!(wl.members(&key("test_multiple")).len(), 5);
    }

    #[test]
    fn test_add_multiple_empty() {
        let mut wl = Whitelist::new();
        assert_eq!(
            wl.add_multiple(key("test_empty"), &[], false),
            Err(PermissionError::NoAddresses)
        );
        assert_eq!(
            wl.add_multiple(key("test_empty"), &[], true),
            Err(PermissionError::NoAddresses)
        );
    }

    #[test]
    fn test_add_multiple_duplicates() {
        let mut wl = Whitelist::new();
        let a = addr("dup");

        assert_eq!(
            wl.add_multiple(key("test_duplicates"), &[a, addr("other"), a], false),
            Err(PermissionError::AlreadyWhitelisted)
        );
        // Nothing from the failed batch was kept
        assert!(!wl.is_whitelisted(&key("test_duplicates"), &addr("other")));

        wl.add_multiple(key("test_duplicates"), &[a, a], true).unwrap();
        assert!(wl.is_whitelisted(&key("test_duplicates"), &a));
    }

    #[test]
    fn test_remove() {
        let mut wl = Whitelist::new();
        wl.add(key("test_remove"), addr("alice"), false).unwrap();
        wl.remove(key("test_remove"), addr("alice")).unwrap();

        assert_eq!(
            wl.check(&key("test_remove"), &addr("alice")),
            Err(PermissionError::NotWhitelisted)
        );
        assert_eq!(
            wl.remove(key("test_remove"), addr("alice")),
            Err(PermissionError::NotWhitelisted)
        );
    }

    #[test]
    fn test_remove_non_whitelisted() {
        let mut wl = Whitelist::new();
        assert_eq!(
            wl.remove(key("never"), addr("alice")),
            Err(PermissionError::NotWhitelisted)
        );
    }

    #[test]
    fn test_keys_are_isolated() {
        let mut wl = Whitelist::new();
        wl.add(key("key_a"), addr("alice"), false).unwrap();

        assert_eq!(
            wl.check(&key("key_b"), &addr("alice")),
            Err(PermissionError::NotWhitelisted)
        );
    }

    #[test]
    fn test_add_zero_address() {
        let mut wl = Whitelist::new();
        wl.add(key("test_zero"), Address::ZERO, false).unwrap();

        assert!(wl.check(&key("test_zero"), &Address::ZERO).is_ok());
        assert_eq!(
            wl.add(key("test_zero"), Address::ZERO, false),
            Err(PermissionError::AlreadyWhitelisted)
        );
        wl.remove(key("test_zero"), Address::ZERO).unwrap();
        assert!(!wl.is_whitelisted(&key("test_zero"), &Address::ZERO));
    }

    #[test]
    fn test_serde_preserves_membership() {
        let mut wl = Whitelist::new();
        wl.add_multiple(key("ops"), &[addr("alice"), addr("bob")], false).unwrap();
        wl.add(key("treasury"), Address::ZERO, false).unwrap();

        let json = serde_json::to_string(&wl).unwrap();
        let back: Whitelist = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wl);
        assert_eq!(back.members(&key("ops")), wl.members(&key("ops")));
        assert!(back.check(&key("treasury"), &Address::ZERO).is_ok());
    }

    #[test]
    fn test_error_strings() {
        assert_eq!(
            PermissionError::AlreadyWhitelisted.to_string(),
            "address already whitelisted"
        );
        assert_eq!(PermissionError::NotWhitelisted.to_string(), "address not whitelisted");
        assert_eq!(PermissionError::NoAddresses.to_string(), "no addresses provided");
    }
}
