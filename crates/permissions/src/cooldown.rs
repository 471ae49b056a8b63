//! Single-slot cooldowns scoped by namespace key
//!
//! A cooldown is armed at `start` and expires once `now >= start + duration`.
//! `check_and_reset` asserts expiry and re-arms it at the current time.
//!
//! A key that was never added reads as `{ start: 0, duration: 0 }`, which is
//! always expired: `check_and_reset` on it passes and arms a zero-length
//! cooldown. Callers that rely on a cooldown being configured must add it
//! first.

use crate::error::PermissionError;
use gatekeep_core::{NamespaceKey, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86400;

/// A cooldown slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    /// When the cooldown was last armed
    pub start: u128,
    /// Seconds between resets
    pub duration: u128,
}

impl Cooldown {
    /// Whether the cooldown has run out at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        match self.start.checked_add(self.duration) {
            Some(end) => u128::from(now) >= end,
            None => false,
        }
    }

    /// Seconds left until expiry at `now`
    pub fn remaining(&self, now: u64) -> u128 {
        self.start
            .saturating_add(self.duration)
            .saturating_sub(u128::from(now))
    }
}

/// Cooldown slots, one per namespace key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldowns {
    entries: HashMap<NamespaceKey, Cooldown>,
}

impl Cooldowns {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a cooldown of `duration` seconds starting at `now`
    pub fn add(
        &mut self,
        key: NamespaceKey,
        duration: U256,
        override_existing: bool,
        now: u64,
    ) -> Result<(), PermissionError> {
        if duration.is_zero() {
            return Err(PermissionError::ZeroDuration);
        }
        if duration > U256::from(u128::MAX) {
            return Err(PermissionError::DurationTooLarge);
        }
        if !override_existing && self.exists(&key) {
            return Err(PermissionError::CooldownExists);
        }

        let cooldown = Cooldown {
            start: u128::from(now),
            duration: duration.low_u128(),
        };
        self.entries.insert(key, cooldown);
        tracing::debug!(%key, duration = cooldown.duration, "cooldown armed");
        Ok(())
    }

    /// `add` with the duration given in days
    pub fn add_from_days(
        &mut self,
        key: NamespaceKey,
        days: U256,
        override_existing: bool,
        now: u64,
    ) -> Result<(), PermissionError> {
        let duration = scale(days, SECONDS_PER_DAY)?;
        self.add(key, duration, override_existing, now)
    }

    /// `add` with the duration given in hours
    pub fn add_from_hours(
        &mut self,
        key: NamespaceKey,
        hours: U256,
        override_existing: bool,
        now: u64,
    ) -> Result<(), PermissionError> {
        let duration = scale(hours, SECONDS_PER_HOUR)?;
        self.add(key, duration, override_existing, now)
    }

    /// Assert the cooldown under `key` has expired, then re-arm it at `now`
    pub fn check_and_reset(&mut self, key: NamespaceKey, now: u64) -> Result<(), PermissionError> {
        let current = self.cooldowns(&key);
        if !current.is_expired(now) {
            tracing::debug!(%key, remaining = current.remaining(now), "cooldown not expired");
            return Err(PermissionError::CooldownNotExpired);
        }

        self.entries.insert(
            key,
            Cooldown {
                start: u128::from(now),
                duration: current.duration,
            },
        );
        Ok(())
    }

    /// Read accessor; unset keys read as the zero cooldown
    pub fn cooldowns(&self, key: &NamespaceKey) -> Cooldown {
        self.entries.get(key).copied().unwrap_or_default()
    }

    /// Whether a cooldown with a positive duration is configured
    pub fn exists(&self, key: &NamespaceKey) -> bool {
        self.cooldowns(key).duration != 0
    }
}

fn scale(amount: U256, factor: u64) -> Result<U256, PermissionError> {
    amount
        .checked_mul(U256::from(factor))
        .filter(|d| *d <= U256::from(u128::MAX))
        .ok_or(PermissionError::DurationTooLarge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;

    fn key(label: &str) -> NamespaceKey {
        NamespaceKey::from_label(label)
    }

    #[test]
    fn test_add_basic() {
        let mut store = Cooldowns::new();
        store.add(key("test_cooldown"), U256::from(3600), false, NOW).unwrap();

        let cd = store.cooldowns(&key("test_cooldown"));
        assert_eq!(cd.start, u128::from(NOW));
        assert_eq!(cd.duration, 3600);
    }

    #[test]
    fn test_add_zero_duration() {
        let mut store = Cooldowns::new();
        assert_eq!(
            store.add(key("test_cooldown"), U256::zero(), false, NOW),
            Err(PermissionError::ZeroDuration)
        );
    }

    #[test]
    fn test_add_duration_too_large() {
        let mut store = Cooldowns::new();
        let too_large = U256::from(u128::MAX) + U256::one();
        assert_eq!(
            store.add(key("test_cooldown"), too_large, false, NOW),
            Err(PermissionError::DurationTooLarge)
        );
        assert_eq!(
            store.add(key("test_cooldown"), U256::MAX, false, NOW),
            Err(PermissionError::DurationTooLarge)
        );
    }

    #[test]
    fn test_add_max_duration() {
        let mut store = Cooldowns::new();
        store
            .add(key("test_cooldown"), U256::from(u128::MAX), false, NOW)
            .unwrap();
        assert_eq!(store.cooldowns(&key("test_cooldown")).duration, u128::MAX);
    }

    #[test]
    fn test_add_existing() {
        let mut store = Cooldowns::new();
        store.add(key("test_cooldown"), U256::from(3600), false, NOW).unwrap();

        assert_eq!(
            store.add(key("test_cooldown"), U256::from(7200), false, NOW),
            Err(PermissionError::CooldownExists)
        );

        store.add(key("test_cooldown"), U256::from(7200), true, NOW + 5).unwrap();
        let cd = store.cooldowns(&key("test_cooldown"));
        assert_eq!(cd.start, u128::from(NOW + 5));
        assert_eq!(cd.duration, 7200);
    }

    #[test]
    fn test_add_empty_key() {
        let mut store = Cooldowns::new();
        store.add(NamespaceKey::default(), U256::from(3600), false, NOW).unwrap();
        assert_eq!(store.cooldowns(&NamespaceKey::default()).duration, 3600);
    }

    #[test]
    fn test_add_from_days_and_hours() {
        let mut store = Cooldowns::new();
        store.add_from_days(key("days"), U256::from(2), false, NOW).unwrap();
        store.add_from_hours(key("hours"), U256::from(3), false, NOW).unwrap();

        assert_eq!(store.cooldowns(&key("days")).duration, 2 * 86400);
        assert_eq!(store.cooldowns(&key("hours")).duration, 3 * 3600);
    }

    #[test]
    fn test_add_from_days_zero_and_overflow() {
        let mut store = Cooldowns::new();
        assert_eq!(
            store.add_from_days(key("days"), U256::zero(), false, NOW),
            Err(PermissionError::ZeroDuration)
        );

        // Fits 128 bits before scaling, overflows after
        let days = U256::from(u128::MAX / 86400 + 1);
        assert_eq!(
            store.add_from_days(key("days"), days, false, NOW),
            Err(PermissionError::DurationTooLarge)
        );
        assert_eq!(
            store.add_from_hours(key("hours"), U256::MAX, false, NOW),
            Err(PermissionError::DurationTooLarge)
        );
    }

    #[test]
    fn test_check_and_reset_before_and_at_expiry() {
        let mut store = Cooldowns::new();
        store.add(key("test_cooldown"), U256::from(3600), false, NOW).unwrap();

        assert_eq!(
            store.check_and_reset(key("test_cooldown"), NOW),
            Err(PermissionError::CooldownNotExpired)
        );
        assert_eq!(
            store.check_and_reset(key("test_cooldown"), NOW + 3599),
            Err(PermissionError::CooldownNotExpired)
        );

        store.check_and_reset(key("test_cooldown"), NOW + 3600).unwrap();
        let cd = store.cooldowns(&key("test_cooldown"));
        assert_eq!(cd.start, u128::from(NOW + 3600));
        assert_eq!(cd.duration, 3600);
    }

    #[test]
    fn test_check_and_reset_multiple_times() {
        let mut store = Cooldowns::new();
        store.add(key("test_multiple"), U256::from(1800), false, NOW).unwrap();

        let mut now = NOW;
        let mut starts = Vec::new();
        for _ in 0..3 {
            now += 1800;
            store.check_and_reset(key("test_multiple"), now).unwrap();
            starts.push(store.cooldowns(&key("test_multiple")).start);

            assert_eq!(
                store.check_and_reset(key("test_multiple"), now),
                Err(PermissionError::CooldownNotExpired)
            );
        }
        assert!(starts.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_check_and_reset_uninitialized_key() {
        let mut store = Cooldowns::new();
        store.check_and_reset(key("nonexistent"), NOW).unwrap();

        let cd = store.cooldowns(&key("nonexistent"));
        assert_eq!(cd.start, u128::from(NOW));
        assert_eq!(cd.duration, 0);
        // A zero-length cooldown is immediately expired again
        store.check_and_reset(key("nonexistent"), NOW).unwrap();
        // and does not count as configured
        store.add(key("nonexistent"), U256::from(60), false, NOW).unwrap();
    }

    #[test]
    fn test_serde_preserves_slots() {
        let mut store = Cooldowns::new();
        store.add(key("short"), U256::from(60), false, NOW).unwrap();
        store.add(key("forever"), U256::from(u128::MAX), false, NOW).unwrap();

        let json = serde_json::to_string(&store).unwrap();
        let mut back: Cooldowns = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
        assert_eq!(back.cooldowns(&key("forever")).duration, u128::MAX);

        back.check_and_reset(key("short"), NOW + 60).unwrap();
        assert_eq!(
            back.check_and_reset(key("forever"), NOW + 60),
            Err(PermissionError::CooldownNotExpired)
        );
    }

    proptest! {
        #[test]
        fn prop_add_round_trips(duration in 1u128..=u128::MAX, seed in any::<[u8; 32]>()) {
            let key = NamespaceKey::from_bytes(seed);
            let mut store = Cooldowns::new();
            store.add(key, U256::from(duration), false, NOW).unwrap();

            let cd = store.cooldowns(&key);
            prop_assert_eq!(cd.start, u128::from(NOW));
            prop_assert_eq!(cd.duration, duration);
        }

        #[test]
        fn prop_reset_after_expiry(duration in 1u64..=86400 * 365, extra in 0u64..=86400) {
            let mut store = Cooldowns::new();
            let key = key("fuzz");
            store.add(key, U256::from(duration), false, NOW).unwrap();

            let later = NOW + duration + extra;
            store.check_and_reset(key, later).unwrap();

            let cd = store.cooldowns(&key);
            prop_assert_eq!(cd.start, u128::from(later));
            prop_assert_eq!(cd.duration, u128::from(duration));
        }
    }
}
