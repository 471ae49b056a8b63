//! Value types shared by every gatekeep crate
//!
//! Addresses, function selectors and namespace keys are fixed-size byte
//! strings rendered as `0x`-prefixed hex. 256-bit quantities come from
//! `primitive-types`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use primitive_types::U256;

/// Raw call data or return data
pub type Bytes = Vec<u8>;

/// Errors when parsing hex-encoded identifiers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseIdError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)?;
    bytes.as_slice().try_into().map_err(|_| ParseIdError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

macro_rules! hex_id {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Wrap raw bytes
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// True for the all-zero value
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// A 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

hex_id!(Address, 20);

impl Address {
    /// The null address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Address whose low eight bytes hold `n` big-endian
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Address stored in the low 20 bytes of a 32-byte word
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Self(bytes)
    }

    /// Left-pad into a 32-byte word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Derive a stable address from a label (test accounts, named actors)
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }
}

/// A 4-byte function selector (the leading bytes of call data)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Selector([u8; 4]);

hex_id!(Selector, 4);

impl Selector {
    /// Selector of a call, if the data is long enough to carry one
    pub fn of(data: &[u8]) -> Option<Self> {
        data.get(..4)
            .and_then(|s| s.try_into().ok())
            .map(Self)
    }
}

/// An opaque 32-byte identifier scoping entries inside a permission store
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NamespaceKey([u8; 32]);

hex_id!(NamespaceKey, 32);

impl NamespaceKey {
    /// Key derived by hashing a human-readable label
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

/// Encode a `U256` as a big-endian 32-byte word
pub fn u256_to_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr: Address = "0xC907ba505C2E1cbc4658c395d4a2c7E6d2c32656".parse().unwrap();
        assert_eq!(
            addr.to_string(),
            "0xc907ba505c2e1cbc4658c395d4a2c7e6d2c32656"
        );
        assert!(!addr.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn test_address_wrong_length() {
        let err = "0x1234".parse::<Address>().unwrap_err();
        assert_eq!(err, ParseIdError::Length { expected: 20, actual: 2 });
    }

    #[test]
    fn test_address_word_padding() {
        let addr = Address::from_low_u64(42);
        let word = addr.to_word();
        assert_eq!(word[31], 42);
        assert_eq!(Address::from_word(&word), addr);
    }

    #[test]
    fn test_selector_of_short_data() {
        assert_eq!(Selector::of(&[1, 2, 3]), None);
        assert_eq!(
            Selector::of(&[0xde, 0xad, 0xbe, 0xef, 0x00]),
            Some(Selector::from_bytes([0xde, 0xad, 0xbe, 0xef]))
        );
    }

    #[test]
    fn test_namespace_key_from_label() {
        let a = NamespaceKey::from_label("test_cooldown");
        let b = NamespaceKey::from_label("test_cooldown");
        assert_eq!(a, b);
        assert_ne!(a, NamespaceKey::from_label("other"));
        assert!(NamespaceKey::default().is_zero());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let key = NamespaceKey::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: NamespaceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
