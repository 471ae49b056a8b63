//! Gatekeep Core - Shared types and the execution host for gatekeep crates
//!
//! Everything here is domain-neutral: addresses and keys, the `Revert`
//! abort type, a synchronous call-frame host with rollback, and the standard
//! on-disk locations used by the CLI.

pub mod host;
pub mod paths;
pub mod revert;
pub mod types;

pub use host::{Contract, Host, Message, MAX_CALL_DEPTH};
pub use paths::Paths;
pub use revert::{ensure, Revert};
pub use types::{u256_to_word, Address, Bytes, NamespaceKey, ParseIdError, Selector, U256};
