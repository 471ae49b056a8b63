//! Permission primitives
//!
//! Three independent rule stores, each a flat map from a `NamespaceKey` to
//! its entries:
//!
//! - [`Whitelist`]: set membership of addresses
//! - [`Cooldowns`]: a single-slot rate limiter (start + duration)
//! - [`Intervals`]: an inclusive numeric range
//!
//! Stores are plain data. Every operation validates before it mutates, so a
//! failed call leaves the store exactly as it was and a store can be used
//! re-entrantly from nested checker calls. Failures carry the fixed reason
//! strings of [`PermissionError`], which convert into a `Revert` when a
//! checker aborts.

pub mod cooldown;
pub mod error;
pub mod interval;
pub mod whitelist;

pub use cooldown::{Cooldown, Cooldowns};
pub use error::PermissionError;
pub use interval::{Interval, Intervals};
pub use whitelist::Whitelist;
