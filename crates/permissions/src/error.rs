//! Validation failures raised by the permission stores

use gatekeep_core::Revert;
use thiserror::Error;

/// Errors returned by whitelist, cooldown and interval operations
///
/// The display strings are part of the external contract: checkers relay
/// them verbatim to the original caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionError {
    #[error("address already whitelisted")]
    AlreadyWhitelisted,

    #[error("address not whitelisted")]
    NotWhitelisted,

    #[error("no addresses provided")]
    NoAddresses,

    #[error("duration must be positive")]
    ZeroDuration,

    #[error("duration too large")]
    DurationTooLarge,

    #[error("cooldown already exists")]
    CooldownExists,

    #[error("cooldown not expired")]
    CooldownNotExpired,

    #[error("inverted range: lb > ub")]
    InvertedRange,

    #[error("interval already exists")]
    IntervalExists,

    #[error("interval does not exist")]
    IntervalMissing,

    #[error("value out of interval")]
    OutOfInterval,
}

impl From<PermissionError> for Revert {
    fn from(err: PermissionError) -> Self {
        Revert::new(err.to_string())
    }
}
