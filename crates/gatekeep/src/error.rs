//! Errors raised by the delegation registry and the forwarding gate

use gatekeep_core::Revert;
use thiserror::Error;

/// Authorization and registry failures
///
/// Display strings are the abort reasons relayed to callers. Checker and
/// target aborts are carried unchanged so their reasons pass through verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("access_control: account is missing role")]
    MissingRole,

    #[error("delegate==0x0")]
    ZeroDelegate,

    #[error("end_ts<=block.timestamp")]
    ExpiryNotInFuture,

    #[error("checker==0x0")]
    ZeroChecker,

    #[error("checker has no code")]
    CheckerHasNoCode,

    #[error("delegation mode mismatch")]
    ModeMismatch,

    /// The delegation's checker aborted
    #[error(transparent)]
    Checker(Revert),

    /// The forwarded call aborted
    #[error(transparent)]
    Target(Revert),

    /// The host aborted the frame (depth limit, balance)
    #[error(transparent)]
    Host(#[from] Revert),
}

impl From<ProxyError> for Revert {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Checker(revert) | ProxyError::Target(revert) | ProxyError::Host(revert) => {
                revert
            }
            other => Revert::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_pass_through() {
        let denied = ProxyError::Checker(Revert::new("Checker denied"));
        assert_eq!(denied.to_string(), "Checker denied");
        assert_eq!(Revert::from(denied).reason(), "Checker denied");

        let silent = Revert::from(ProxyError::Checker(Revert::silent()));
        assert!(silent.is_silent());

        assert_eq!(
            Revert::from(ProxyError::MissingRole).reason(),
            "access_control: account is missing role"
        );
    }
}
