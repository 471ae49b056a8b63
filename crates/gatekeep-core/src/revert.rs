//! Aborts that unwind a call frame

use thiserror::Error;

/// An aborted call, carrying the reason string relayed to the caller
///
/// An empty reason models a bare abort (for example a contract with no
/// handler for the entry point it was called on).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", display_reason(.reason))]
pub struct Revert {
    reason: String,
}

fn display_reason(reason: &str) -> String {
    if reason.is_empty() {
        "execution reverted".to_string()
    } else {
        reason.to_string()
    }
}

impl Revert {
    /// Abort with a reason string
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Abort without a reason
    pub fn silent() -> Self {
        Self {
            reason: String::new(),
        }
    }

    /// The raw reason, empty for bare aborts
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// True when no reason was given
    pub fn is_silent(&self) -> bool {
        self.reason.is_empty()
    }
}

/// Abort with `reason` unless `cond` holds
pub fn ensure(cond: bool, reason: &str) -> Result<(), Revert> {
    if cond {
        Ok(())
    } else {
        Err(Revert::new(reason))
    }
}
