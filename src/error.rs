//! Error types for treeshift.
//!
//! Mapping misses are not errors: they surface as `None` from the mapping
//! functions. Programmer mistakes (recording twice, zero-length chunks, guards
//! from a foreign observer) panic. What remains here are the conditions a
//! caller can actually react to.

use std::time::Duration;
use thiserror::Error;

/// Which side of the structural lock an acquisition attempt wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAccess {
    Read,
    Write,
}

impl std::fmt::Display for LockAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockAccess::Read => f.write_str("read"),
            LockAccess::Write => f.write_str("write"),
        }
    }
}

/// Errors surfaced by observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The structural lock could not be acquired within the configured wait.
    #[error("Timed out after {waited_ms}ms waiting for {access} access to the observer")]
    LockTimeout { access: LockAccess, waited_ms: u64 },

    /// Settings could not be applied.
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

impl ObserverError {
    /// Create a lock timeout error
    pub fn lock_timeout(access: LockAccess, waited: Duration) -> Self {
        ObserverError::LockTimeout {
            access,
            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ObserverError::Config {
            message: message.into(),
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ObserverError::LockTimeout { .. })
    }
}
