//! Error types for the ledger store

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Gated operation invoked while the ledger is not operational
    #[error("Contract is currently not operational")]
    NotOperational,

    /// Caller is outside the authorized set, or not the owner
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Airline, flight, insurance or round does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Entity is in the wrong state for the requested transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Value constraint violated (fee, cap, balance, multipliers, departure)
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable category for presentation layers
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotOperational => ErrorCategory::NotOperational,
            Error::NotAuthorized(_) => ErrorCategory::NotAuthorized,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::AlreadyExists(_) => ErrorCategory::AlreadyExists,
            Error::InvalidState(_) => ErrorCategory::InvalidState,
            Error::PolicyViolation(_) => ErrorCategory::PolicyViolation,
            Error::Concurrency(_) | Error::Config(_) | Error::Metrics(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

/// Error category rendered by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Ledger halted by the owner
    NotOperational,
    /// Access control failure
    NotAuthorized,
    /// Missing entity
    NotFound,
    /// Duplicate entity
    AlreadyExists,
    /// Illegal transition
    InvalidState,
    /// Value constraint
    PolicyViolation,
    /// Infrastructure failure
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::NotOperational => "NotOperational",
            ErrorCategory::NotAuthorized => "NotAuthorized",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::AlreadyExists => "AlreadyExists",
            ErrorCategory::InvalidState => "InvalidState",
            ErrorCategory::PolicyViolation => "PolicyViolation",
            ErrorCategory::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::NotOperational.category(), ErrorCategory::NotOperational);
        assert_eq!(
            Error::InvalidState("The caller has already voted".into()).category(),
            ErrorCategory::InvalidState
        );
        assert_eq!(
            Error::Config("bad".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_not_operational_message() {
        assert!(Error::NotOperational
            .to_string()
            .contains("not operational"));
    }
}
