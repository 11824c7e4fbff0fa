//! Error types for the surety engine

use ledger_core::ErrorCategory;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Caller may not perform the operation
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Oracle or round does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Illegal transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Value constraint violated
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Notification could not be built or published
    #[error("Message bus error: {0}")]
    Bus(#[from] message_bus::Error),

    /// Actor mailbox or reply channel closed
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable category for presentation layers
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Ledger(e) => e.category(),
            Error::NotAuthorized(_) => ErrorCategory::NotAuthorized,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::AlreadyExists(_) => ErrorCategory::AlreadyExists,
            Error::InvalidState(_) => ErrorCategory::InvalidState,
            Error::PolicyViolation(_) => ErrorCategory::PolicyViolation,
            Error::Bus(_) | Error::Concurrency(_) | Error::Config(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

/// Fail fast when the ledger is paused
pub(crate) fn ensure_operational(ledger: &ledger_core::Ledger) -> Result<()> {
    if ledger.is_operational() {
        Ok(())
    } else {
        Err(ledger_core::Error::NotOperational.into())
    }
}
