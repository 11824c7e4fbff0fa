//! Error types for the oracle pool

use thiserror::Error;

/// Oracle pool error
#[derive(Debug, Error)]
pub enum Error {
    /// Engine rejected a call or is gone
    #[error("Engine error: {0}")]
    Engine(#[from] surety_engine::Error),

    /// Notification channel failure
    #[error("Bus error: {0}")]
    Bus(#[from] message_bus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
