//! Simulated oracle pool
//!
//! Off-ledger oracles for the surety engine. Each registers once, keeps
//! the indexes the engine assigned it, and answers the status requests
//! published on the message bus whose index it holds. A configurable
//! share of the pool always reports LATE_AIRLINE, the rest pick a status
//! at random.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod oracle;
pub mod pool;

// Re-exports
pub use config::PoolConfig;
pub use error::{Error, Result};
pub use oracle::{Behaviour, SimulatedOracle};
pub use pool::{OraclePool, Submission};
