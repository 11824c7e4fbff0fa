//! FlightSurety Ledger Core
//!
//! Ledger of record for the flight insurance scheme: airlines, admission
//! ballots, flights, insurances, credit balances and funds in custody.
//!
//! # Architecture
//!
//! - **Store, not policy**: the ledger checks invariants; the governing
//!   layer decides admission, pricing and resolution
//! - **Authorized callers**: only listed identities may mutate
//! - **Event outbox**: every successful mutation records a [`LedgerEvent`]
//! - **Versioned config**: one [`GlobalConfig`] record, bumped on every change
//!
//! # Invariants
//!
//! - Sequential ids starting at 1, never reused
//! - One flight per key; re-deriving a key finds the same flight
//! - `Active → Credited` happens at most once per insurance
//! - Funds held ≥ Σ(credit balances), and no balance is ever negative

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, PolicyConfig};
pub use error::{Error, ErrorCategory, Result};
pub use ledger::Ledger;
pub use types::{
    Address, Airline, Amount, DepartureStatusCode, Flight, FlightAvailability, FlightKey,
    GlobalConfig, Insurance, InsuranceState, LedgerEvent, Ratio, RegistrationBallot, Transfer,
    Treasury,
};
