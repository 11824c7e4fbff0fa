//! FlightSurety Engine
//!
//! Governing layer over the ledger: airline admission, flight and
//! insurance escrow, and oracle consensus on flight status.
//!
//! # Architecture
//!
//! 1. **Registry**: airlines join directly until the bootstrap threshold,
//!    then by a ceiling fraction of fee-paying voters
//! 2. **Escrow**: flights, insurance purchase, payout pricing, withdrawals
//! 3. **Oracle coordinator**: rounds keyed by `(index, airline, flight,
//!    departure)`, first status to quorum wins, effect applied once
//! 4. **Actor**: one task owns the engine and linearizes every call;
//!    notifications go to the message bus after each successful call
//!
//! # Example
//!
//! ```no_run
//! use message_bus::InMemoryBus;
//! use std::sync::Arc;
//! use surety_engine::{spawn_engine_actor, Config, SuretyEngine};
//!
//! #[tokio::main]
//! async fn main() -> surety_engine::Result<()> {
//!     let config = Config::default();
//!     let owner = config.ledger.owner.clone();
//!     let capacity = config.actor.mailbox_capacity;
//!
//!     let bus = Arc::new(InMemoryBus::new());
//!     let handle = spawn_engine_actor(SuretyEngine::new(config)?, bus, capacity);
//!
//!     let departure = chrono::Utc::now().timestamp() + 3600;
//!     let flight_id = handle.register_flight("ND1309", departure, owner).await?;
//!     println!("Registered flight {}", flight_id);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod oracle;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod types;

// Re-exports
pub use actor::{spawn_engine_actor, EngineHandle, PolicyUpdate};
pub use config::{ActorConfig, Config, OracleConfig, SchedulerConfig};
pub use engine::SuretyEngine;
pub use error::{Error, Result};
pub use random::{IndexSource, RandomIndexSource, SequenceIndexSource};
pub use scheduler::RoundExpiryScheduler;
pub use types::*;
