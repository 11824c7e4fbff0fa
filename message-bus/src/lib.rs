//! In-process message bus
//!
//! Outbound notification channel for the surety engine:
//! - Typed envelope with routing subject and JSON payload
//! - Broadcast fan-out to any number of subscribers
//! - Subscribers filter by message type and can be consumed as streams
//! - Observability via Prometheus metrics
//!
//! Publishing never depends on a listener being attached.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use error::{Error, Result};
pub use message::Message;
pub use publisher::{InMemoryBus, Publisher, DEFAULT_CHANNEL_CAPACITY};
pub use subscriber::{MessageFilter, MessageHandler, Subscriber};
pub use types::{MessageType, PartitionKey};
