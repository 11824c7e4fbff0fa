//! Hashing for deterministic lookup keys
//!
//! Flight keys are SHA-256 digests over length-prefixed fields, so
//! `("AB", "C1")` and `("A", "BC1")` never collide structurally.

use crate::types::{Address, FlightKey};
use sha2::{Digest, Sha256};

/// Derive the lookup key of a flight
///
/// Re-deriving the same `(airline, code, departure)` tuple always yields
/// the same key.
pub fn flight_key(airline: &Address, code: &str, departure: i64) -> FlightKey {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, airline.as_str().as_bytes());
    update_field(&mut hasher, code.as_bytes());
    hasher.update(departure.to_be_bytes());

    FlightKey::from_bytes(hasher.finalize().into())
}

fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
}
