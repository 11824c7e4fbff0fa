//! Engine types: rounds, oracle registrations, outcomes and notifications

use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount, DepartureStatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Number of indexes assigned to every oracle
pub const INDEXES_PER_ORACLE: usize = 3;

/// Status round key: one lookup of one flight under one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundKey {
    /// Index oracles must hold to answer
    pub index: u8,
    /// Operating airline
    pub airline: Address,
    /// Flight code
    pub flight: String,
    /// Scheduled departure (Unix seconds)
    pub departure: i64,
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.index, self.airline, self.flight, self.departure
        )
    }
}

/// Round lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Collecting responses
    Open,
    /// Quorum reached (terminal)
    Resolved {
        /// Winning status
        status: DepartureStatusCode,
    },
    /// No quorum before the deadline (terminal)
    Expired,
}

/// One flight-status lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRound {
    /// Sequential round id
    pub id: u64,
    /// Round key
    pub key: RoundKey,
    /// Flight being looked up
    pub flight_id: u64,
    /// Opening time
    pub opened_at: DateTime<Utc>,
    /// Distinct responders per reported status
    pub responses: BTreeMap<DepartureStatusCode, BTreeSet<Address>>,
    /// Lifecycle
    pub status: RoundStatus,
}

impl StatusRound {
    /// Create an open round
    pub fn open(id: u64, key: RoundKey, flight_id: u64, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            key,
            flight_id,
            opened_at,
            responses: BTreeMap::new(),
            status: RoundStatus::Open,
        }
    }

    /// Still collecting responses
    pub fn is_open(&self) -> bool {
        matches!(self.status, RoundStatus::Open)
    }

    /// Winning status, once resolved
    pub fn resolved_code(&self) -> Option<DepartureStatusCode> {
        match self.status {
            RoundStatus::Resolved { status } => Some(status),
            _ => None,
        }
    }

    /// Whether `oracle` already answered, under any status
    pub fn has_responded(&self, oracle: &Address) -> bool {
        self.responses.values().any(|set| set.contains(oracle))
    }

    /// Number of distinct responders reporting `status`
    pub fn response_count(&self, status: DepartureStatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }
}

/// Oracle and its assigned indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRegistration {
    /// Oracle identity
    pub address: Address,
    /// Three distinct indexes
    pub indexes: [u8; INDEXES_PER_ORACLE],
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl OracleRegistration {
    /// Whether the oracle was dealt into `index`
    pub fn has_index(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }
}

/// Result of an airline registration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationOutcome {
    /// Admitted directly (bootstrap phase)
    Registered {
        /// New airline id
        airline_id: u64,
    },
    /// Vote recorded (consensus phase)
    VoteCounted(VoteTally),
}

/// Vote count after a registration vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Candidate address
    pub candidate: Address,
    /// Distinct votes so far
    pub vote_count: u64,
    /// Current number of voters
    pub total_voters: u64,
    /// Votes needed
    pub required: u64,
    /// Candidate admitted by this vote
    pub is_consensus_reached: bool,
    /// New airline id when admitted
    pub airline_id: Option<u64>,
}

/// Result of a status request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTicket {
    /// Round id
    pub round_id: u64,
    /// Round key (includes the drawn index)
    pub key: RoundKey,
    /// An open round for the key already existed
    pub reused: bool,
}

/// Result of an oracle response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    /// Response counted, no quorum yet
    Recorded {
        /// Round id
        round_id: u64,
        /// Reported status
        status: DepartureStatusCode,
        /// Responders for that status so far
        count: usize,
    },
    /// Response completed a quorum
    Resolved {
        /// Round id
        round_id: u64,
        /// Winning status
        status: DepartureStatusCode,
        /// Flight status and payouts were applied by this round
        effect_applied: bool,
    },
    /// Accepted without effect
    Ignored(IgnoredReason),
}

/// Why a response had no effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoredReason {
    /// No round was ever opened for the key
    NoRound,
    /// Round already resolved
    RoundResolved {
        /// Round id
        round_id: u64,
        /// Winning status
        status: DepartureStatusCode,
    },
    /// Round expired
    RoundExpired {
        /// Round id
        round_id: u64,
    },
}

/// Credit owed to one insurance when its flight resolves late
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Insurance id
    pub insurance_id: u64,
    /// Passenger
    pub owner: Address,
    /// Credited amount
    pub amount: Amount,
}

// Notification payloads

/// Round opened; oracles holding `index` should answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Round id
    pub round_id: u64,
    /// Drawn index
    pub index: u8,
    /// Operating airline
    pub airline: Address,
    /// Flight code
    pub flight: String,
    /// Scheduled departure
    pub departure: i64,
}

impl OracleRequest {
    /// Round key this request refers to
    pub fn key(&self) -> RoundKey {
        RoundKey {
            index: self.index,
            airline: self.airline.clone(),
            flight: self.flight.clone(),
            departure: self.departure,
        }
    }
}

/// Oracle response recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReport {
    /// Round id
    pub round_id: u64,
    /// Responding oracle
    pub oracle: Address,
    /// Index used
    pub index: u8,
    /// Operating airline
    pub airline: Address,
    /// Flight code
    pub flight: String,
    /// Scheduled departure
    pub departure: i64,
    /// Reported status
    pub status: DepartureStatusCode,
}

/// Round resolved by quorum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightStatusInfo {
    /// Round id
    pub round_id: u64,
    /// Operating airline
    pub airline: Address,
    /// Flight code
    pub flight: String,
    /// Scheduled departure
    pub departure: i64,
    /// Winning status
    pub status: DepartureStatusCode,
    /// Whether the flight record was updated by this round
    pub effect_applied: bool,
}

/// Round expired without quorum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundExpired {
    /// Round id
    pub round_id: u64,
    /// Round key
    pub key: RoundKey,
    /// Opening time
    pub opened_at: DateTime<Utc>,
}

/// Airline paid its registration fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationFeePaid {
    /// Airline
    pub airline: Address,
    /// Amount paid
    pub amount: Amount,
}

/// Oracle registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRegistered {
    /// Oracle
    pub oracle: Address,
    /// Assigned indexes
    pub indexes: [u8; INDEXES_PER_ORACLE],
}
