//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (serde, stable field order)
//! - Exact arithmetic (Decimal for money, truncated at the smallest unit)
//! - Sequential ids starting at 1, never reused

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Currency amount (exact decimal, currency units)
pub type Amount = Decimal;

/// Number of fractional digits of the smallest indivisible currency unit
pub const AMOUNT_SCALE: u32 = 18;

/// Truncate an amount toward zero at the smallest currency unit
pub fn truncate_amount(amount: Amount) -> Amount {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero)
}

/// Participant identity (airline, passenger, oracle, owner)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Numerator/denominator pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    /// Numerator
    pub numerator: u32,
    /// Denominator (never zero once validated)
    pub denominator: u32,
}

impl Ratio {
    /// Create new ratio
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `ceil(total × numerator / denominator)`
    pub fn ceil_of(&self, total: u64) -> u64 {
        if self.denominator == 0 {
            return u64::MAX;
        }
        let scaled = u128::from(total) * u128::from(self.numerator);
        let denominator = u128::from(self.denominator);
        let required = (scaled + denominator - 1) / denominator;
        u64::try_from(required).unwrap_or(u64::MAX)
    }

    /// `amount × numerator / denominator`, truncated at the smallest unit
    pub fn apply(&self, amount: Amount) -> Option<Amount> {
        if self.denominator == 0 {
            return None;
        }
        amount
            .checked_mul(Decimal::from(self.numerator))?
            .checked_div(Decimal::from(self.denominator))
            .map(truncate_amount)
    }

    /// True when the ratio is above one
    pub fn exceeds_one(&self) -> bool {
        self.numerator > self.denominator
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Registered airline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    /// Sequential id (the deploying identity is #1)
    pub id: u64,

    /// Airline identity
    pub address: Address,

    /// Paid the registration fee (or granted by admin) and may vote
    pub is_voter: bool,
}

/// Pending admission vote for a candidate airline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationBallot {
    /// Candidate address
    pub candidate: Address,

    /// Distinct voters
    pub votes: BTreeSet<Address>,

    /// First vote timestamp
    pub created_at: DateTime<Utc>,
}

impl RegistrationBallot {
    /// Create empty ballot
    pub fn new(candidate: Address) -> Self {
        Self {
            candidate,
            votes: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Number of distinct votes
    pub fn vote_count(&self) -> u64 {
        self.votes.len() as u64
    }

    /// Whether `voter` already voted
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.votes.contains(voter)
    }
}

/// Deterministic flight lookup key: SHA-256 of (airline, code, departure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightKey([u8; 32]);

impl FlightKey {
    /// Create from hash bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Flight departure status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DepartureStatusCode {
    /// Not yet known
    Unknown = 0,
    /// Departed on time
    OnTime = 10,
    /// Late, airline's fault (compensable)
    LateAirline = 20,
    /// Late due to weather
    LateWeather = 30,
    /// Late due to technical problems
    LateTechnical = 40,
    /// Late for another reason
    LateOther = 50,
}

impl DepartureStatusCode {
    /// All codes, in numeric order
    pub const ALL: [DepartureStatusCode; 6] = [
        DepartureStatusCode::Unknown,
        DepartureStatusCode::OnTime,
        DepartureStatusCode::LateAirline,
        DepartureStatusCode::LateWeather,
        DepartureStatusCode::LateTechnical,
        DepartureStatusCode::LateOther,
    ];

    /// Numeric wire code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse from numeric wire code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.code() == code)
    }

    /// Whether insurance holders are compensated for this status
    pub fn is_compensable(&self) -> bool {
        matches!(self, DepartureStatusCode::LateAirline)
    }
}

impl fmt::Display for DepartureStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DepartureStatusCode::Unknown => "UNKNOWN",
            DepartureStatusCode::OnTime => "ON_TIME",
            DepartureStatusCode::LateAirline => "LATE_AIRLINE",
            DepartureStatusCode::LateWeather => "LATE_WEATHER",
            DepartureStatusCode::LateTechnical => "LATE_TECHNICAL",
            DepartureStatusCode::LateOther => "LATE_OTHER",
        };
        write!(f, "{}", name)
    }
}

/// Whether a flight accepts new insurance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightAvailability {
    /// Insurance can be bought
    AvailableForInsurance,
    /// Insurance sales closed
    UnavailableForInsurance,
}

/// Registered flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// Sequential id
    pub id: u64,

    /// Deterministic lookup key
    pub key: FlightKey,

    /// Operating airline
    pub airline: Address,

    /// Flight code (e.g. "ND1309")
    pub code: String,

    /// Scheduled departure (seconds since Unix epoch)
    pub departure: i64,

    /// Resolved departure status
    pub departure_status_code: DepartureStatusCode,

    /// Insurance sales state
    pub availability: FlightAvailability,
}

impl Flight {
    /// Whether insurance can currently be bought
    pub fn is_available_for_insurance(&self) -> bool {
        matches!(self.availability, FlightAvailability::AvailableForInsurance)
    }
}

/// Insurance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InsuranceState {
    /// Bought, awaiting flight resolution
    Active = 0,
    /// Payout credited to the owner (terminal)
    Credited = 1,
    /// Flight resolved without compensation (terminal)
    Expired = 2,
}

/// Flight delay insurance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insurance {
    /// Sequential id
    pub id: u64,

    /// Insured flight
    pub flight_id: u64,

    /// Premium paid into custody
    pub amount_paid: Amount,

    /// Passenger
    pub owner: Address,

    /// Lifecycle state
    pub state: InsuranceState,
}

impl Insurance {
    /// Check if insurance is still open for crediting
    pub fn is_active(&self) -> bool {
        matches!(self.state, InsuranceState::Active)
    }
}

/// Funds released from custody, to be executed by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Recipient
    pub to: Address,

    /// Released amount
    pub amount: Amount,
}

/// Runtime configuration record owned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Incremented on every change
    pub version: u64,

    /// Operational flag
    pub operational: bool,

    /// Fee an airline pays to become a voter
    pub registration_fee: Amount,

    /// Maximum premium per insurance
    pub insurance_cap: Amount,

    /// Fraction of voters required to admit an airline
    pub consensus: Ratio,

    /// Payout multiple of the premium
    pub premium: Ratio,
}

/// Custody accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    /// Total funds ever received
    pub received: Amount,

    /// Total funds ever released
    pub withdrawn: Amount,

    /// Sum of all credit balances
    pub outstanding_credit: Amount,
}

impl Treasury {
    /// Funds currently held in custody
    pub fn held(&self) -> Amount {
        self.received - self.withdrawn
    }

    /// Funds not yet promised to passengers
    pub fn uncommitted(&self) -> Amount {
        self.held() - self.outstanding_credit
    }
}

/// State change recorded by the ledger, drained by the governing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// New airline created
    AirlineRegistered {
        /// Airline id
        id: u64,
        /// Airline address
        address: Address,
    },
    /// Airline may now vote
    AirlineVoterEnabled {
        /// Airline address
        address: Address,
    },
    /// Funds taken into custody
    FundsAdded {
        /// Payer
        from: Address,
        /// Amount received
        amount: Amount,
        /// Funds held afterwards
        held: Amount,
    },
    /// Flight opened for insurance (also emitted on creation)
    FlightAvailableForInsurance {
        /// Flight id
        id: u64,
    },
    /// Flight closed for insurance
    FlightUnavailableForInsurance {
        /// Flight id
        id: u64,
    },
    /// Departure status recorded
    FlightStatusUpdated {
        /// Flight id
        id: u64,
        /// New status
        status: DepartureStatusCode,
    },
    /// Insurance bought
    InsurancePurchased {
        /// Insurance id
        id: u64,
        /// Flight id
        flight_id: u64,
        /// Passenger
        owner: Address,
        /// Premium
        amount_paid: Amount,
    },
    /// Insurance paid out to the owner's credit balance
    InsuranceCredited {
        /// Insurance id
        id: u64,
        /// Passenger
        owner: Address,
        /// Credited amount
        amount: Amount,
    },
    /// Insurance closed without payout
    InsuranceExpired {
        /// Insurance id
        id: u64,
    },
    /// Credit released to a passenger
    FundsWithdrawn {
        /// Passenger
        to: Address,
        /// Released amount
        amount: Amount,
    },
    /// Operational flag changed
    OperationalStatusChanged {
        /// New flag
        operational: bool,
    },
    /// Configuration record changed
    ConfigChanged {
        /// New version
        version: u64,
    },
    /// Authorized caller set changed
    AuthorizedCallerChanged {
        /// Address
        address: Address,
        /// Membership after the change
        authorized: bool,
    },
}
