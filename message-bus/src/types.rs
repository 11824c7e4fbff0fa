//! Type definitions for message bus

use serde::{Deserialize, Serialize};

/// Message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// New airline admitted
    AirlineRegistered,
    /// Vote recorded for a candidate airline
    VoteCounted,
    /// Airline paid its registration fee
    RegistrationFeePaid,
    /// Funds taken into custody
    FundsAdded,
    /// Flight open for insurance
    FlightAvailableForInsurance,
    /// Flight closed for insurance
    FlightUnavailableForInsurance,
    /// Flight departure status recorded
    FlightStatusUpdated,
    /// Insurance bought
    InsurancePurchased,
    /// Insurance paid out to a credit balance
    InsuranceCredited,
    /// Insurance closed without payout
    InsuranceExpired,
    /// Credit released to a passenger
    FundsWithdrawn,
    /// Oracle registered with its indexes
    OracleRegistered,
    /// Status round opened, oracles with a matching index should answer
    OracleRequest,
    /// Oracle response recorded
    OracleReport,
    /// Status round resolved by quorum
    FlightStatusInfo,
    /// Status round expired without quorum
    RoundExpired,
    /// Operational flag changed
    OperationalStatusChanged,
    /// Configuration record changed
    ConfigChanged,
}

impl MessageType {
    /// All message types
    pub const ALL: [MessageType; 18] = [
        MessageType::AirlineRegistered,
        MessageType::VoteCounted,
        MessageType::RegistrationFeePaid,
        MessageType::FundsAdded,
        MessageType::FlightAvailableForInsurance,
        MessageType::FlightUnavailableForInsurance,
        MessageType::FlightStatusUpdated,
        MessageType::InsurancePurchased,
        MessageType::InsuranceCredited,
        MessageType::InsuranceExpired,
        MessageType::FundsWithdrawn,
        MessageType::OracleRegistered,
        MessageType::OracleRequest,
        MessageType::OracleReport,
        MessageType::FlightStatusInfo,
        MessageType::RoundExpired,
        MessageType::OperationalStatusChanged,
        MessageType::ConfigChanged,
    ];

    /// Subject prefix for this message type
    pub fn subject_prefix(&self) -> &'static str {
        match self {
            MessageType::AirlineRegistered => "surety.airline.registered",
            MessageType::VoteCounted => "surety.airline.vote",
            MessageType::RegistrationFeePaid => "surety.airline.fee",
            MessageType::FundsAdded => "surety.funds.added",
            MessageType::FlightAvailableForInsurance => "surety.flight.available",
            MessageType::FlightUnavailableForInsurance => "surety.flight.unavailable",
            MessageType::FlightStatusUpdated => "surety.flight.status",
            MessageType::InsurancePurchased => "surety.insurance.purchased",
            MessageType::InsuranceCredited => "surety.insurance.credited",
            MessageType::InsuranceExpired => "surety.insurance.expired",
            MessageType::FundsWithdrawn => "surety.funds.withdrawn",
            MessageType::OracleRegistered => "surety.oracle.registered",
            MessageType::OracleRequest => "surety.oracle.request",
            MessageType::OracleReport => "surety.oracle.report",
            MessageType::FlightStatusInfo => "surety.oracle.status_info",
            MessageType::RoundExpired => "surety.oracle.round_expired",
            MessageType::OperationalStatusChanged => "surety.system.operational",
            MessageType::ConfigChanged => "surety.system.config",
        }
    }
}

/// Partition key for routing messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKey {
    /// Partition by airline address
    Airline(String),
    /// Partition by flight id
    Flight(u64),
    /// Partition by passenger address
    Passenger(String),
    /// Partition by oracle address
    Oracle(String),
    /// System-wide
    Global,
}

impl PartitionKey {
    /// Subject segment for this key
    pub fn to_subject_segment(&self) -> String {
        match self {
            PartitionKey::Airline(id) => format!("airline.{}", sanitize_subject(id)),
            PartitionKey::Flight(id) => format!("flight.{}", id),
            PartitionKey::Passenger(id) => format!("passenger.{}", sanitize_subject(id)),
            PartitionKey::Oracle(id) => format!("oracle.{}", sanitize_subject(id)),
            PartitionKey::Global => "global".to_string(),
        }
    }
}

/// Sanitize string for use in a subject
fn sanitize_subject(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
