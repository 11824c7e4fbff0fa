//! Surety engine
//!
//! Owns the ledger and the three governing components, runs every entry
//! point all-or-nothing, and collects the notifications each successful
//! call produces into an outbox.

use crate::{
    config::Config,
    escrow::Escrow,
    oracle::OracleCoordinator,
    random::{IndexSource, RandomIndexSource},
    registry::AirlineRegistry,
    types::{
        FlightStatusInfo, OracleRegistered, OracleReport, OracleRequest, RegistrationFeePaid,
        RegistrationOutcome, RoundTicket, StatusRound, SubmissionOutcome, INDEXES_PER_ORACLE,
    },
    Result,
};
use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount, Ledger, LedgerEvent, Ratio, Transfer};
use message_bus::{Message, MessageType, PartitionKey};
use tracing::{debug, info};

/// Governing layer over the ledger
#[derive(Debug)]
pub struct SuretyEngine {
    config: Config,
    ledger: Ledger,
    registry: AirlineRegistry,
    escrow: Escrow,
    coordinator: OracleCoordinator,
    outbox: Vec<Message>,
}

impl SuretyEngine {
    /// Create engine with an entropy-seeded index source
    pub fn new(config: Config) -> Result<Self> {
        Self::with_index_source(config, Box::new(RandomIndexSource::from_entropy()))
    }

    /// Create engine with an explicit index source
    pub fn with_index_source(config: Config, index_source: Box<dyn IndexSource>) -> Result<Self> {
        config.validate()?;

        let mut ledger = Ledger::new(&config.ledger)?;
        let owner = ledger.owner().clone();
        ledger.set_authorized_caller(config.engine_address.clone(), true, &owner)?;

        let engine = config.engine_address.clone();
        let mut surety = Self {
            registry: AirlineRegistry::new(engine.clone(), config.bootstrap_airline_threshold),
            escrow: Escrow::new(engine.clone()),
            coordinator: OracleCoordinator::new(config.oracle.clone(), engine, index_source),
            ledger,
            config,
            outbox: Vec::new(),
        };
        surety.flush_ledger_events()?;

        info!(
            service = %surety.config.service_name,
            owner = %owner,
            engine = %surety.config.engine_address,
            "Surety engine started"
        );
        Ok(surety)
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ledger, for queries
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Oracle coordinator, for queries
    pub fn coordinator(&self) -> &OracleCoordinator {
        &self.coordinator
    }

    /// Round by id
    pub fn round(&self, id: u64) -> Result<Option<&StatusRound>> {
        self.coordinator.round(&self.ledger, id)
    }

    /// Take every notification produced so far
    pub fn drain_outbox(&mut self) -> Result<Vec<Message>> {
        self.flush_ledger_events()?;
        Ok(std::mem::take(&mut self.outbox))
    }

    // Airlines

    /// Register (or vote for) a candidate airline
    pub fn register_airline(
        &mut self,
        candidate: Address,
        caller: &Address,
    ) -> Result<RegistrationOutcome> {
        self.transact(|engine| {
            let outcome = engine
                .registry
                .register_airline(&mut engine.ledger, candidate, caller)?;
            if let RegistrationOutcome::VoteCounted(tally) = &outcome {
                engine.emit(
                    MessageType::VoteCounted,
                    PartitionKey::Airline(tally.candidate.to_string()),
                    tally,
                )?;
            }
            Ok(outcome)
        })
    }

    /// Pay the registration fee, becoming a voter
    pub fn pay_registration_fee(&mut self, caller: &Address, value: Amount) -> Result<()> {
        self.transact(|engine| {
            engine
                .registry
                .pay_registration_fee(&mut engine.ledger, caller, value)?;
            engine.emit(
                MessageType::RegistrationFeePaid,
                PartitionKey::Airline(caller.to_string()),
                &RegistrationFeePaid {
                    airline: caller.clone(),
                    amount: value,
                },
            )
        })
    }

    /// Grant voting rights without a fee (owner only)
    pub fn set_airline_voter(&mut self, airline: &Address, caller: &Address) -> Result<()> {
        self.transact(|engine| {
            engine.require_owner(caller)?;
            engine
                .ledger
                .set_airline_is_voter(airline, &engine.config.engine_address)?;
            Ok(())
        })
    }

    // Administration

    /// Set the operational flag (owner only)
    pub fn set_operational_status(&mut self, operational: bool, caller: &Address) -> Result<()> {
        self.transact(|engine| Ok(engine.ledger.set_operational_status(operational, caller)?))
    }

    /// Grant or revoke ledger write access (owner only)
    pub fn set_authorized_caller(
        &mut self,
        address: Address,
        authorized: bool,
        caller: &Address,
    ) -> Result<()> {
        self.transact(|engine| {
            Ok(engine
                .ledger
                .set_authorized_caller(address, authorized, caller)?)
        })
    }

    /// Set the airline registration fee (owner only)
    pub fn set_registration_fee(&mut self, fee: Amount, caller: &Address) -> Result<()> {
        self.transact(|engine| Ok(engine.ledger.set_registration_fee(fee, caller)?))
    }

    /// Set the per-insurance cap (owner only)
    pub fn set_insurance_cap(&mut self, cap: Amount, caller: &Address) -> Result<()> {
        self.transact(|engine| Ok(engine.ledger.set_insurance_cap(cap, caller)?))
    }

    /// Set the admission consensus fraction (owner only)
    pub fn set_consensus_multipliers(
        &mut self,
        numerator: u32,
        denominator: u32,
        caller: &Address,
    ) -> Result<()> {
        self.transact(|engine| {
            Ok(engine
                .ledger
                .set_consensus_multipliers(numerator, denominator, caller)?)
        })
    }

    /// Set the payout multiple (owner only)
    pub fn set_insurance_premium_multiplier(
        &mut self,
        numerator: u32,
        denominator: u32,
        caller: &Address,
    ) -> Result<()> {
        self.transact(|engine| {
            Ok(engine
                .ledger
                .set_insurance_premium_multiplier(numerator, denominator, caller)?)
        })
    }

    /// Current consensus fraction
    pub fn consensus_multipliers(&self) -> Result<Ratio> {
        Ok(self.ledger.consensus_multipliers()?)
    }

    // Funds

    /// Donate funds into custody
    pub fn fund(&mut self, from: Address, value: Amount) -> Result<Amount> {
        self.transact(|engine| {
            let engine_address = engine.config.engine_address.clone();
            Ok(engine.ledger.add_funds(from, value, &engine_address)?)
        })
    }

    // Flights and insurance

    /// Register a flight for the calling airline
    pub fn register_flight(&mut self, code: &str, departure: i64, caller: &Address) -> Result<u64> {
        self.register_flight_at(code, departure, caller, Utc::now().timestamp())
    }

    /// Register a flight, judging departure against `now`
    pub fn register_flight_at(
        &mut self,
        code: &str,
        departure: i64,
        caller: &Address,
        now: i64,
    ) -> Result<u64> {
        self.transact(|engine| {
            engine
                .escrow
                .register_flight_at(&mut engine.ledger, code, departure, caller, now)
        })
    }

    /// Buy insurance for a passenger
    pub fn buy_insurance(
        &mut self,
        flight_id: u64,
        amount: Amount,
        passenger: Address,
    ) -> Result<u64> {
        self.transact(|engine| {
            engine
                .escrow
                .buy_insurance(&mut engine.ledger, flight_id, amount, passenger)
        })
    }

    /// Withdraw credited funds
    pub fn withdraw(
        &mut self,
        amount: Amount,
        passenger: &Address,
        caller: &Address,
    ) -> Result<Transfer> {
        self.transact(|engine| {
            engine
                .escrow
                .withdraw(&mut engine.ledger, amount, passenger, caller)
        })
    }

    // Oracles

    /// Register an oracle
    pub fn register_oracle(
        &mut self,
        address: Address,
        fee_paid: Amount,
    ) -> Result<[u8; INDEXES_PER_ORACLE]> {
        self.transact(|engine| {
            let indexes = engine
                .coordinator
                .register_oracle(&mut engine.ledger, address.clone(), fee_paid)?;
            engine.emit(
                MessageType::OracleRegistered,
                PartitionKey::Oracle(address.to_string()),
                &OracleRegistered {
                    oracle: address,
                    indexes,
                },
            )?;
            Ok(indexes)
        })
    }

    /// Indexes assigned to an oracle
    pub fn get_my_indexes(&self, address: &Address) -> Result<[u8; INDEXES_PER_ORACLE]> {
        self.coordinator.get_my_indexes(&self.ledger, address)
    }

    /// Number of registered oracles
    pub fn oracles_count(&self) -> Result<usize> {
        self.coordinator.oracles_count(&self.ledger)
    }

    /// Ask oracles for a flight's status
    pub fn request_status(
        &mut self,
        airline: &Address,
        flight: &str,
        departure: i64,
        caller: &Address,
    ) -> Result<RoundTicket> {
        self.request_status_at(airline, flight, departure, caller, Utc::now())
    }

    /// Ask oracles for a flight's status, opening rounds at `now`
    pub fn request_status_at(
        &mut self,
        airline: &Address,
        flight: &str,
        departure: i64,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<RoundTicket> {
        self.transact(|engine| {
            let ticket = engine.coordinator.request_status_at(
                &engine.ledger,
                airline,
                flight,
                departure,
                caller,
                now,
            )?;
            let flight_id = engine.coordinator.round_flight(ticket.round_id).unwrap_or(0);
            engine.emit(
                MessageType::OracleRequest,
                PartitionKey::Flight(flight_id),
                &OracleRequest {
                    round_id: ticket.round_id,
                    index: ticket.key.index,
                    airline: airline.clone(),
                    flight: flight.to_string(),
                    departure,
                },
            )?;
            Ok(ticket)
        })
    }

    /// Record an oracle response
    #[allow(clippy::too_many_arguments)]
    pub fn submit_response(
        &mut self,
        index: u8,
        airline: &Address,
        flight: &str,
        departure: i64,
        code: u8,
        oracle: &Address,
    ) -> Result<SubmissionOutcome> {
        self.transact(|engine| {
            let outcome = engine.coordinator.submit_response(
                &mut engine.ledger,
                &engine.escrow,
                index,
                airline,
                flight,
                departure,
                code,
                oracle,
            )?;

            let (round_id, status) = match &outcome {
                SubmissionOutcome::Recorded {
                    round_id, status, ..
                }
                | SubmissionOutcome::Resolved {
                    round_id, status, ..
                } => (*round_id, *status),
                SubmissionOutcome::Ignored(_) => return Ok(outcome),
            };

            engine.emit(
                MessageType::OracleReport,
                PartitionKey::Oracle(oracle.to_string()),
                &OracleReport {
                    round_id,
                    oracle: oracle.clone(),
                    index,
                    airline: airline.clone(),
                    flight: flight.to_string(),
                    departure,
                    status,
                },
            )?;

            if let SubmissionOutcome::Resolved { effect_applied, .. } = outcome {
                let flight_id = engine.coordinator.round_flight(round_id).unwrap_or(0);
                engine.emit(
                    MessageType::FlightStatusInfo,
                    PartitionKey::Flight(flight_id),
                    &FlightStatusInfo {
                        round_id,
                        airline: airline.clone(),
                        flight: flight.to_string(),
                        departure,
                        status,
                        effect_applied,
                    },
                )?;
            }

            Ok(outcome)
        })
    }

    /// Expire open rounds older than the configured ttl, returning their ids
    pub fn expire_stale_rounds(&mut self, now: DateTime<Utc>) -> Result<Vec<u64>> {
        self.transact(|engine| {
            let expired = engine.coordinator.expire_stale_rounds(&engine.ledger, now)?;
            let mut ids = Vec::with_capacity(expired.len());
            for notice in &expired {
                let flight_id = engine.coordinator.round_flight(notice.round_id).unwrap_or(0);
                engine.emit(
                    MessageType::RoundExpired,
                    PartitionKey::Flight(flight_id),
                    notice,
                )?;
                ids.push(notice.round_id);
            }
            Ok(ids)
        })
    }

    // Helpers

    /// Run `op`, keeping its notifications only if it succeeds
    fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.flush_ledger_events()?;
        let mark = self.outbox.len();

        let result = op(self);
        if let Err(e) = &result {
            let dropped = self.ledger.drain_events().len() + (self.outbox.len() - mark);
            self.outbox.truncate(mark);
            debug!(error = %e, dropped, "Operation failed, notifications discarded");
        }
        result
    }

    fn emit<T: serde::Serialize>(
        &mut self,
        message_type: MessageType,
        partition_key: PartitionKey,
        payload: &T,
    ) -> Result<()> {
        // Ledger events recorded so far precede this notification
        self.flush_ledger_events()?;
        let message = Message::from_payload(message_type, partition_key, payload)?
            .with_header("service", self.config.service_name.clone());
        self.outbox.push(message);
        Ok(())
    }

    fn flush_ledger_events(&mut self) -> Result<()> {
        for event in self.ledger.drain_events() {
            if let Some((message_type, partition_key)) = route(&event) {
                let message = Message::from_payload(message_type, partition_key, &event)?
                    .with_header("service", self.config.service_name.clone());
                self.outbox.push(message);
            }
        }
        Ok(())
    }

    fn require_owner(&self, caller: &Address) -> Result<()> {
        if caller == self.ledger.owner() {
            Ok(())
        } else {
            Err(crate::Error::NotAuthorized(format!(
                "{} is not the owner",
                caller
            )))
        }
    }
}

/// Notification type and routing key for a ledger event
///
/// Voter and authorization changes are internal and not published.
fn route(event: &LedgerEvent) -> Option<(MessageType, PartitionKey)> {
    let routed = match event {
        LedgerEvent::AirlineRegistered { address, .. } => (
            MessageType::AirlineRegistered,
            PartitionKey::Airline(address.to_string()),
        ),
        LedgerEvent::FundsAdded { .. } => (MessageType::FundsAdded, PartitionKey::Global),
        LedgerEvent::FlightAvailableForInsurance { id } => (
            MessageType::FlightAvailableForInsurance,
            PartitionKey::Flight(*id),
        ),
        LedgerEvent::FlightUnavailableForInsurance { id } => (
            MessageType::FlightUnavailableForInsurance,
            PartitionKey::Flight(*id),
        ),
        LedgerEvent::FlightStatusUpdated { id, .. } => {
            (MessageType::FlightStatusUpdated, PartitionKey::Flight(*id))
        }
        LedgerEvent::InsurancePurchased { owner, .. } => (
            MessageType::InsurancePurchased,
            PartitionKey::Passenger(owner.to_string()),
        ),
        LedgerEvent::InsuranceCredited { owner, .. } => (
            MessageType::InsuranceCredited,
            PartitionKey::Passenger(owner.to_string()),
        ),
        LedgerEvent::InsuranceExpired { .. } => {
            (MessageType::InsuranceExpired, PartitionKey::Global)
        }
        LedgerEvent::FundsWithdrawn { to, .. } => (
            MessageType::FundsWithdrawn,
            PartitionKey::Passenger(to.to_string()),
        ),
        LedgerEvent::OperationalStatusChanged { .. } => {
            (MessageType::OperationalStatusChanged, PartitionKey::Global)
        }
        LedgerEvent::ConfigChanged { .. } => (MessageType::ConfigChanged, PartitionKey::Global),
        LedgerEvent::AirlineVoterEnabled { .. } | LedgerEvent::AuthorizedCallerChanged { .. } => {
            return None
        }
    };
    Some(routed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SequenceIndexSource;
    use crate::types::VoteTally;
    use ledger_core::{DepartureStatusCode, ErrorCategory};
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000;
    const DEPARTURE: i64 = 1_700_086_400;

    fn engine() -> (SuretyEngine, Address) {
        let config = Config::default();
        let owner = config.ledger.owner.clone();
        let engine =
            SuretyEngine::with_index_source(config, Box::new(SequenceIndexSource::new([2])))
                .unwrap();
        (engine, owner)
    }

    fn types(messages: &[Message]) -> Vec<MessageType> {
        messages.iter().map(|m| m.message_type).collect()
    }

    #[test]
    fn test_deployment_notifications() {
        let (mut engine, owner) = engine();
        let messages = engine.drain_outbox().unwrap();
        assert_eq!(
            types(&messages),
            vec![MessageType::AirlineRegistered, MessageType::FundsAdded]
        );
        assert!(engine
            .ledger()
            .is_authorized_caller(&engine.config().engine_address)
            .unwrap());
        assert!(engine.ledger().is_airline(&owner).unwrap());
    }

    #[test]
    fn test_failed_call_publishes_nothing() {
        let (mut engine, _) = engine();
        engine.drain_outbox().unwrap();

        let err = engine
            .register_airline(Address::new("0xcandidate"), &Address::new("0xstranger"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotAuthorized);
        assert!(engine.drain_outbox().unwrap().is_empty());
    }

    #[test]
    fn test_vote_counted_notification() {
        let (mut engine, owner) = engine();
        for n in 2..=4 {
            engine
                .register_airline(Address::new(format!("0xairline{}", n)), &owner)
                .unwrap();
        }
        engine.drain_outbox().unwrap();

        engine
            .register_airline(Address::new("0xairline5"), &owner)
            .unwrap();
        let messages = engine.drain_outbox().unwrap();
        assert_eq!(
            types(&messages),
            vec![MessageType::AirlineRegistered, MessageType::VoteCounted]
        );
        let tally: VoteTally = messages[1].decode_payload().unwrap();
        assert!(tally.is_consensus_reached);
    }

    #[test]
    fn test_status_round_notifications() {
        let (mut engine, owner) = engine();
        let passenger = Address::new("0xalice");
        let flight_id = engine
            .register_flight_at("ND1309", DEPARTURE, &owner, NOW)
            .unwrap();
        engine
            .buy_insurance(flight_id, dec!(0.5), passenger.clone())
            .unwrap();
        for n in 1..=3 {
            engine
                .register_oracle(Address::new(format!("0xoracle{}", n)), dec!(1))
                .unwrap();
        }
        engine.drain_outbox().unwrap();

        let ticket = engine
            .request_status(&owner, "ND1309", DEPARTURE, &passenger)
            .unwrap();
        let messages = engine.drain_outbox().unwrap();
        assert_eq!(types(&messages), vec![MessageType::OracleRequest]);
        let request: OracleRequest = messages[0].decode_payload().unwrap();
        assert_eq!(request.key(), ticket.key);

        for n in 1..=3 {
            let oracle = Address::new(format!("0xoracle{}", n));
            engine
                .submit_response(2, &owner, "ND1309", DEPARTURE, 20, &oracle)
                .unwrap();
        }
        let messages = engine.drain_outbox().unwrap();
        assert_eq!(
            types(&messages),
            vec![
                MessageType::OracleReport,
                MessageType::OracleReport,
                MessageType::FlightStatusUpdated,
                MessageType::FlightUnavailableForInsurance,
                MessageType::InsuranceCredited,
                MessageType::OracleReport,
                MessageType::FlightStatusInfo,
            ]
        );
        let info: FlightStatusInfo = messages[6].decode_payload().unwrap();
        assert_eq!(info.status, DepartureStatusCode::LateAirline);
        assert!(info.effect_applied);
        assert_eq!(engine.ledger().get_credited_amount(&passenger).unwrap(), dec!(0.75));
    }

    #[test]
    fn test_set_airline_voter_owner_only() {
        let (mut engine, owner) = engine();
        let airline = Address::new("0xairline2");
        engine.register_airline(airline.clone(), &owner).unwrap();

        let err = engine.set_airline_voter(&airline, &airline).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotAuthorized);

        engine.set_airline_voter(&airline, &owner).unwrap();
        assert_eq!(engine.ledger().voters_count().unwrap(), 2);
    }

    #[test]
    fn test_expiry_notifications() {
        let (mut engine, owner) = engine();
        engine
            .register_flight_at("ND1309", DEPARTURE, &owner, NOW)
            .unwrap();
        let opened = DateTime::from_timestamp(NOW, 0).unwrap();
        let ticket = engine
            .request_status_at(&owner, "ND1309", DEPARTURE, &owner, opened)
            .unwrap();
        engine.drain_outbox().unwrap();

        let later = opened + chrono::Duration::seconds(7200);
        assert_eq!(engine.expire_stale_rounds(later).unwrap(), vec![ticket.round_id]);
        let messages = engine.drain_outbox().unwrap();
        assert_eq!(types(&messages), vec![MessageType::RoundExpired]);
    }
}
