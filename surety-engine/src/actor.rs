//! Single-writer actor around the surety engine
//!
//! Every entry point runs to completion before the next one starts, so
//! concurrent callers (airlines, passengers, many oracles) are linearized
//! without locks:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │   EngineHandle (Clone) × airlines/oracles     │
//! └──────────────────────┬────────────────────────┘
//!                        │ mpsc::channel (bounded)
//!                        ▼
//! ┌───────────────────────────────────────────────┐
//! │            EngineActor (single task)          │
//! │   SuretyEngine::op() → drain outbox           │
//! └──────────────────────┬────────────────────────┘
//!                        │ Publisher::publish
//!                        ▼
//!                 message bus subscribers
//! ```
//!
//! Notifications are published only after the command that produced them
//! succeeded, and before its reply is sent.

use crate::{
    engine::SuretyEngine,
    types::{RegistrationOutcome, RoundTicket, StatusRound, SubmissionOutcome, INDEXES_PER_ORACLE},
    Error, Result,
};
use chrono::{DateTime, Utc};
use ledger_core::{Address, Airline, Amount, Flight, FlightKey, Insurance, Transfer, Treasury};
use message_bus::Publisher;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Owner-only policy change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyUpdate {
    /// Airline registration fee
    RegistrationFee(Amount),
    /// Per-insurance cap
    InsuranceCap(Amount),
    /// Admission consensus fraction
    ConsensusMultipliers {
        /// Numerator
        numerator: u32,
        /// Denominator
        denominator: u32,
    },
    /// Payout multiple
    PremiumMultiplier {
        /// Numerator
        numerator: u32,
        /// Denominator
        denominator: u32,
    },
}

/// Message sent to the engine actor
pub enum EngineMessage {
    /// Register or vote for an airline
    RegisterAirline {
        candidate: Address,
        caller: Address,
        response: Reply<RegistrationOutcome>,
    },

    /// Pay the registration fee
    PayRegistrationFee {
        caller: Address,
        value: Amount,
        response: Reply<()>,
    },

    /// Grant voting rights (owner)
    SetAirlineVoter {
        airline: Address,
        caller: Address,
        response: Reply<()>,
    },

    /// Pause or resume (owner)
    SetOperationalStatus {
        operational: bool,
        caller: Address,
        response: Reply<()>,
    },

    /// Grant or revoke ledger write access (owner)
    SetAuthorizedCaller {
        address: Address,
        authorized: bool,
        caller: Address,
        response: Reply<()>,
    },

    /// Change a policy value (owner)
    UpdatePolicy {
        update: PolicyUpdate,
        caller: Address,
        response: Reply<()>,
    },

    /// Donate funds
    Fund {
        from: Address,
        value: Amount,
        response: Reply<Amount>,
    },

    /// Register a flight for the calling airline
    RegisterFlight {
        code: String,
        departure: i64,
        caller: Address,
        now: Option<i64>,
        response: Reply<u64>,
    },

    /// Buy insurance
    BuyInsurance {
        flight_id: u64,
        amount: Amount,
        passenger: Address,
        response: Reply<u64>,
    },

    /// Withdraw credited funds
    Withdraw {
        amount: Amount,
        passenger: Address,
        caller: Address,
        response: Reply<Transfer>,
    },

    /// Register an oracle
    RegisterOracle {
        address: Address,
        fee_paid: Amount,
        response: Reply<[u8; INDEXES_PER_ORACLE]>,
    },

    /// Open (or reuse) a status round
    RequestStatus {
        airline: Address,
        flight: String,
        departure: i64,
        caller: Address,
        response: Reply<RoundTicket>,
    },

    /// Oracle response
    SubmitResponse {
        index: u8,
        airline: Address,
        flight: String,
        departure: i64,
        code: u8,
        oracle: Address,
        response: Reply<SubmissionOutcome>,
    },

    /// Expire stale rounds
    ExpireStaleRounds {
        now: DateTime<Utc>,
        response: Reply<Vec<u64>>,
    },

    /// Read-only query against the engine
    Query(Box<dyn FnOnce(&SuretyEngine) + Send>),

    /// Shutdown actor
    Shutdown,
}

impl EngineMessage {
    fn kind(&self) -> &'static str {
        match self {
            EngineMessage::RegisterAirline { .. } => "register_airline",
            EngineMessage::PayRegistrationFee { .. } => "pay_registration_fee",
            EngineMessage::SetAirlineVoter { .. } => "set_airline_voter",
            EngineMessage::SetOperationalStatus { .. } => "set_operational_status",
            EngineMessage::SetAuthorizedCaller { .. } => "set_authorized_caller",
            EngineMessage::UpdatePolicy { .. } => "update_policy",
            EngineMessage::Fund { .. } => "fund",
            EngineMessage::RegisterFlight { .. } => "register_flight",
            EngineMessage::BuyInsurance { .. } => "buy_insurance",
            EngineMessage::Withdraw { .. } => "withdraw",
            EngineMessage::RegisterOracle { .. } => "register_oracle",
            EngineMessage::RequestStatus { .. } => "request_status",
            EngineMessage::SubmitResponse { .. } => "submit_response",
            EngineMessage::ExpireStaleRounds { .. } => "expire_stale_rounds",
            EngineMessage::Query(_) => "query",
            EngineMessage::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EngineMessage").field(&self.kind()).finish()
    }
}

/// Actor that owns the engine
pub struct EngineActor {
    engine: SuretyEngine,
    mailbox: mpsc::Receiver<EngineMessage>,
    publisher: Arc<dyn Publisher>,
}

impl fmt::Debug for EngineActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineActor")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl EngineActor {
    /// Create new actor
    pub fn new(
        engine: SuretyEngine,
        mailbox: mpsc::Receiver<EngineMessage>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            engine,
            mailbox,
            publisher,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        // Deployment notifications
        self.publish_outbox().await;

        while let Some(msg) = self.mailbox.recv().await {
            if let EngineMessage::Shutdown = msg {
                info!("Engine actor shutting down");
                break;
            }
            debug!(command = msg.kind(), "Handling command");
            self.handle_message(msg).await;
        }

        self.publish_outbox().await;
    }

    /// Handle a single message
    async fn handle_message(&mut self, msg: EngineMessage) {
        let engine = &mut self.engine;

        match msg {
            EngineMessage::RegisterAirline {
                candidate,
                caller,
                response,
            } => {
                let result = engine.register_airline(candidate, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::PayRegistrationFee {
                caller,
                value,
                response,
            } => {
                let result = engine.pay_registration_fee(&caller, value);
                self.reply(response, result).await;
            }

            EngineMessage::SetAirlineVoter {
                airline,
                caller,
                response,
            } => {
                let result = engine.set_airline_voter(&airline, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::SetOperationalStatus {
                operational,
                caller,
                response,
            } => {
                let result = engine.set_operational_status(operational, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::SetAuthorizedCaller {
                address,
                authorized,
                caller,
                response,
            } => {
                let result = engine.set_authorized_caller(address, authorized, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::UpdatePolicy {
                update,
                caller,
                response,
            } => {
                let result = match update {
                    PolicyUpdate::RegistrationFee(fee) => engine.set_registration_fee(fee, &caller),
                    PolicyUpdate::InsuranceCap(cap) => engine.set_insurance_cap(cap, &caller),
                    PolicyUpdate::ConsensusMultipliers {
                        numerator,
                        denominator,
                    } => engine.set_consensus_multipliers(numerator, denominator, &caller),
                    PolicyUpdate::PremiumMultiplier {
                        numerator,
                        denominator,
                    } => engine.set_insurance_premium_multiplier(numerator, denominator, &caller),
                };
                self.reply(response, result).await;
            }

            EngineMessage::Fund {
                from,
                value,
                response,
            } => {
                let result = engine.fund(from, value);
                self.reply(response, result).await;
            }

            EngineMessage::RegisterFlight {
                code,
                departure,
                caller,
                now,
                response,
            } => {
                let result = match now {
                    Some(now) => engine.register_flight_at(&code, departure, &caller, now),
                    None => engine.register_flight(&code, departure, &caller),
                };
                self.reply(response, result).await;
            }

            EngineMessage::BuyInsurance {
                flight_id,
                amount,
                passenger,
                response,
            } => {
                let result = engine.buy_insurance(flight_id, amount, passenger);
                self.reply(response, result).await;
            }

            EngineMessage::Withdraw {
                amount,
                passenger,
                caller,
                response,
            } => {
                let result = engine.withdraw(amount, &passenger, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::RegisterOracle {
                address,
                fee_paid,
                response,
            } => {
                let result = engine.register_oracle(address, fee_paid);
                self.reply(response, result).await;
            }

            EngineMessage::RequestStatus {
                airline,
                flight,
                departure,
                caller,
                response,
            } => {
                let result = engine.request_status(&airline, &flight, departure, &caller);
                self.reply(response, result).await;
            }

            EngineMessage::SubmitResponse {
                index,
                airline,
                flight,
                departure,
                code,
                oracle,
                response,
            } => {
                let result =
                    engine.submit_response(index, &airline, &flight, departure, code, &oracle);
                self.reply(response, result).await;
            }

            EngineMessage::ExpireStaleRounds { now, response } => {
                let result = engine.expire_stale_rounds(now);
                self.reply(response, result).await;
            }

            EngineMessage::Query(query) => query(&self.engine),

            EngineMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Publish the command's notifications, then answer the caller
    async fn reply<T>(&mut self, response: Reply<T>, result: Result<T>) {
        if let Err(e) = &result {
            debug!(error = %e, "Command rejected");
        }
        self.publish_outbox().await;
        let _ = response.send(result);
    }

    async fn publish_outbox(&mut self) {
        let messages = match self.engine.drain_outbox() {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to build notifications");
                return;
            }
        };

        for message in messages {
            let subject = message.subject();
            if let Err(e) = self.publisher.publish(message).await {
                error!(%subject, error = %e, "Failed to publish notification");
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EngineMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> EngineMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run a read-only closure against the engine
    pub async fn query<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SuretyEngine) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let query = Box::new(move |engine: &SuretyEngine| {
            let _ = tx.send(query(engine));
        });
        self.sender
            .send(EngineMessage::Query(query))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    // Airlines

    /// Register (or vote for) a candidate airline
    pub async fn register_airline(
        &self,
        candidate: Address,
        caller: Address,
    ) -> Result<RegistrationOutcome> {
        self.call(|response| EngineMessage::RegisterAirline {
            candidate,
            caller,
            response,
        })
        .await
    }

    /// Pay the registration fee
    pub async fn pay_registration_fee(&self, caller: Address, value: Amount) -> Result<()> {
        self.call(|response| EngineMessage::PayRegistrationFee {
            caller,
            value,
            response,
        })
        .await
    }

    /// Grant voting rights (owner)
    pub async fn set_airline_voter(&self, airline: Address, caller: Address) -> Result<()> {
        self.call(|response| EngineMessage::SetAirlineVoter {
            airline,
            caller,
            response,
        })
        .await
    }

    /// Airline by address
    pub async fn get_airline(&self, address: Address) -> Result<Airline> {
        self.query(move |engine| engine.ledger().get_airline(&address))
            .await?
            .map_err(Error::from)
    }

    /// Whether an address is a registered airline
    pub async fn is_airline(&self, address: Address) -> Result<bool> {
        self.query(move |engine| engine.ledger().is_airline(&address))
            .await?
            .map_err(Error::from)
    }

    /// Number of airlines
    pub async fn airlines_count(&self) -> Result<u64> {
        self.query(|engine| engine.ledger().airlines_count())
            .await?
            .map_err(Error::from)
    }

    /// Number of voting airlines
    pub async fn voters_count(&self) -> Result<u64> {
        self.query(|engine| engine.ledger().voters_count())
            .await?
            .map_err(Error::from)
    }

    // Administration

    /// Operational flag
    pub async fn is_operational(&self) -> Result<bool> {
        self.query(|engine| engine.ledger().is_operational()).await
    }

    /// Pause or resume (owner)
    pub async fn set_operational_status(&self, operational: bool, caller: Address) -> Result<()> {
        self.call(|response| EngineMessage::SetOperationalStatus {
            operational,
            caller,
            response,
        })
        .await
    }

    /// Grant or revoke ledger write access (owner)
    pub async fn set_authorized_caller(
        &self,
        address: Address,
        authorized: bool,
        caller: Address,
    ) -> Result<()> {
        self.call(|response| EngineMessage::SetAuthorizedCaller {
            address,
            authorized,
            caller,
            response,
        })
        .await
    }

    /// Change a policy value (owner)
    pub async fn update_policy(&self, update: PolicyUpdate, caller: Address) -> Result<()> {
        self.call(|response| EngineMessage::UpdatePolicy {
            update,
            caller,
            response,
        })
        .await
    }

    // Funds

    /// Donate funds, returning funds held afterwards
    pub async fn fund(&self, from: Address, value: Amount) -> Result<Amount> {
        self.call(|response| EngineMessage::Fund {
            from,
            value,
            response,
        })
        .await
    }

    /// Custody accounting
    pub async fn treasury(&self) -> Result<Treasury> {
        self.query(|engine| engine.ledger().treasury())
            .await?
            .map_err(Error::from)
    }

    /// Funds held cover every credit balance
    pub async fn check_solvency(&self) -> Result<bool> {
        self.query(|engine| engine.ledger().check_solvency()).await
    }

    // Flights and insurance

    /// Register a flight for the calling airline
    pub async fn register_flight(
        &self,
        code: impl Into<String>,
        departure: i64,
        caller: Address,
    ) -> Result<u64> {
        let code = code.into();
        self.call(|response| EngineMessage::RegisterFlight {
            code,
            departure,
            caller,
            now: None,
            response,
        })
        .await
    }

    /// Register a flight, judging departure against `now`
    pub async fn register_flight_at(
        &self,
        code: impl Into<String>,
        departure: i64,
        caller: Address,
        now: i64,
    ) -> Result<u64> {
        let code = code.into();
        self.call(|response| EngineMessage::RegisterFlight {
            code,
            departure,
            caller,
            now: Some(now),
            response,
        })
        .await
    }

    /// Flight by id
    pub async fn get_flight(&self, id: u64) -> Result<Flight> {
        self.query(move |engine| engine.ledger().get_flight(id))
            .await?
            .map_err(Error::from)
    }

    /// Deterministic flight key
    pub async fn create_flight_key(
        &self,
        airline: Address,
        code: impl Into<String>,
        departure: i64,
    ) -> Result<FlightKey> {
        let code = code.into();
        self.query(move |engine| engine.ledger().create_flight_key(&airline, &code, departure))
            .await
    }

    /// Flight id by key
    pub async fn get_flight_id_by_key(&self, key: FlightKey) -> Result<u64> {
        self.query(move |engine| engine.ledger().get_flight_id_by_key(&key))
            .await?
            .map_err(Error::from)
    }

    /// Number of flights
    pub async fn flights_count(&self) -> Result<u64> {
        self.query(|engine| engine.ledger().flights_count())
            .await?
            .map_err(Error::from)
    }

    /// Buy insurance
    pub async fn buy_insurance(
        &self,
        flight_id: u64,
        amount: Amount,
        passenger: Address,
    ) -> Result<u64> {
        self.call(|response| EngineMessage::BuyInsurance {
            flight_id,
            amount,
            passenger,
            response,
        })
        .await
    }

    /// Insurance by id
    pub async fn get_insurance(&self, id: u64) -> Result<Insurance> {
        self.query(move |engine| engine.ledger().get_insurance(id))
            .await?
            .map_err(Error::from)
    }

    /// Insurance ids of a flight
    pub async fn get_insurances_by_flight(&self, flight_id: u64) -> Result<Vec<u64>> {
        self.query(move |engine| engine.ledger().get_insurances_by_flight(flight_id))
            .await?
            .map_err(Error::from)
    }

    /// Insurance ids of a passenger
    pub async fn get_insurances_by_passenger(&self, passenger: Address) -> Result<Vec<u64>> {
        self.query(move |engine| engine.ledger().get_insurances_by_passenger(&passenger))
            .await?
            .map_err(Error::from)
    }

    /// Number of insurances
    pub async fn insurances_count(&self) -> Result<u64> {
        self.query(|engine| engine.ledger().insurances_count())
            .await?
            .map_err(Error::from)
    }

    /// Withdrawable balance of a passenger
    pub async fn get_credited_amount(&self, passenger: Address) -> Result<Amount> {
        self.query(move |engine| engine.ledger().get_credited_amount(&passenger))
            .await?
            .map_err(Error::from)
    }

    /// Withdraw credited funds
    pub async fn withdraw(
        &self,
        amount: Amount,
        passenger: Address,
        caller: Address,
    ) -> Result<Transfer> {
        self.call(|response| EngineMessage::Withdraw {
            amount,
            passenger,
            caller,
            response,
        })
        .await
    }

    // Oracles

    /// Register an oracle
    pub async fn register_oracle(
        &self,
        address: Address,
        fee_paid: Amount,
    ) -> Result<[u8; INDEXES_PER_ORACLE]> {
        self.call(|response| EngineMessage::RegisterOracle {
            address,
            fee_paid,
            response,
        })
        .await
    }

    /// Indexes assigned to an oracle
    pub async fn get_my_indexes(&self, address: Address) -> Result<[u8; INDEXES_PER_ORACLE]> {
        self.query(move |engine| engine.get_my_indexes(&address))
            .await?
    }

    /// Number of registered oracles
    pub async fn oracles_count(&self) -> Result<usize> {
        self.query(|engine| engine.oracles_count()).await?
    }

    /// Ask oracles for a flight's status
    pub async fn request_status(
        &self,
        airline: Address,
        flight: impl Into<String>,
        departure: i64,
        caller: Address,
    ) -> Result<RoundTicket> {
        let flight = flight.into();
        self.call(|response| EngineMessage::RequestStatus {
            airline,
            flight,
            departure,
            caller,
            response,
        })
        .await
    }

    /// Submit an oracle response
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_response(
        &self,
        index: u8,
        airline: Address,
        flight: impl Into<String>,
        departure: i64,
        code: u8,
        oracle: Address,
    ) -> Result<SubmissionOutcome> {
        let flight = flight.into();
        self.call(|response| EngineMessage::SubmitResponse {
            index,
            airline,
            flight,
            departure,
            code,
            oracle,
            response,
        })
        .await
    }

    /// Expire rounds older than the configured ttl
    pub async fn expire_stale_rounds(&self, now: DateTime<Utc>) -> Result<Vec<u64>> {
        self.call(|response| EngineMessage::ExpireStaleRounds { now, response })
            .await
    }

    /// Round by id
    pub async fn round(&self, id: u64) -> Result<Option<StatusRound>> {
        self.query(move |engine| engine.round(id).map(|round| round.cloned()))
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the engine actor
pub fn spawn_engine_actor(
    engine: SuretyEngine,
    publisher: Arc<dyn Publisher>,
    mailbox_capacity: usize,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = EngineActor::new(engine, rx, publisher);

    tokio::spawn(async move {
        actor.run().await;
    });

    EngineHandle::new(tx)
}
