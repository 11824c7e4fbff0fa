//! Oracle consensus coordinator
//!
//! Oracles register once and are dealt three distinct indexes. A status
//! request draws one index and opens (or reuses) the round keyed by
//! `(index, airline, flight, departure)`. Only oracles holding that index
//! may answer, each at most once per round. The first status to gather
//! `min_responses` distinct responders resolves the round, and the
//! resolution effect runs exactly once.
//!
//! ```text
//! Open ──quorum──▶ Resolved
//!   │
//!   └──ttl──▶ Expired
//! ```
//!
//! Responses to resolved or expired rounds are accepted but inert.

use crate::{
    config::OracleConfig,
    error::ensure_operational,
    escrow::Escrow,
    random::{draw_distinct, IndexSource},
    types::{
        IgnoredReason, OracleRegistration, RoundExpired, RoundKey, RoundStatus, RoundTicket,
        StatusRound, SubmissionOutcome, INDEXES_PER_ORACLE,
    },
    Error, Result,
};
use chrono::{DateTime, Duration, Utc};
use ledger_core::{Address, Amount, DepartureStatusCode, Ledger};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Round bookkeeping and oracle registry
#[derive(Debug)]
pub struct OracleCoordinator {
    config: OracleConfig,
    engine: Address,
    oracles: BTreeMap<Address, OracleRegistration>,
    rounds: BTreeMap<u64, StatusRound>,
    /// Latest round per key
    round_index: HashMap<RoundKey, u64>,
    next_round_id: u64,
    index_source: Box<dyn IndexSource>,
}

impl OracleCoordinator {
    /// Create coordinator
    pub fn new(config: OracleConfig, engine: Address, index_source: Box<dyn IndexSource>) -> Self {
        Self {
            config,
            engine,
            oracles: BTreeMap::new(),
            rounds: BTreeMap::new(),
            round_index: HashMap::new(),
            next_round_id: 1,
            index_source,
        }
    }

    /// Register an oracle, taking its fee into custody
    pub fn register_oracle(
        &mut self,
        ledger: &mut Ledger,
        address: Address,
        fee_paid: Amount,
    ) -> Result<[u8; INDEXES_PER_ORACLE]> {
        ensure_operational(ledger)?;

        if self.oracles.contains_key(&address) {
            return Err(Error::AlreadyExists(format!("oracle {}", address)));
        }
        if fee_paid < self.config.registration_fee {
            return Err(Error::PolicyViolation(format!(
                "oracle registration fee {} is below the required {}",
                fee_paid, self.config.registration_fee
            )));
        }

        if !fee_paid.is_zero() {
            ledger.add_funds(address.clone(), fee_paid, &self.engine)?;
        }

        let indexes = draw_distinct(self.index_source.as_mut(), self.config.index_range);
        self.oracles.insert(
            address.clone(),
            OracleRegistration {
                address: address.clone(),
                indexes,
                registered_at: Utc::now(),
            },
        );

        info!(oracle = %address, ?indexes, "Oracle registered");
        Ok(indexes)
    }

    /// Indexes assigned to an oracle
    pub fn get_my_indexes(
        &self,
        ledger: &Ledger,
        address: &Address,
    ) -> Result<[u8; INDEXES_PER_ORACLE]> {
        self.oracle(ledger, address)
            .map(|registration| registration.indexes)
    }

    /// Registration record of an oracle
    pub fn oracle(&self, ledger: &Ledger, address: &Address) -> Result<&OracleRegistration> {
        ensure_operational(ledger)?;
        self.oracles
            .get(address)
            .ok_or_else(|| Error::NotFound(format!("oracle {}", address)))
    }

    /// Number of registered oracles
    pub fn oracles_count(&self, ledger: &Ledger) -> Result<usize> {
        ensure_operational(ledger)?;
        Ok(self.oracles.len())
    }

    /// Round by id
    pub fn round(&self, ledger: &Ledger, id: u64) -> Result<Option<&StatusRound>> {
        ensure_operational(ledger)?;
        Ok(self.rounds.get(&id))
    }

    /// Flight a round was opened for
    pub(crate) fn round_flight(&self, id: u64) -> Option<u64> {
        self.rounds.get(&id).map(|round| round.flight_id)
    }

    /// Ids of rounds still collecting responses
    pub fn open_rounds(&self) -> Vec<u64> {
        self.rounds
            .values()
            .filter(|round| round.is_open())
            .map(|round| round.id)
            .collect()
    }

    /// Ask oracles for the status of a registered, unresolved flight
    pub fn request_status_at(
        &mut self,
        ledger: &Ledger,
        airline: &Address,
        flight: &str,
        departure: i64,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<RoundTicket> {
        ensure_operational(ledger)?;

        let flight_key = ledger.create_flight_key(airline, flight, departure);
        let flight_id = ledger.get_flight_id_by_key(&flight_key)?;
        let record = ledger.get_flight(flight_id)?;
        if record.departure_status_code != DepartureStatusCode::Unknown {
            return Err(Error::InvalidState(format!(
                "flight {} already resolved as {}",
                flight_id, record.departure_status_code
            )));
        }

        let index = self.index_source.next_index(self.config.index_range) % self.config.index_range;
        let key = RoundKey {
            index,
            airline: airline.clone(),
            flight: flight.to_string(),
            departure,
        };

        if let Some(&round_id) = self.round_index.get(&key) {
            if self.rounds.get(&round_id).map_or(false, StatusRound::is_open) {
                debug!(round_id, round = %key, requester = %caller, "Reusing open round");
                return Ok(RoundTicket {
                    round_id,
                    key,
                    reused: true,
                });
            }
        }

        let round_id = self.next_round_id;
        self.next_round_id += 1;
        self.rounds.insert(
            round_id,
            StatusRound::open(round_id, key.clone(), flight_id, now),
        );
        self.round_index.insert(key.clone(), round_id);

        info!(round_id, round = %key, requester = %caller, "Status round opened");
        Ok(RoundTicket {
            round_id,
            key,
            reused: false,
        })
    }

    /// Record an oracle response
    #[allow(clippy::too_many_arguments)]
    pub fn submit_response(
        &mut self,
        ledger: &mut Ledger,
        escrow: &Escrow,
        index: u8,
        airline: &Address,
        flight: &str,
        departure: i64,
        code: u8,
        oracle: &Address,
    ) -> Result<SubmissionOutcome> {
        ensure_operational(ledger)?;

        let status = DepartureStatusCode::from_code(code)
            .ok_or_else(|| Error::PolicyViolation(format!("unknown status code {}", code)))?;
        let registration = self
            .oracles
            .get(oracle)
            .ok_or_else(|| Error::NotFound(format!("oracle {}", oracle)))?;
        if !registration.has_index(index) {
            return Err(Error::InvalidState("invalid index".to_string()));
        }

        let key = RoundKey {
            index,
            airline: airline.clone(),
            flight: flight.to_string(),
            departure,
        };
        let Some(&round_id) = self.round_index.get(&key) else {
            warn!(round = %key, oracle = %oracle, "Response for a round that was never opened");
            return Ok(SubmissionOutcome::Ignored(IgnoredReason::NoRound));
        };

        let min_responses = self.config.min_responses;
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| Error::NotFound(format!("round {}", round_id)))?;

        match round.status {
            RoundStatus::Open => {}
            RoundStatus::Resolved { status: resolved } => {
                warn!(round_id, oracle = %oracle, %status, "Late response to resolved round");
                return Ok(SubmissionOutcome::Ignored(IgnoredReason::RoundResolved {
                    round_id,
                    status: resolved,
                }));
            }
            RoundStatus::Expired => {
                warn!(round_id, oracle = %oracle, %status, "Late response to expired round");
                return Ok(SubmissionOutcome::Ignored(IgnoredReason::RoundExpired {
                    round_id,
                }));
            }
        }

        if round.has_responded(oracle) {
            return Err(Error::InvalidState(format!(
                "oracle {} already responded to round {}",
                oracle, round_id
            )));
        }

        let count = round.response_count(status) + 1;
        if count < min_responses {
            round.responses.entry(status).or_default().insert(oracle.clone());
            debug!(round_id, oracle = %oracle, %status, count, "Response recorded");
            return Ok(SubmissionOutcome::Recorded {
                round_id,
                status,
                count,
            });
        }

        // Quorum: run every check before mutating anything
        let flight_id = round.flight_id;
        let current = ledger.get_flight(flight_id)?.departure_status_code;
        let effect_applied =
            current == DepartureStatusCode::Unknown && status != DepartureStatusCode::Unknown;

        if effect_applied {
            let payouts = if status.is_compensable() {
                escrow.payouts(ledger, flight_id)?
            } else {
                Vec::new()
            };
            let total = Escrow::total(&payouts)?;
            let uncommitted = ledger.treasury()?.uncommitted();
            if total > uncommitted {
                return Err(Error::PolicyViolation(format!(
                    "payouts {} exceed uncommitted funds {}",
                    total, uncommitted
                )));
            }
            escrow.apply_resolution(ledger, flight_id, status, &payouts)?;
        }

        round.responses.entry(status).or_default().insert(oracle.clone());
        round.status = RoundStatus::Resolved { status };

        info!(
            round_id,
            round = %round.key,
            %status,
            responders = count,
            effect_applied,
            "Status round resolved"
        );
        Ok(SubmissionOutcome::Resolved {
            round_id,
            status,
            effect_applied,
        })
    }

    /// Expire open rounds older than the configured ttl
    pub fn expire_stale_rounds(
        &mut self,
        ledger: &Ledger,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoundExpired>> {
        ensure_operational(ledger)?;

        let ttl = Duration::seconds(i64::try_from(self.config.round_ttl_secs).unwrap_or(i64::MAX));
        let mut expired = Vec::new();

        for round in self.rounds.values_mut() {
            if !round.is_open() {
                continue;
            }
            let deadline = round.opened_at.checked_add_signed(ttl);
            if deadline.map_or(false, |deadline| deadline <= now) {
                round.status = RoundStatus::Expired;
                info!(round_id = round.id, round = %round.key, "Status round expired");
                expired.push(RoundExpired {
                    round_id: round.id,
                    key: round.key.clone(),
                    opened_at: round.opened_at,
                });
            }
        }

        Ok(expired)
    }
}
