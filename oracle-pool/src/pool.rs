//! Oracle pool: registration and request answering

use crate::{
    config::PoolConfig,
    oracle::{Behaviour, SimulatedOracle},
    Result,
};
use async_trait::async_trait;
use futures::future::join_all;
use ledger_core::{Address, DepartureStatusCode, ErrorCategory};
use message_bus::{InMemoryBus, Message, MessageFilter, MessageHandler, MessageType};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use surety_engine::{EngineHandle, OracleRequest, SubmissionOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One oracle's answer to a request and what the engine made of it
#[derive(Debug)]
pub struct Submission {
    /// Answering oracle
    pub oracle: Address,
    /// Reported status
    pub status: DepartureStatusCode,
    /// Engine verdict
    pub result: surety_engine::Result<SubmissionOutcome>,
}

/// Registered oracles answering status requests
#[derive(Debug)]
pub struct OraclePool {
    handle: EngineHandle,
    oracles: Vec<SimulatedOracle>,
    rng: Mutex<StdRng>,
}

impl OraclePool {
    /// Register every oracle of the pool with the engine
    ///
    /// The first `late_reporters()` oracles always report LATE_AIRLINE.
    /// An address the engine already knows keeps its earlier assignment.
    pub async fn register(handle: EngineHandle, config: &PoolConfig) -> Result<Self> {
        config.validate()?;

        let late = config.late_reporters();
        let mut oracles = Vec::with_capacity(config.oracles);

        for n in 0..config.oracles {
            let address = Address::new(format!("0xoracle{:04}", n + 1));
            let behaviour = if n < late {
                Behaviour::AlwaysLateAirline
            } else {
                Behaviour::Random
            };

            let indexes = match handle
                .register_oracle(address.clone(), config.registration_fee)
                .await
            {
                Ok(indexes) => indexes,
                Err(e) if e.category() == ErrorCategory::AlreadyExists => {
                    warn!(oracle = %address, "Oracle already registered, reusing its indexes");
                    handle.get_my_indexes(address.clone()).await?
                }
                Err(e) => return Err(e.into()),
            };

            debug!(oracle = %address, ?indexes, ?behaviour, "Oracle registered");
            oracles.push(SimulatedOracle::new(address, indexes, behaviour));
        }

        info!(oracles = oracles.len(), late, "Oracle pool registered");

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            handle,
            oracles,
            rng: Mutex::new(rng),
        })
    }

    /// Registered oracles
    pub fn oracles(&self) -> &[SimulatedOracle] {
        &self.oracles
    }

    /// Oracles that would answer a request for this index
    pub fn holders(&self, index: u8) -> usize {
        self.oracles.iter().filter(|oracle| oracle.holds(index)).count()
    }

    /// Let every oracle holding the index answer, submissions racing each other
    pub async fn answer(&self, request: &OracleRequest) -> Vec<Submission> {
        let picks: Vec<(&SimulatedOracle, DepartureStatusCode)> = {
            let mut rng = self.rng.lock();
            self.oracles
                .iter()
                .filter_map(|oracle| {
                    oracle
                        .answer(request.index, &mut *rng)
                        .map(|status| (oracle, status))
                })
                .collect()
        };

        let submissions = picks.into_iter().map(|(oracle, status)| async move {
            let result = self
                .handle
                .submit_response(
                    request.index,
                    request.airline.clone(),
                    request.flight.clone(),
                    request.departure,
                    status.code(),
                    oracle.address.clone(),
                )
                .await;

            Submission {
                oracle: oracle.address.clone(),
                status,
                result,
            }
        });

        join_all(submissions).await
    }

    /// Subscribe to status requests and answer them until the bus closes
    pub fn spawn(self: Arc<Self>, bus: &InMemoryBus) -> JoinHandle<message_bus::Result<()>> {
        let subscriber = bus.subscribe(
            "oracle-pool",
            MessageFilter::only([MessageType::OracleRequest]),
        );
        tokio::spawn(subscriber.run(self))
    }
}

#[async_trait]
impl MessageHandler for OraclePool {
    async fn handle(&self, message: Message) -> message_bus::Result<()> {
        let request: OracleRequest = message.decode_payload()?;
        info!(
            round_id = request.round_id,
            index = request.index,
            airline = %request.airline,
            flight = %request.flight,
            "Status requested"
        );

        let submissions = self.answer(&request).await;
        if submissions.is_empty() {
            warn!(index = request.index, "No oracle holds the requested index");
        }

        for submission in submissions {
            match submission.result {
                Ok(SubmissionOutcome::Resolved { status, effect_applied, .. }) => info!(
                    oracle = %submission.oracle,
                    %status,
                    effect_applied,
                    "Round resolved"
                ),
                Ok(outcome) => debug!(
                    oracle = %submission.oracle,
                    status = %submission.status,
                    ?outcome,
                    "Response submitted"
                ),
                Err(e) => warn!(
                    oracle = %submission.oracle,
                    status = %submission.status,
                    error = %e,
                    "Response rejected"
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use surety_engine::{spawn_engine_actor, Config, SequenceIndexSource, SuretyEngine};

    fn spawn_engine() -> (EngineHandle, Address) {
        let config = Config::default();
        let owner = config.ledger.owner.clone();
        let engine =
            SuretyEngine::with_index_source(config, Box::new(SequenceIndexSource::new([2])))
                .unwrap();
        let handle = spawn_engine_actor(engine, Arc::new(InMemoryBus::new()), 64);
        (handle, owner)
    }

    fn config(oracles: usize, late_fraction: f64) -> PoolConfig {
        PoolConfig {
            oracles,
            late_fraction,
            seed: Some(7),
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn test_register_assigns_behaviours() {
        let (handle, _) = spawn_engine();
        let held_before = handle.treasury().await.unwrap().held();

        let pool = OraclePool::register(handle.clone(), &config(4, 0.5))
            .await
            .unwrap();

        let behaviours: Vec<Behaviour> = pool.oracles().iter().map(|o| o.behaviour).collect();
        assert_eq!(
            behaviours,
            vec![
                Behaviour::AlwaysLateAirline,
                Behaviour::AlwaysLateAirline,
                Behaviour::Random,
                Behaviour::Random
            ]
        );
        assert_eq!(handle.oracles_count().await.unwrap(), 4);
        assert_eq!(pool.holders(2), 4);
        assert_eq!(pool.holders(9), 0);
        assert_eq!(
            handle.treasury().await.unwrap().held(),
            held_before + dec!(4)
        );
    }

    #[tokio::test]
    async fn test_reregistration_keeps_indexes() {
        let (handle, _) = spawn_engine();
        let first = OraclePool::register(handle.clone(), &config(2, 1.0))
            .await
            .unwrap();
        let second = OraclePool::register(handle, &config(2, 1.0)).await.unwrap();

        assert_eq!(first.oracles(), second.oracles());
    }

    #[tokio::test]
    async fn test_fee_too_low_fails() {
        let (handle, _) = spawn_engine();
        let cheap = PoolConfig {
            registration_fee: dec!(0.5),
            ..config(1, 1.0)
        };

        let err = OraclePool::register(handle, &cheap).await.unwrap_err();
        assert!(matches!(err, crate::Error::Engine(_)));
    }

    #[tokio::test]
    async fn test_answer_reaches_quorum() {
        let (handle, owner) = spawn_engine();
        let departure = 1_700_086_400;
        handle
            .register_flight_at("ND1309", departure, owner.clone(), 1_700_000_000)
            .await
            .unwrap();
        let pool = OraclePool::register(handle.clone(), &config(5, 1.0))
            .await
            .unwrap();

        let ticket = handle
            .request_status(owner.clone(), "ND1309", departure, owner.clone())
            .await
            .unwrap();
        let request = OracleRequest {
            round_id: ticket.round_id,
            index: ticket.key.index,
            airline: owner,
            flight: "ND1309".to_string(),
            departure,
        };

        let submissions = pool.answer(&request).await;
        assert_eq!(submissions.len(), 5);
        assert!(submissions
            .iter()
            .all(|s| s.status == DepartureStatusCode::LateAirline));

        let resolved = submissions
            .iter()
            .filter(|s| matches!(s.result, Ok(SubmissionOutcome::Resolved { .. })))
            .count();
        let ignored = submissions
            .iter()
            .filter(|s| matches!(s.result, Ok(SubmissionOutcome::Ignored(_))))
            .count();
        assert_eq!(resolved, 1);
        assert_eq!(ignored, 2);

        let round = handle.round(ticket.round_id).await.unwrap().unwrap();
        assert_eq!(round.resolved_code(), Some(DepartureStatusCode::LateAirline));
    }
}
