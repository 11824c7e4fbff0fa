//! Simulated pool answering live status requests over the bus

use ledger_core::{Address, DepartureStatusCode, InsuranceState};
use message_bus::{InMemoryBus, MessageFilter, MessageType};
use oracle_pool::{OraclePool, PoolConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use surety_engine::{
    spawn_engine_actor, Config, EngineHandle, FlightStatusInfo, SequenceIndexSource, SuretyEngine,
};

const NOW: i64 = 1_700_000_000;
const DEPARTURE: i64 = 1_700_086_400;
const FLIGHT: &str = "ND1309";

/// Every index draw yields 2, so all oracles hold [2, 3, 4] and rounds use index 2
async fn setup(pool_config: PoolConfig) -> (EngineHandle, Arc<InMemoryBus>, Arc<OraclePool>, Address) {
    let config = Config::default();
    let owner = config.ledger.owner.clone();
    let engine = SuretyEngine::with_index_source(config, Box::new(SequenceIndexSource::new([2])))
        .unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let handle = spawn_engine_actor(engine, bus.clone(), 64);

    let pool = Arc::new(
        OraclePool::register(handle.clone(), &pool_config)
            .await
            .unwrap(),
    );
    pool.clone().spawn(&bus);

    (handle, bus, pool, owner)
}

fn pool_config(oracles: usize, late_fraction: f64) -> PoolConfig {
    PoolConfig {
        oracles,
        late_fraction,
        seed: Some(11),
        ..PoolConfig::default()
    }
}

#[tokio::test]
async fn late_pool_credits_insured_passenger() {
    let (handle, bus, pool, owner) = setup(pool_config(6, 1.0)).await;
    assert_eq!(pool.holders(2), 6);

    let passenger = Address::new("0xpassenger");
    let flight_id = handle
        .register_flight_at(FLIGHT, DEPARTURE, owner.clone(), NOW)
        .await
        .unwrap();
    let insurance = handle
        .buy_insurance(flight_id, dec!(1), passenger.clone())
        .await
        .unwrap();

    let mut status_info = bus.subscribe(
        "test-status",
        MessageFilter::only([MessageType::FlightStatusInfo]),
    );

    let ticket = handle
        .request_status(owner, FLIGHT, DEPARTURE, passenger.clone())
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), status_info.recv())
        .await
        .unwrap()
        .unwrap();
    let info: FlightStatusInfo = message.decode_payload().unwrap();
    assert_eq!(info.round_id, ticket.round_id);
    assert_eq!(info.status, DepartureStatusCode::LateAirline);
    assert!(info.effect_applied);

    assert_eq!(
        handle.get_credited_amount(passenger).await.unwrap(),
        dec!(1.5)
    );
    assert_eq!(
        handle.get_insurance(insurance).await.unwrap().state,
        InsuranceState::Credited
    );
    assert!(handle.check_solvency().await.unwrap());

    // Exactly one resolution no matter how many oracles answered
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(status_info.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn random_pool_resolves_once() {
    let (handle, bus, _pool, owner) = setup(pool_config(13, 0.0)).await;
    let passenger = Address::new("0xpassenger");
    let flight_id = handle
        .register_flight_at(FLIGHT, DEPARTURE, owner.clone(), NOW)
        .await
        .unwrap();
    handle
        .buy_insurance(flight_id, dec!(0.4), passenger.clone())
        .await
        .unwrap();

    let mut reports = bus.subscribe("test-reports", MessageFilter::only([MessageType::OracleReport]));
    let ticket = handle
        .request_status(owner, FLIGHT, DEPARTURE, passenger.clone())
        .await
        .unwrap();

    // Thirteen oracles over six codes: some code always reaches three votes
    let mut received = 0;
    while let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(500), reports.recv()).await {
        received += 1;
    }
    assert!(received >= 3);

    let round = handle.round(ticket.round_id).await.unwrap().unwrap();
    let status = round.resolved_code().unwrap();

    let flight = handle.get_flight(flight_id).await.unwrap();
    let credited = handle.get_credited_amount(passenger).await.unwrap();
    if status == DepartureStatusCode::Unknown {
        assert_eq!(flight.departure_status_code, DepartureStatusCode::Unknown);
        assert_eq!(credited, Decimal::ZERO);
    } else {
        assert_eq!(flight.departure_status_code, status);
        if status.is_compensable() {
            assert_eq!(credited, dec!(0.6));
        } else {
            assert_eq!(credited, Decimal::ZERO);
        }
    }
}

#[tokio::test]
async fn request_for_unknown_flight_is_rejected() {
    let (handle, _bus, _pool, owner) = setup(pool_config(3, 1.0)).await;

    let err = handle
        .request_status(owner.clone(), "XX0000", DEPARTURE, owner)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ledger_core::ErrorCategory::NotFound);
}
