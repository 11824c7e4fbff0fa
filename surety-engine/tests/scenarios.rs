//! End-to-end scenarios through the actor and the message bus
//!
//! A. Admission by consensus once four airlines exist
//! B. Late flight credits insured passengers only
//! C. Foreign index rejected, late response inert
//! D. Withdrawal limits

use ledger_core::{Address, DepartureStatusCode, ErrorCategory, InsuranceState};
use message_bus::{InMemoryBus, MessageFilter, MessageType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use surety_engine::{
    spawn_engine_actor, Config, EngineHandle, FlightStatusInfo, IgnoredReason,
    RegistrationOutcome, SequenceIndexSource, SubmissionOutcome, SuretyEngine,
};

const NOW: i64 = 1_700_000_000;
const DEPARTURE: i64 = 1_700_086_400;
const FLIGHT: &str = "ND1309";

struct Harness {
    handle: EngineHandle,
    bus: Arc<InMemoryBus>,
    owner: Address,
}

/// Every index draw yields 2, so oracles hold [2, 3, 4] and rounds use index 2
async fn harness() -> Harness {
    let config = Config::default();
    let owner = config.ledger.owner.clone();
    let engine = SuretyEngine::with_index_source(config, Box::new(SequenceIndexSource::new([2])))
        .unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let handle = spawn_engine_actor(engine, bus.clone(), 64);
    // Let deployment notifications go out before tests subscribe
    handle.is_operational().await.unwrap();

    Harness { handle, bus, owner }
}

fn airline(n: u8) -> Address {
    Address::new(format!("0xairline{}", n))
}

fn oracle(n: u8) -> Address {
    Address::new(format!("0xoracle{}", n))
}

impl Harness {
    async fn flight(&self) -> u64 {
        self.handle
            .register_flight_at(FLIGHT, DEPARTURE, self.owner.clone(), NOW)
            .await
            .unwrap()
    }

    async fn oracles(&self, count: u8) {
        for n in 1..=count {
            let indexes = self.handle.register_oracle(oracle(n), dec!(1)).await.unwrap();
            assert_eq!(indexes, [2, 3, 4]);
        }
    }

    async fn submit(&self, index: u8, code: u8, n: u8) -> surety_engine::Result<SubmissionOutcome> {
        self.handle
            .submit_response(index, self.owner.clone(), FLIGHT, DEPARTURE, code, oracle(n))
            .await
    }
}

#[tokio::test]
async fn scenario_a_consensus_admission() {
    let h = harness().await;

    for n in 2..=4 {
        let outcome = h
            .handle
            .register_airline(airline(n), h.owner.clone())
            .await
            .unwrap();
        assert!(matches!(outcome, RegistrationOutcome::Registered { .. }));
        h.handle
            .pay_registration_fee(airline(n), dec!(10))
            .await
            .unwrap();
    }
    assert_eq!(h.handle.airlines_count().await.unwrap(), 4);
    assert_eq!(h.handle.voters_count().await.unwrap(), 4);

    let mut votes = h
        .bus
        .subscribe("votes", MessageFilter::only([MessageType::VoteCounted]));

    let first = match h
        .handle
        .register_airline(airline(5), h.owner.clone())
        .await
        .unwrap()
    {
        RegistrationOutcome::VoteCounted(tally) => tally,
        other => panic!("expected a vote, got {:?}", other),
    };
    assert_eq!(first.vote_count, 1);
    assert_eq!(first.total_voters, 4);
    assert_eq!(first.required, 2);
    assert!(!first.is_consensus_reached);
    assert!(!h.handle.is_airline(airline(5)).await.unwrap());

    let err = h
        .handle
        .register_airline(airline(5), h.owner.clone())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidState);

    let second = match h
        .handle
        .register_airline(airline(5), airline(2))
        .await
        .unwrap()
    {
        RegistrationOutcome::VoteCounted(tally) => tally,
        other => panic!("expected a vote, got {:?}", other),
    };
    assert_eq!(second.vote_count, 2);
    assert!(second.is_consensus_reached);
    assert_eq!(second.airline_id, Some(5));

    let airline5 = h.handle.get_airline(airline(5)).await.unwrap();
    assert!(!airline5.is_voter);

    // Exactly the two accepted votes were published
    assert!(votes.recv().await.is_ok());
    assert!(votes.recv().await.is_ok());
    assert!(votes.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn scenario_a_unpaid_voter_rejected() {
    let h = harness().await;
    for n in 2..=4 {
        h.handle
            .register_airline(airline(n), h.owner.clone())
            .await
            .unwrap();
    }

    let err = h
        .handle
        .register_airline(airline(5), airline(3))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotAuthorized);
}

#[tokio::test]
async fn scenario_b_late_airline_credits_insured_only() {
    let h = harness().await;
    let alice = Address::new("0xalice");
    let bob = Address::new("0xbob");

    let flight_id = h.flight().await;
    let insurance = h
        .handle
        .buy_insurance(flight_id, dec!(0.5), alice.clone())
        .await
        .unwrap();
    h.oracles(3).await;

    let mut status_info = h
        .bus
        .subscribe("status", MessageFilter::only([MessageType::FlightStatusInfo]));

    let ticket = h
        .handle
        .request_status(h.owner.clone(), FLIGHT, DEPARTURE, alice.clone())
        .await
        .unwrap();
    assert_eq!(ticket.key.index, 2);

    for n in 1..=2 {
        assert!(matches!(
            h.submit(2, 20, n).await.unwrap(),
            SubmissionOutcome::Recorded { .. }
        ));
    }
    assert!(matches!(
        h.submit(2, 20, 3).await.unwrap(),
        SubmissionOutcome::Resolved {
            status: DepartureStatusCode::LateAirline,
            effect_applied: true,
            ..
        }
    ));

    assert_eq!(
        h.handle.get_credited_amount(alice.clone()).await.unwrap(),
        dec!(0.75)
    );
    assert_eq!(h.handle.get_credited_amount(bob).await.unwrap(), Decimal::ZERO);
    assert_eq!(
        h.handle.get_insurance(insurance).await.unwrap().state,
        InsuranceState::Credited
    );

    let flight = h.handle.get_flight(flight_id).await.unwrap();
    assert_eq!(flight.departure_status_code, DepartureStatusCode::LateAirline);
    assert!(!flight.is_available_for_insurance());
    assert!(h.handle.check_solvency().await.unwrap());

    let info: FlightStatusInfo = status_info.recv().await.unwrap().decode_payload().unwrap();
    assert_eq!(info.round_id, ticket.round_id);
    assert_eq!(info.status, DepartureStatusCode::LateAirline);
}

#[tokio::test]
async fn scenario_c_invalid_index_and_late_response() {
    let h = harness().await;
    h.flight().await;
    h.oracles(4).await;
    let ticket = h
        .handle
        .request_status(h.owner.clone(), FLIGHT, DEPARTURE, h.owner.clone())
        .await
        .unwrap();

    let err = h.submit(7, 10, 1).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidState);

    for n in 1..=3 {
        h.submit(2, 10, n).await.unwrap();
    }
    let round = h.handle.round(ticket.round_id).await.unwrap().unwrap();
    assert_eq!(round.resolved_code(), Some(DepartureStatusCode::OnTime));

    // Resubmitting after resolution is accepted but changes nothing
    let outcome = h.submit(2, 20, 1).await.unwrap();
    assert!(matches!(
        outcome,
        SubmissionOutcome::Ignored(IgnoredReason::RoundResolved {
            status: DepartureStatusCode::OnTime,
            ..
        })
    ));
    let outcome = h.submit(2, 20, 4).await.unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Ignored(_)));

    let round = h.handle.round(ticket.round_id).await.unwrap().unwrap();
    assert_eq!(round.resolved_code(), Some(DepartureStatusCode::OnTime));
}

#[tokio::test]
async fn scenario_d_withdrawal_limits() {
    let h = harness().await;
    let alice = Address::new("0xalice");

    let flight_id = h.flight().await;
    h.handle
        .buy_insurance(flight_id, dec!(1), alice.clone())
        .await
        .unwrap();
    h.oracles(3).await;
    h.handle
        .request_status(h.owner.clone(), FLIGHT, DEPARTURE, alice.clone())
        .await
        .unwrap();
    for n in 1..=3 {
        h.submit(2, 20, n).await.unwrap();
    }
    assert_eq!(
        h.handle.get_credited_amount(alice.clone()).await.unwrap(),
        dec!(1.5)
    );

    let mut withdrawals = h
        .bus
        .subscribe("withdrawals", MessageFilter::only([MessageType::FundsWithdrawn]));

    let err = h
        .handle
        .withdraw(dec!(1.6), alice.clone(), alice.clone())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::PolicyViolation);

    let held_before = h.handle.treasury().await.unwrap().held();
    let transfer = h
        .handle
        .withdraw(dec!(1.5), alice.clone(), alice.clone())
        .await
        .unwrap();
    assert_eq!(transfer.to, alice);
    assert_eq!(transfer.amount, dec!(1.5));
    assert_eq!(
        h.handle.get_credited_amount(alice.clone()).await.unwrap(),
        Decimal::ZERO
    );
    assert_eq!(
        h.handle.treasury().await.unwrap().held(),
        held_before - dec!(1.5)
    );

    let err = h
        .handle
        .withdraw(dec!(1.5), alice.clone(), alice)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::PolicyViolation);

    assert!(withdrawals.recv().await.is_ok());
    assert!(withdrawals.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn paused_engine_rejects_gated_calls() {
    let h = harness().await;
    h.flight().await;
    h.oracles(1).await;
    let ticket = h
        .handle
        .request_status(h.owner.clone(), FLIGHT, DEPARTURE, h.owner.clone())
        .await
        .unwrap();
    assert_eq!(h.handle.oracles_count().await.unwrap(), 1);

    h.handle
        .set_operational_status(false, h.owner.clone())
        .await
        .unwrap();
    assert!(!h.handle.is_operational().await.unwrap());

    let err = h
        .handle
        .register_airline(airline(2), h.owner.clone())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);

    let err = h.handle.airlines_count().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);

    let err = h.handle.register_oracle(oracle(2), dec!(1)).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);

    let err = h.handle.get_my_indexes(oracle(1)).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);
    let err = h.handle.round(ticket.round_id).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);
    let err = h.handle.oracles_count().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotOperational);

    h.handle
        .set_operational_status(true, h.owner.clone())
        .await
        .unwrap();
    h.handle
        .register_airline(airline(2), h.owner.clone())
        .await
        .unwrap();
    assert_eq!(h.handle.get_my_indexes(oracle(1)).await.unwrap(), [2, 3, 4]);
}
