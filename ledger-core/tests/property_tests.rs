//! Property-based tests for ledger invariants
//!
//! - Key determinism: re-deriving a flight key finds the same flight
//! - Conservation: Σ(credit) + Σ(withdrawn) ≤ Σ(received), balances never negative
//! - Idempotency: an insurance is credited at most once

use ledger_core::{Address, Config, Error, Ledger};
use proptest::prelude::*;
use rust_decimal::Decimal;

const FUTURE: i64 = 4_102_444_800;

/// Strategy for generating premiums within the default cap (0.01 ..= 1.00)
fn premium_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Buy { passenger: usize, amount: Decimal },
    Credit { insurance: usize, multiple: u32 },
    Withdraw { passenger: usize, amount: Decimal },
    Fund { amount: Decimal },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4, premium_strategy()).prop_map(|(passenger, amount)| Op::Buy { passenger, amount }),
        (0usize..16, 1u32..4).prop_map(|(insurance, multiple)| Op::Credit { insurance, multiple }),
        (0usize..4, premium_strategy())
            .prop_map(|(passenger, amount)| Op::Withdraw { passenger, amount }),
        premium_strategy().prop_map(|amount| Op::Fund { amount }),
    ]
}

fn passenger(idx: usize) -> Address {
    Address::new(format!("0xpassenger{}", idx))
}

fn fresh_ledger(initial_funds: Decimal) -> (Ledger, Address) {
    let config = Config {
        initial_funds,
        ..Config::default()
    };
    let owner = config.owner.clone();
    (Ledger::new(&config).unwrap(), owner)
}

proptest! {
    #[test]
    fn prop_flight_key_round_trip(
        code in "[A-Z]{2}[0-9]{3,4}",
        offset in 1i64..1_000_000,
    ) {
        let (mut ledger, owner) = fresh_ledger(Decimal::ZERO);
        let departure = FUTURE + offset;

        let id = ledger.create_flight(&code, departure, &owner, &owner).unwrap();
        let key = ledger.create_flight_key(&owner, &code, departure);

        prop_assert_eq!(ledger.get_flight_id_by_key(&key).unwrap(), id);
        prop_assert_eq!(key, ledger.create_flight_key(&owner, &code, departure));

        let other = ledger.create_flight_key(&owner, &code, departure + 1);
        prop_assert!(matches!(ledger.get_flight_id_by_key(&other), Err(Error::NotFound(_))));
    }

    #[test]
    fn prop_funds_conserved(
        initial in 0i64..300,
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let (mut ledger, owner) = fresh_ledger(Decimal::new(initial, 2));
        let flight_id = ledger.create_flight("ND1309", FUTURE, &owner, &owner).unwrap();
        let mut withdrawn = Decimal::ZERO;

        for op in ops {
            match op {
                Op::Buy { passenger: p, amount } => {
                    let _ = ledger.create_insurance(flight_id, amount, passenger(p), &owner);
                }
                Op::Credit { insurance, multiple } => {
                    let id = insurance as u64 + 1;
                    if let Ok(ins) = ledger.get_insurance(id) {
                        let payout = ins.amount_paid * Decimal::from(multiple);
                        let _ = ledger.credit_insurance(id, payout, &owner);
                    }
                }
                Op::Withdraw { passenger: p, amount } => {
                    if let Ok(transfer) = ledger.withdraw_credited_amount(amount, &passenger(p), &owner) {
                        withdrawn += transfer.amount;
                    }
                }
                Op::Fund { amount } => {
                    ledger.add_funds(owner.clone(), amount, &owner).unwrap();
                }
            }

            let treasury = ledger.treasury().unwrap();
            let credits: Decimal = (0..4)
                .map(|p| ledger.get_credited_amount(&passenger(p)).unwrap())
                .sum();

            prop_assert!(ledger.check_solvency());
            prop_assert_eq!(treasury.withdrawn, withdrawn);
            prop_assert_eq!(treasury.outstanding_credit, credits);
            prop_assert!(credits + withdrawn <= treasury.received);
            for p in 0..4 {
                prop_assert!(!ledger.get_credited_amount(&passenger(p)).unwrap().is_sign_negative());
            }
        }
    }

    #[test]
    fn prop_credit_applied_once(
        amount in premium_strategy(),
        attempts in 2usize..6,
    ) {
        let (mut ledger, owner) = fresh_ledger(Decimal::from(10));
        let flight_id = ledger.create_flight("ND1309", FUTURE, &owner, &owner).unwrap();
        let id = ledger
            .create_insurance(flight_id, amount, passenger(0), &owner)
            .unwrap();

        let mut succeeded = 0;
        for _ in 0..attempts {
            if ledger.credit_insurance(id, amount, &owner).is_ok() {
                succeeded += 1;
            }
        }

        prop_assert_eq!(succeeded, 1);
        prop_assert_eq!(ledger.get_credited_amount(&passenger(0)).unwrap(), amount);
    }
}
