//! Flight and insurance escrow orchestration
//!
//! The ledger records whatever it is told to credit; pricing lives here.
//! Payout per insurance is `amount_paid × numerator / denominator`,
//! truncated at the smallest unit.

use crate::{error::ensure_operational, types::Payout, Error, Result};
use ledger_core::{Address, Amount, DepartureStatusCode, Ledger, Transfer};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Escrow policy acting on the ledger as the engine identity
#[derive(Debug, Clone)]
pub struct Escrow {
    engine: Address,
}

impl Escrow {
    /// Create escrow acting as `engine`
    pub fn new(engine: Address) -> Self {
        Self { engine }
    }

    /// Register a flight for the calling airline
    pub fn register_flight_at(
        &self,
        ledger: &mut Ledger,
        code: &str,
        departure: i64,
        caller: &Address,
        now: i64,
    ) -> Result<u64> {
        ensure_operational(ledger)?;
        if !ledger.is_airline(caller)? {
            return Err(Error::NotAuthorized(
                "Airline with given address is not registered".to_string(),
            ));
        }

        let id = ledger.create_flight_at(code, departure, caller, &self.engine, now)?;
        Ok(id)
    }

    /// Buy insurance on an open flight
    pub fn buy_insurance(
        &self,
        ledger: &mut Ledger,
        flight_id: u64,
        amount: Amount,
        passenger: Address,
    ) -> Result<u64> {
        let flight = ledger.get_flight(flight_id)?;
        if flight.departure_status_code != DepartureStatusCode::Unknown {
            return Err(Error::InvalidState(format!(
                "flight {} already resolved as {}",
                flight_id, flight.departure_status_code
            )));
        }

        let id = ledger.create_insurance(flight_id, amount, passenger, &self.engine)?;
        Ok(id)
    }

    /// Withdraw credited funds; only the passenger may withdraw their own
    pub fn withdraw(
        &self,
        ledger: &mut Ledger,
        amount: Amount,
        passenger: &Address,
        caller: &Address,
    ) -> Result<Transfer> {
        ensure_operational(ledger)?;
        if caller != passenger {
            return Err(Error::NotAuthorized(format!(
                "{} may not withdraw for {}",
                caller, passenger
            )));
        }

        let transfer = ledger.withdraw_credited_amount(amount, passenger, &self.engine)?;
        Ok(transfer)
    }

    /// Credits owed to the active insurances of a flight
    pub fn payouts(&self, ledger: &Ledger, flight_id: u64) -> Result<Vec<Payout>> {
        let premium = ledger.insurance_premium_multiplier()?;
        let mut payouts = Vec::new();

        for insurance_id in ledger.get_insurances_by_flight(flight_id)? {
            let insurance = ledger.get_insurance(insurance_id)?;
            if !insurance.is_active() {
                continue;
            }
            let amount = premium.apply(insurance.amount_paid).ok_or_else(|| {
                Error::PolicyViolation(format!(
                    "payout for insurance {} overflows with multiplier {}",
                    insurance_id, premium
                ))
            })?;
            payouts.push(Payout {
                insurance_id,
                owner: insurance.owner,
                amount,
            });
        }

        Ok(payouts)
    }

    /// Sum of a payout list
    pub fn total(payouts: &[Payout]) -> Result<Amount> {
        payouts
            .iter()
            .try_fold(Decimal::ZERO, |sum, payout| sum.checked_add(payout.amount))
            .ok_or_else(|| Error::PolicyViolation("payout total overflows".to_string()))
    }

    /// Apply a resolved departure status to a flight
    ///
    /// `LATE_AIRLINE` closes insurance sales and credits every active
    /// insurance; any other known status expires them. Callers check
    /// solvency first so that crediting cannot fail halfway.
    pub fn apply_resolution(
        &self,
        ledger: &mut Ledger,
        flight_id: u64,
        status: DepartureStatusCode,
        payouts: &[Payout],
    ) -> Result<()> {
        ledger.set_departure_status_code(flight_id, status, &self.engine)?;

        if status.is_compensable() {
            ledger.set_unavailable_for_insurance(flight_id, &self.engine)?;
            for payout in payouts {
                ledger.credit_insurance(payout.insurance_id, payout.amount, &self.engine)?;
            }
            info!(
                flight_id,
                credited = payouts.len(),
                "Insurances credited for late flight"
            );
        } else {
            let mut expired = 0usize;
            for insurance_id in ledger.get_insurances_by_flight(flight_id)? {
                if ledger.get_insurance(insurance_id)?.is_active() {
                    ledger.expire_insurance(insurance_id, &self.engine)?;
                    expired += 1;
                }
            }
            debug!(flight_id, %status, expired, "Insurances expired");
        }

        Ok(())
    }
}
