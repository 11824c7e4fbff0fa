//! Airline registry and admission consensus
//!
//! Below the bootstrap threshold any airline admits a candidate directly.
//! From then on, voting airlines (those that paid the registration fee)
//! cast distinct votes, and the candidate is admitted once
//! `votes ≥ ceil(voters × numerator / denominator)`.

use crate::{
    error::ensure_operational,
    types::{RegistrationOutcome, VoteTally},
    Error, Result,
};
use ledger_core::{Address, Airline, Amount, Ledger};
use tracing::{debug, info};

/// Admission policy
#[derive(Debug, Clone)]
pub struct AirlineRegistry {
    engine: Address,
    bootstrap_threshold: u64,
}

impl AirlineRegistry {
    /// Create registry acting on the ledger as `engine`
    pub fn new(engine: Address, bootstrap_threshold: u64) -> Self {
        Self {
            engine,
            bootstrap_threshold,
        }
    }

    /// Register (or vote for) a candidate airline
    pub fn register_airline(
        &self,
        ledger: &mut Ledger,
        candidate: Address,
        caller: &Address,
    ) -> Result<RegistrationOutcome> {
        ensure_operational(ledger)?;
        let sponsor = require_airline(ledger, caller)?;

        if ledger.is_airline(&candidate)? {
            return Err(Error::AlreadyExists(format!("airline {}", candidate)));
        }

        let count = ledger.airlines_count()?;
        if count < self.bootstrap_threshold {
            let airline_id = ledger.create_airline(candidate.clone(), &self.engine)?;
            info!(
                airline = %candidate,
                sponsor = %caller,
                airline_id,
                "Airline admitted during bootstrap"
            );
            return Ok(RegistrationOutcome::Registered { airline_id });
        }

        if !sponsor.is_voter {
            return Err(Error::NotAuthorized(
                "Airline has to pay registration fee to be able to vote".to_string(),
            ));
        }

        let vote_count = ledger.record_vote(&candidate, caller, &self.engine)?;
        let total_voters = ledger.voters_count()?;
        let required = ledger.consensus_multipliers()?.ceil_of(total_voters);
        let is_consensus_reached = vote_count >= required;

        let airline_id = if is_consensus_reached {
            let id = ledger.create_airline(candidate.clone(), &self.engine)?;
            info!(airline = %candidate, vote_count, required, "Airline admitted by consensus");
            Some(id)
        } else {
            debug!(candidate = %candidate, vote_count, required, "Vote counted");
            None
        };

        Ok(RegistrationOutcome::VoteCounted(VoteTally {
            candidate,
            vote_count,
            total_voters,
            required,
            is_consensus_reached,
            airline_id,
        }))
    }

    /// Pay the registration fee, turning the caller into a voter
    pub fn pay_registration_fee(
        &self,
        ledger: &mut Ledger,
        caller: &Address,
        value: Amount,
    ) -> Result<()> {
        ensure_operational(ledger)?;
        let airline = require_airline(ledger, caller)?;

        if airline.is_voter {
            return Err(Error::InvalidState(format!(
                "airline {} already paid the registration fee",
                caller
            )));
        }
        let fee = ledger.registration_fee()?;
        if value < fee {
            return Err(Error::PolicyViolation(format!(
                "registration fee {} is below the required {}",
                value, fee
            )));
        }

        ledger.add_funds(caller.clone(), value, &self.engine)?;
        ledger.set_airline_is_voter(caller, &self.engine)?;

        info!(airline = %caller, amount = %value, "Registration fee paid");
        Ok(())
    }
}

fn require_airline(ledger: &Ledger, caller: &Address) -> Result<Airline> {
    match ledger.get_airline(caller) {
        Ok(airline) => Ok(airline),
        Err(ledger_core::Error::NotFound(_)) => Err(Error::NotAuthorized(
            "Airline with given address is not registered".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}
