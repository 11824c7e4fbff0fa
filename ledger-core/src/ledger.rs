//! Ledger Store: entities, access control and custody
//!
//! The ledger enforces every invariant on its own data (sequential ids,
//! unique keys, one-way insurance transitions, non-negative balances,
//! solvency) but holds no business policy: who may register airlines,
//! what a payout is worth, and when a flight resolves are decided by the
//! governing layer, which calls in as an authorized caller.
//!
//! # Gating
//!
//! - Mutations require `operational` and an authorized caller
//! - Reads require `operational`
//! - The operational flag is always readable and always settable by the owner
//!
//! Every entry point validates fully before touching state, so a failed
//! call leaves the ledger unchanged.
//!
//! # Example
//!
//! ```
//! use ledger_core::{Address, Config, Ledger};
//!
//! let config = Config::default();
//! let owner = config.owner.clone();
//! let mut ledger = Ledger::new(&config)?;
//!
//! let id = ledger.create_airline(Address::new("0xairline"), &owner)?;
//! assert_eq!(id, 2);
//! # Ok::<(), ledger_core::Error>(())
//! ```

use crate::{
    crypto,
    metrics::Metrics,
    storage::Storage,
    types::{
        truncate_amount, Address, Airline, Amount, DepartureStatusCode, Flight,
        FlightAvailability, FlightKey, GlobalConfig, Insurance, InsuranceState, LedgerEvent,
        Ratio, RegistrationBallot, Transfer, Treasury, AMOUNT_SCALE,
    },
    Config, Error, Result,
};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Authoritative ledger of record
#[derive(Debug)]
pub struct Ledger {
    owner: Address,
    authorized: BTreeSet<Address>,
    config: GlobalConfig,
    storage: Storage,
    treasury: Treasury,
    events: Vec<LedgerEvent>,
    metrics: Metrics,
}

impl Ledger {
    /// Deploy a ledger
    ///
    /// The owner becomes airline #1 (a voter) and the first authorized
    /// caller; `initial_funds` are taken into custody.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        validate_amount(config.initial_funds, "initial funds", true)?;

        let policy = &config.policy;
        let mut ledger = Self {
            owner: config.owner.clone(),
            authorized: BTreeSet::from([config.owner.clone()]),
            config: GlobalConfig {
                version: 1,
                operational: true,
                registration_fee: policy.registration_fee,
                insurance_cap: policy.insurance_cap,
                consensus: policy.consensus(),
                premium: policy.premium(),
            },
            storage: Storage::new(),
            treasury: Treasury::default(),
            events: Vec::new(),
            metrics: Metrics::new()?,
        };

        let id = ledger.storage.insert_airline(config.owner.clone(), true);
        ledger.metrics.airlines_registered.inc();
        ledger.events.push(LedgerEvent::AirlineRegistered {
            id,
            address: config.owner.clone(),
        });

        if !config.initial_funds.is_zero() {
            ledger.receive(config.owner.clone(), config.initial_funds)?;
        }

        info!(
            owner = %ledger.owner,
            funds = %ledger.treasury.held(),
            "Ledger deployed"
        );

        Ok(ledger)
    }

    /// Deploying identity
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Take the events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    // Administration

    /// Operational flag (never gated)
    pub fn is_operational(&self) -> bool {
        self.config.operational
    }

    /// Set the operational flag (owner only, allowed in either state)
    pub fn set_operational_status(&mut self, operational: bool, caller: &Address) -> Result<()> {
        self.require_owner(caller)?;

        if self.config.operational == operational {
            return Ok(());
        }

        self.config.operational = operational;
        self.config.version += 1;
        self.events
            .push(LedgerEvent::OperationalStatusChanged { operational });

        info!(operational, version = self.config.version, "Operational status changed");
        Ok(())
    }

    /// Grant or revoke mutation rights
    pub fn set_authorized_caller(
        &mut self,
        address: Address,
        authorized: bool,
        caller: &Address,
    ) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;

        if authorized {
            self.authorized.insert(address.clone());
        } else {
            self.authorized.remove(&address);
        }

        info!(address = %address, authorized, "Authorized caller changed");
        self.events.push(LedgerEvent::AuthorizedCallerChanged {
            address,
            authorized,
        });
        Ok(())
    }

    /// Whether `address` may mutate the ledger
    pub fn is_authorized_caller(&self, address: &Address) -> Result<bool> {
        self.require_operational()?;
        Ok(self.authorized.contains(address))
    }

    /// Current configuration record
    pub fn config(&self) -> Result<&GlobalConfig> {
        self.require_operational()?;
        Ok(&self.config)
    }

    /// Fee an airline pays to become a voter
    pub fn registration_fee(&self) -> Result<Amount> {
        Ok(self.config()?.registration_fee)
    }

    /// Maximum premium per insurance
    pub fn insurance_cap(&self) -> Result<Amount> {
        Ok(self.config()?.insurance_cap)
    }

    /// Consensus multiplier
    pub fn consensus_multipliers(&self) -> Result<Ratio> {
        Ok(self.config()?.consensus)
    }

    /// Payout multiplier
    pub fn insurance_premium_multiplier(&self) -> Result<Ratio> {
        Ok(self.config()?.premium)
    }

    /// Update the registration fee
    pub fn set_registration_fee(&mut self, fee: Amount, caller: &Address) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;
        validate_amount(fee, "registration fee", true)?;

        self.config.registration_fee = fee;
        self.bump_config_version();
        Ok(())
    }

    /// Update the insurance cap
    pub fn set_insurance_cap(&mut self, cap: Amount, caller: &Address) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;
        validate_amount(cap, "insurance cap", true)?;

        self.config.insurance_cap = cap;
        self.bump_config_version();
        Ok(())
    }

    /// Update the consensus multiplier
    pub fn set_consensus_multipliers(
        &mut self,
        numerator: u32,
        denominator: u32,
        caller: &Address,
    ) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;

        let ratio = Ratio::new(numerator, denominator);
        if numerator == 0 || denominator == 0 {
            return Err(Error::PolicyViolation(format!(
                "consensus multipliers {} must be non-zero",
                ratio
            )));
        }
        if ratio.exceeds_one() {
            return Err(Error::PolicyViolation(format!(
                "consensus multipliers {} imply more than 100% consensus",
                ratio
            )));
        }

        self.config.consensus = ratio;
        self.bump_config_version();
        Ok(())
    }

    /// Update the payout multiplier
    pub fn set_insurance_premium_multiplier(
        &mut self,
        numerator: u32,
        denominator: u32,
        caller: &Address,
    ) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;

        if denominator == 0 {
            return Err(Error::PolicyViolation(
                "premium denominator must be non-zero".to_string(),
            ));
        }

        self.config.premium = Ratio::new(numerator, denominator);
        self.bump_config_version();
        Ok(())
    }

    // Airlines

    /// Create a non-voting airline
    pub fn create_airline(&mut self, address: Address, caller: &Address) -> Result<u64> {
        self.require_writer(caller)?;

        if self.storage.airline(&address).is_some() {
            return Err(Error::AlreadyExists(format!("airline {}", address)));
        }

        let id = self.storage.insert_airline(address.clone(), false);
        self.metrics.airlines_registered.inc();

        info!(airline = %address, id, "Airline registered");
        self.events
            .push(LedgerEvent::AirlineRegistered { id, address });
        Ok(id)
    }

    /// Airline by address
    pub fn get_airline(&self, address: &Address) -> Result<Airline> {
        self.require_operational()?;
        self.storage
            .airline(address)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("airline {}", address)))
    }

    /// Whether `address` is a registered airline
    pub fn is_airline(&self, address: &Address) -> Result<bool> {
        self.require_operational()?;
        Ok(self.storage.airline(address).is_some())
    }

    /// Number of airlines
    pub fn airlines_count(&self) -> Result<u64> {
        self.require_operational()?;
        Ok(self.storage.airlines_count())
    }

    /// Number of voting airlines
    pub fn voters_count(&self) -> Result<u64> {
        self.require_operational()?;
        Ok(self.storage.voters_count())
    }

    /// Allow an airline to vote
    pub fn set_airline_is_voter(&mut self, address: &Address, caller: &Address) -> Result<()> {
        self.require_writer(caller)?;

        let airline = self
            .storage
            .airline_mut(address)
            .ok_or_else(|| Error::NotFound(format!("airline {}", address)))?;
        if airline.is_voter {
            return Err(Error::InvalidState(format!(
                "airline {} is already a voter",
                address
            )));
        }
        airline.is_voter = true;

        info!(airline = %address, "Airline may vote");
        self.events.push(LedgerEvent::AirlineVoterEnabled {
            address: address.clone(),
        });
        Ok(())
    }

    /// Record a distinct vote for a candidate, returning the vote count
    pub fn record_vote(
        &mut self,
        candidate: &Address,
        voter: &Address,
        caller: &Address,
    ) -> Result<u64> {
        self.require_writer(caller)?;

        if self.storage.airline(candidate).is_some() {
            return Err(Error::AlreadyExists(format!("airline {}", candidate)));
        }
        if self
            .storage
            .ballot(candidate)
            .is_some_and(|ballot| ballot.has_voted(voter))
        {
            return Err(Error::InvalidState(
                "The caller has already voted".to_string(),
            ));
        }

        let ballot = self.storage.ballot_entry(candidate);
        ballot.votes.insert(voter.clone());
        let count = ballot.vote_count();

        debug!(candidate = %candidate, voter = %voter, count, "Vote recorded");
        Ok(count)
    }

    /// Pending ballot of a candidate
    pub fn ballot(&self, candidate: &Address) -> Result<Option<RegistrationBallot>> {
        self.require_operational()?;
        Ok(self.storage.ballot(candidate).cloned())
    }

    // Funds

    /// Take funds into custody, returning funds held afterwards
    pub fn add_funds(&mut self, from: Address, amount: Amount, caller: &Address) -> Result<Amount> {
        self.require_writer(caller)?;
        validate_amount(amount, "funding amount", false)?;
        self.receive(from, amount)
    }

    /// Custody accounting
    pub fn treasury(&self) -> Result<Treasury> {
        self.require_operational()?;
        Ok(self.treasury.clone())
    }

    /// Funds held cover every outstanding credit balance
    ///
    /// Not gated: this is an invariant probe, not a query.
    pub fn check_solvency(&self) -> bool {
        let held = self.treasury.held();
        !held.is_sign_negative()
            && self.treasury.outstanding_credit <= held
            && self.treasury.outstanding_credit == self.storage.total_credit()
    }

    // Flights

    /// Deterministic flight key
    pub fn create_flight_key(&self, airline: &Address, code: &str, departure: i64) -> FlightKey {
        crypto::flight_key(airline, code, departure)
    }

    /// Register a flight departing in the future
    pub fn create_flight(
        &mut self,
        code: &str,
        departure: i64,
        airline: &Address,
        caller: &Address,
    ) -> Result<u64> {
        self.create_flight_at(code, departure, airline, caller, Utc::now().timestamp())
    }

    /// Register a flight, judging departure against `now`
    pub fn create_flight_at(
        &mut self,
        code: &str,
        departure: i64,
        airline: &Address,
        caller: &Address,
        now: i64,
    ) -> Result<u64> {
        self.require_writer(caller)?;

        if self.storage.airline(airline).is_none() {
            return Err(Error::NotFound(format!("airline {}", airline)));
        }
        if departure <= now {
            return Err(Error::PolicyViolation(format!(
                "flight {} already departed",
                code
            )));
        }

        let key = crypto::flight_key(airline, code, departure);
        if self.storage.flight_id_by_key(&key).is_some() {
            return Err(Error::AlreadyExists(format!("flight {}", key)));
        }

        let id = self
            .storage
            .insert_flight(key, airline.clone(), code.to_string(), departure);
        self.metrics.flights_registered.inc();

        info!(flight_id = id, airline = %airline, code, departure, "Flight registered");
        self.events
            .push(LedgerEvent::FlightAvailableForInsurance { id });
        Ok(id)
    }

    /// Flight by id
    pub fn get_flight(&self, id: u64) -> Result<Flight> {
        self.require_operational()?;
        self.storage
            .flight(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("flight {}", id)))
    }

    /// Flight id by key
    pub fn get_flight_id_by_key(&self, key: &FlightKey) -> Result<u64> {
        self.require_operational()?;
        self.storage
            .flight_id_by_key(key)
            .ok_or_else(|| Error::NotFound(format!("flight {}", key)))
    }

    /// Number of flights
    pub fn flights_count(&self) -> Result<u64> {
        self.require_operational()?;
        Ok(self.storage.flights_count())
    }

    /// Open insurance sales
    pub fn set_available_for_insurance(&mut self, id: u64, caller: &Address) -> Result<()> {
        self.set_availability(id, FlightAvailability::AvailableForInsurance, caller)
    }

    /// Close insurance sales
    pub fn set_unavailable_for_insurance(&mut self, id: u64, caller: &Address) -> Result<()> {
        self.set_availability(id, FlightAvailability::UnavailableForInsurance, caller)
    }

    fn set_availability(
        &mut self,
        id: u64,
        availability: FlightAvailability,
        caller: &Address,
    ) -> Result<()> {
        self.require_writer(caller)?;

        let flight = self
            .storage
            .flight_mut(id)
            .ok_or_else(|| Error::NotFound(format!("flight {}", id)))?;
        if flight.availability == availability {
            return Ok(());
        }
        flight.availability = availability;

        debug!(flight_id = id, ?availability, "Flight availability changed");
        self.events.push(match availability {
            FlightAvailability::AvailableForInsurance => {
                LedgerEvent::FlightAvailableForInsurance { id }
            }
            FlightAvailability::UnavailableForInsurance => {
                LedgerEvent::FlightUnavailableForInsurance { id }
            }
        });
        Ok(())
    }

    /// Record the departure status of a flight
    pub fn set_departure_status_code(
        &mut self,
        id: u64,
        status: DepartureStatusCode,
        caller: &Address,
    ) -> Result<()> {
        self.require_writer(caller)?;

        let flight = self
            .storage
            .flight_mut(id)
            .ok_or_else(|| Error::NotFound(format!("flight {}", id)))?;
        flight.departure_status_code = status;

        info!(flight_id = id, %status, "Flight status updated");
        self.events
            .push(LedgerEvent::FlightStatusUpdated { id, status });
        Ok(())
    }

    // Insurances

    /// Buy insurance, taking the premium into custody
    pub fn create_insurance(
        &mut self,
        flight_id: u64,
        amount_paid: Amount,
        passenger: Address,
        caller: &Address,
    ) -> Result<u64> {
        self.require_writer(caller)?;

        let flight = self
            .storage
            .flight(flight_id)
            .ok_or_else(|| Error::NotFound(format!("flight {}", flight_id)))?;
        if !flight.is_available_for_insurance() {
            return Err(Error::InvalidState(format!(
                "flight {} is not available for insurance",
                flight_id
            )));
        }
        validate_amount(amount_paid, "insurance amount", false)?;
        if amount_paid > self.config.insurance_cap {
            return Err(Error::PolicyViolation(format!(
                "insurance amount {} exceeds cap {}",
                amount_paid, self.config.insurance_cap
            )));
        }
        let received = checked(self.treasury.received.checked_add(amount_paid))?;

        self.treasury.received = received;
        let id = self
            .storage
            .insert_insurance(flight_id, amount_paid, passenger.clone());
        self.metrics.insurances_purchased.inc();
        self.update_fund_metrics();

        info!(
            insurance_id = id,
            flight_id,
            passenger = %passenger,
            amount = %amount_paid,
            "Insurance purchased"
        );
        self.events.push(LedgerEvent::InsurancePurchased {
            id,
            flight_id,
            owner: passenger,
            amount_paid,
        });
        Ok(id)
    }

    /// Insurance by id
    pub fn get_insurance(&self, id: u64) -> Result<Insurance> {
        self.require_operational()?;
        self.storage
            .insurance(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("insurance {}", id)))
    }

    /// Insurance ids of a flight, in creation order
    pub fn get_insurances_by_flight(&self, flight_id: u64) -> Result<Vec<u64>> {
        self.require_operational()?;
        if self.storage.flight(flight_id).is_none() {
            return Err(Error::NotFound(format!("flight {}", flight_id)));
        }
        Ok(self.storage.insurances_by_flight(flight_id).to_vec())
    }

    /// Insurance ids of a passenger, in creation order
    pub fn get_insurances_by_passenger(&self, passenger: &Address) -> Result<Vec<u64>> {
        self.require_operational()?;
        Ok(self.storage.insurances_by_passenger(passenger).to_vec())
    }

    /// Number of insurances
    pub fn insurances_count(&self) -> Result<u64> {
        self.require_operational()?;
        Ok(self.storage.insurances_count())
    }

    /// Credit an active insurance to its owner's balance
    pub fn credit_insurance(&mut self, id: u64, amount: Amount, caller: &Address) -> Result<()> {
        self.require_writer(caller)?;

        let insurance = self
            .storage
            .insurance(id)
            .ok_or_else(|| Error::NotFound(format!("insurance {}", id)))?;
        if !insurance.is_active() {
            return Err(Error::InvalidState(format!(
                "insurance {} is not active",
                id
            )));
        }
        validate_amount(amount, "credit amount", true)?;

        let owner = insurance.owner.clone();
        let outstanding = checked(self.treasury.outstanding_credit.checked_add(amount))?;
        if outstanding > self.treasury.held() {
            return Err(Error::PolicyViolation(format!(
                "insufficient funds to credit {} (uncommitted {})",
                amount,
                self.treasury.uncommitted()
            )));
        }
        let balance = checked(self.storage.credit(&owner).checked_add(amount))?;

        if let Some(insurance) = self.storage.insurance_mut(id) {
            insurance.state = InsuranceState::Credited;
        }
        self.storage.set_credit(&owner, balance);
        self.treasury.outstanding_credit = outstanding;
        self.metrics.insurances_credited.inc();
        self.update_fund_metrics();

        info!(insurance_id = id, passenger = %owner, amount = %amount, "Insurance credited");
        self.events.push(LedgerEvent::InsuranceCredited {
            id,
            owner,
            amount,
        });
        Ok(())
    }

    /// Close an active insurance without payout
    pub fn expire_insurance(&mut self, id: u64, caller: &Address) -> Result<()> {
        self.require_writer(caller)?;

        let insurance = self
            .storage
            .insurance_mut(id)
            .ok_or_else(|| Error::NotFound(format!("insurance {}", id)))?;
        if !insurance.is_active() {
            return Err(Error::InvalidState(format!(
                "insurance {} is not active",
                id
            )));
        }
        insurance.state = InsuranceState::Expired;

        debug!(insurance_id = id, "Insurance expired");
        self.events.push(LedgerEvent::InsuranceExpired { id });
        Ok(())
    }

    /// Withdrawable balance of a passenger
    pub fn get_credited_amount(&self, passenger: &Address) -> Result<Amount> {
        self.require_operational()?;
        Ok(self.storage.credit(passenger))
    }

    /// Release credited funds to a passenger
    pub fn withdraw_credited_amount(
        &mut self,
        amount: Amount,
        passenger: &Address,
        caller: &Address,
    ) -> Result<Transfer> {
        self.require_writer(caller)?;
        validate_amount(amount, "withdrawal amount", false)?;

        let balance = self.storage.credit(passenger);
        if balance < amount {
            return Err(Error::PolicyViolation(format!(
                "withdrawal {} exceeds credited balance {}",
                amount, balance
            )));
        }
        let withdrawn = checked(self.treasury.withdrawn.checked_add(amount))?;

        self.storage.set_credit(passenger, balance - amount);
        self.treasury.withdrawn = withdrawn;
        self.treasury.outstanding_credit -= amount;
        self.metrics.withdrawals.inc();
        self.update_fund_metrics();

        info!(passenger = %passenger, amount = %amount, "Credit withdrawn");
        self.events.push(LedgerEvent::FundsWithdrawn {
            to: passenger.clone(),
            amount,
        });
        Ok(Transfer {
            to: passenger.clone(),
            amount,
        })
    }

    // Helpers

    fn receive(&mut self, from: Address, amount: Amount) -> Result<Amount> {
        self.treasury.received = checked(self.treasury.received.checked_add(amount))?;
        let held = self.treasury.held();
        self.update_fund_metrics();

        debug!(from = %from, amount = %amount, held = %held, "Funds received");
        self.events
            .push(LedgerEvent::FundsAdded { from, amount, held });
        Ok(held)
    }

    fn bump_config_version(&mut self) {
        self.config.version += 1;
        info!(version = self.config.version, "Configuration changed");
        self.events.push(LedgerEvent::ConfigChanged {
            version: self.config.version,
        });
    }

    fn update_fund_metrics(&self) {
        self.metrics
            .update_funds(self.treasury.held(), self.treasury.outstanding_credit);
    }

    fn require_operational(&self) -> Result<()> {
        if self.config.operational {
            Ok(())
        } else {
            Err(Error::NotOperational)
        }
    }

    fn require_owner(&self, caller: &Address) -> Result<()> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!("{} is not the owner", caller)))
        }
    }

    fn require_writer(&self, caller: &Address) -> Result<()> {
        self.require_operational()?;
        if self.authorized.contains(caller) {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!(
                "{} is not an authorized caller",
                caller
            )))
        }
    }
}

/// Amounts are positive (or zero when allowed) with at most 18 fractional digits
fn validate_amount(amount: Amount, what: &str, allow_zero: bool) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::PolicyViolation(format!("{} must not be negative", what)));
    }
    if amount.is_zero() && !allow_zero {
        return Err(Error::PolicyViolation(format!("{} must be positive", what)));
    }
    if truncate_amount(amount) != amount {
        return Err(Error::PolicyViolation(format!(
            "{} has more than {} fractional digits",
            what, AMOUNT_SCALE
        )));
    }
    Ok(())
}

fn checked(amount: Option<Amount>) -> Result<Amount> {
    amount.ok_or_else(|| Error::PolicyViolation("amount overflow".to_string()))
}
