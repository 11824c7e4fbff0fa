//! In-memory tables backing the ledger
//!
//! # Tables
//!
//! - `airlines` - Airlines by id (ids start at 1, dense)
//! - `ballots` - Pending admission ballots by candidate
//! - `flights` - Flights by id, plus the key index
//! - `insurances` - Insurances by id, plus per-flight and per-passenger indices
//! - `credits` - Withdrawable balance per passenger
//!
//! Storage holds no policy. Every check lives in [`crate::Ledger`].

use crate::types::{
    Address, Airline, Amount, DepartureStatusCode, Flight, FlightAvailability, FlightKey,
    Insurance, InsuranceState, RegistrationBallot,
};
use std::collections::{BTreeMap, HashMap};

/// Entity tables with secondary indices
#[derive(Debug, Default)]
pub struct Storage {
    airlines: Vec<Airline>,
    airline_index: HashMap<Address, u64>,
    ballots: HashMap<Address, RegistrationBallot>,
    flights: Vec<Flight>,
    flight_index: HashMap<FlightKey, u64>,
    insurances: Vec<Insurance>,
    insurances_by_flight: HashMap<u64, Vec<u64>>,
    insurances_by_passenger: HashMap<Address, Vec<u64>>,
    credits: BTreeMap<Address, Amount>,
}

impl Storage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    // Airlines

    /// Insert airline, returning its id
    pub fn insert_airline(&mut self, address: Address, is_voter: bool) -> u64 {
        let id = self.airlines.len() as u64 + 1;
        self.airline_index.insert(address.clone(), id);
        self.ballots.remove(&address);
        self.airlines.push(Airline {
            id,
            address,
            is_voter,
        });
        id
    }

    /// Airline by address
    pub fn airline(&self, address: &Address) -> Option<&Airline> {
        let id = self.airline_index.get(address)?;
        self.airline_by_id(*id)
    }

    /// Airline by id
    pub fn airline_by_id(&self, id: u64) -> Option<&Airline> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.airlines.get(idx)
    }

    /// Mutable airline by address
    pub fn airline_mut(&mut self, address: &Address) -> Option<&mut Airline> {
        let id = *self.airline_index.get(address)?;
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.airlines.get_mut(idx)
    }

    /// Number of airlines
    pub fn airlines_count(&self) -> u64 {
        self.airlines.len() as u64
    }

    /// Number of airlines allowed to vote
    pub fn voters_count(&self) -> u64 {
        self.airlines.iter().filter(|a| a.is_voter).count() as u64
    }

    // Ballots

    /// Ballot for a candidate, created on first access
    pub fn ballot_entry(&mut self, candidate: &Address) -> &mut RegistrationBallot {
        self.ballots
            .entry(candidate.clone())
            .or_insert_with(|| RegistrationBallot::new(candidate.clone()))
    }

    /// Ballot for a candidate
    pub fn ballot(&self, candidate: &Address) -> Option<&RegistrationBallot> {
        self.ballots.get(candidate)
    }

    // Flights

    /// Insert flight, returning its id
    pub fn insert_flight(
        &mut self,
        key: FlightKey,
        airline: Address,
        code: String,
        departure: i64,
    ) -> u64 {
        let id = self.flights.len() as u64 + 1;
        self.flight_index.insert(key, id);
        self.flights.push(Flight {
            id,
            key,
            airline,
            code,
            departure,
            departure_status_code: DepartureStatusCode::Unknown,
            availability: FlightAvailability::AvailableForInsurance,
        });
        id
    }

    /// Flight by id
    pub fn flight(&self, id: u64) -> Option<&Flight> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.flights.get(idx)
    }

    /// Mutable flight by id
    pub fn flight_mut(&mut self, id: u64) -> Option<&mut Flight> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.flights.get_mut(idx)
    }

    /// Flight id by key
    pub fn flight_id_by_key(&self, key: &FlightKey) -> Option<u64> {
        self.flight_index.get(key).copied()
    }

    /// Number of flights
    pub fn flights_count(&self) -> u64 {
        self.flights.len() as u64
    }

    // Insurances

    /// Insert an active insurance, returning its id
    pub fn insert_insurance(&mut self, flight_id: u64, amount_paid: Amount, owner: Address) -> u64 {
        let id = self.insurances.len() as u64 + 1;
        self.insurances_by_flight.entry(flight_id).or_default().push(id);
        self.insurances_by_passenger
            .entry(owner.clone())
            .or_default()
            .push(id);
        self.insurances.push(Insurance {
            id,
            flight_id,
            amount_paid,
            owner,
            state: InsuranceState::Active,
        });
        id
    }

    /// Insurance by id
    pub fn insurance(&self, id: u64) -> Option<&Insurance> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.insurances.get(idx)
    }

    /// Mutable insurance by id
    pub fn insurance_mut(&mut self, id: u64) -> Option<&mut Insurance> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.insurances.get_mut(idx)
    }

    /// Insurance ids of a flight, in creation order
    pub fn insurances_by_flight(&self, flight_id: u64) -> &[u64] {
        self.insurances_by_flight
            .get(&flight_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Insurance ids of a passenger, in creation order
    pub fn insurances_by_passenger(&self, passenger: &Address) -> &[u64] {
        self.insurances_by_passenger
            .get(passenger)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of insurances
    pub fn insurances_count(&self) -> u64 {
        self.insurances.len() as u64
    }

    // Credits

    /// Withdrawable balance of a passenger
    pub fn credit(&self, passenger: &Address) -> Amount {
        self.credits.get(passenger).copied().unwrap_or_default()
    }

    /// Overwrite balance of a passenger; zero balances are dropped
    pub fn set_credit(&mut self, passenger: &Address, amount: Amount) {
        if amount.is_zero() {
            self.credits.remove(passenger);
        } else {
            self.credits.insert(passenger.clone(), amount);
        }
    }

    /// Sum of all balances
    pub fn total_credit(&self) -> Amount {
        self.credits.values().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::flight_key;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sequential_airline_ids() {
        let mut storage = Storage::new();
        assert_eq!(storage.insert_airline(Address::new("0xa"), true), 1);
        assert_eq!(storage.insert_airline(Address::new("0xb"), false), 2);

        assert_eq!(storage.airline(&Address::new("0xb")).map(|a| a.id), Some(2));
        assert_eq!(storage.airline_by_id(0), None);
        assert_eq!(storage.voters_count(), 1);
    }

    #[test]
    fn test_admission_discards_ballot() {
        let mut storage = Storage::new();
        let candidate = Address::new("0xcandidate");
        storage.ballot_entry(&candidate).votes.insert(Address::new("0xa"));
        assert!(storage.ballot(&candidate).is_some());

        storage.insert_airline(candidate.clone(), false);
        assert!(storage.ballot(&candidate).is_none());
    }

    #[test]
    fn test_insurance_indices() {
        let mut storage = Storage::new();
        let airline = Address::new("0xairline");
        let key = flight_key(&airline, "ND1309", 10);
        let flight_id = storage.insert_flight(key, airline, "ND1309".into(), 10);

        let passenger = Address::new("0xpassenger");
        let first = storage.insert_insurance(flight_id, dec!(0.5), passenger.clone());
        let second = storage.insert_insurance(flight_id, dec!(0.2), Address::new("0xother"));

        assert_eq!(storage.flight_id_by_key(&key), Some(flight_id));
        assert_eq!(storage.insurances_by_flight(flight_id), &[first, second]);
        assert_eq!(storage.insurances_by_passenger(&passenger), &[first]);
        assert!(storage.insurances_by_flight(99).is_empty());
    }

    #[test]
    fn test_credit_balances() {
        let mut storage = Storage::new();
        let passenger = Address::new("0xpassenger");
        storage.set_credit(&passenger, dec!(0.75));
        storage.set_credit(&Address::new("0xother"), dec!(1));
        assert_eq!(storage.total_credit(), dec!(1.75));

        storage.set_credit(&passenger, dec!(0));
        assert_eq!(storage.credit(&passenger), dec!(0));
        assert_eq!(storage.total_credit(), dec!(1));
    }
}
