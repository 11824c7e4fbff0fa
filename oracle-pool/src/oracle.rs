//! A single simulated oracle

use ledger_core::{Address, DepartureStatusCode};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use surety_engine::INDEXES_PER_ORACLE;

/// How an oracle decides what to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behaviour {
    /// Always blames the airline
    AlwaysLateAirline,
    /// Uniform over every status code
    Random,
}

/// Oracle identity with its cached index assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedOracle {
    /// Registered address
    pub address: Address,
    /// Indexes assigned at registration
    pub indexes: [u8; INDEXES_PER_ORACLE],
    /// Reporting behaviour
    pub behaviour: Behaviour,
}

impl SimulatedOracle {
    /// Create new oracle
    pub fn new(address: Address, indexes: [u8; INDEXES_PER_ORACLE], behaviour: Behaviour) -> Self {
        Self {
            address,
            indexes,
            behaviour,
        }
    }

    /// Whether requests for this index are ours to answer
    pub fn holds(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }

    /// Status to report for a request, `None` when the index is foreign
    pub fn answer<R: Rng + ?Sized>(&self, index: u8, rng: &mut R) -> Option<DepartureStatusCode> {
        if !self.holds(index) {
            return None;
        }

        match self.behaviour {
            Behaviour::AlwaysLateAirline => Some(DepartureStatusCode::LateAirline),
            Behaviour::Random => DepartureStatusCode::ALL.choose(rng).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn oracle(behaviour: Behaviour) -> SimulatedOracle {
        SimulatedOracle::new(Address::new("0xoracle"), [1, 4, 7], behaviour)
    }

    #[test]
    fn test_foreign_index_is_silent() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(oracle(Behaviour::AlwaysLateAirline).answer(2, &mut rng), None);
        assert_eq!(oracle(Behaviour::Random).answer(9, &mut rng), None);
    }

    #[test]
    fn test_late_reporter_is_constant() {
        let mut rng = StdRng::seed_from_u64(7);
        let late = oracle(Behaviour::AlwaysLateAirline);
        for index in late.indexes {
            assert_eq!(late.answer(index, &mut rng), Some(DepartureStatusCode::LateAirline));
        }
    }

    #[test]
    fn test_random_reporter_covers_codes() {
        let mut rng = StdRng::seed_from_u64(42);
        let random = oracle(Behaviour::Random);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let status = random.answer(4, &mut rng).unwrap();
            seen.insert(status.code());
        }
        assert_eq!(seen.len(), DepartureStatusCode::ALL.len());
    }
}
