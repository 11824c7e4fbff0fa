//! Injectable randomness for oracle index assignment
//!
//! Production uses a seeded `StdRng`; tests plug in a fixed sequence so
//! that index draws are reproducible.

use crate::types::INDEXES_PER_ORACLE;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;

/// Source of pseudo-random indexes
pub trait IndexSource: Send + fmt::Debug {
    /// Next index in `[0, range)`
    fn next_index(&mut self, range: u8) -> u8;
}

/// Draw three distinct indexes from `[0, range)`
///
/// A draw that collides with an earlier one steps to the next free slot,
/// so a deterministic source cannot loop forever. `range` must be at
/// least 3.
pub fn draw_distinct(source: &mut dyn IndexSource, range: u8) -> [u8; INDEXES_PER_ORACLE] {
    let range = range.max(INDEXES_PER_ORACLE as u8);
    let mut indexes = [0u8; INDEXES_PER_ORACLE];

    for slot in 0..INDEXES_PER_ORACLE {
        let mut candidate = source.next_index(range) % range;
        while indexes[..slot].contains(&candidate) {
            candidate = (candidate + 1) % range;
        }
        indexes[slot] = candidate;
    }

    indexes
}

/// `StdRng`-backed source
#[derive(Debug)]
pub struct RandomIndexSource {
    rng: StdRng,
}

impl RandomIndexSource {
    /// Seed from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible source
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IndexSource for RandomIndexSource {
    fn next_index(&mut self, range: u8) -> u8 {
        if range == 0 {
            return 0;
        }
        self.rng.gen_range(0..range)
    }
}

/// Cycles through a fixed list of values
#[derive(Debug, Clone)]
pub struct SequenceIndexSource {
    values: Vec<u8>,
    position: usize,
}

impl SequenceIndexSource {
    /// Create from values (an empty list always yields 0)
    pub fn new(values: impl Into<Vec<u8>>) -> Self {
        Self {
            values: values.into(),
            position: 0,
        }
    }
}

impl IndexSource for SequenceIndexSource {
    fn next_index(&mut self, range: u8) -> u8 {
        if self.values.is_empty() || range == 0 {
            return 0;
        }
        let value = self.values[self.position % self.values.len()];
        self.position = self.position.wrapping_add(1);
        value % range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_distinct_steps_past_collisions() {
        let mut source = SequenceIndexSource::new([7, 7, 7]);
        assert_eq!(draw_distinct(&mut source, 10), [7, 8, 9]);

        let mut source = SequenceIndexSource::new([9, 9, 9]);
        assert_eq!(draw_distinct(&mut source, 10), [9, 0, 1]);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut source = SequenceIndexSource::new([1, 12]);
        assert_eq!(source.next_index(10), 1);
        assert_eq!(source.next_index(10), 2);
        assert_eq!(source.next_index(10), 1);
    }

    #[test]
    fn test_random_in_range() {
        let mut source = RandomIndexSource::seeded(42);
        for _ in 0..200 {
            let indexes = draw_distinct(&mut source, 10);
            assert!(indexes.iter().all(|&i| i < 10));
            assert_ne!(indexes[0], indexes[1]);
            assert_ne!(indexes[0], indexes[2]);
            assert_ne!(indexes[1], indexes[2]);
        }
    }

    #[test]
    fn test_seeded_reproducible() {
        let mut a = RandomIndexSource::seeded(7);
        let mut b = RandomIndexSource::seeded(7);
        assert_eq!(draw_distinct(&mut a, 10), draw_distinct(&mut b, 10));
    }
}
