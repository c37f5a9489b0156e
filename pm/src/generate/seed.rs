//! Seed assignment for emitted combinations

use rand::Rng;
use tracing::debug;

use crate::document::{GenerationSettings, SeedMode};

/// Upper bound for drawn seeds; backends commonly take 32-bit seeds
const MAX_RANDOM_SEED: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedAssigner {
    mode: SeedMode,
    base: u64,
}

impl SeedAssigner {
    /// A missing or negative seed base draws a random base once
    pub fn new<R: Rng + ?Sized>(settings: &GenerationSettings, rng: &mut R) -> Self {
        let base = match settings.seed {
            Some(seed) if seed >= 0 => seed as u64,
            _ => rng.random_range(0..=MAX_RANDOM_SEED),
        };
        debug!(base, mode = ?settings.seed_mode, "SeedAssigner::new: called");
        Self {
            mode: settings.seed_mode,
            base,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Seed for the output emitted at `index`
    pub fn seed_for<R: Rng + ?Sized>(&self, index: u64, rng: &mut R) -> u64 {
        match self.mode {
            SeedMode::Fixed => self.base,
            SeedMode::Progressive => self.base.wrapping_add(index),
            SeedMode::Random => rng.random_range(0..=MAX_RANDOM_SEED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn settings(seed: Option<i64>, seed_mode: SeedMode) -> GenerationSettings {
        GenerationSettings {
            seed,
            seed_mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_and_progressive() {
        let mut rng = StdRng::seed_from_u64(0);
        let fixed = SeedAssigner::new(&settings(Some(42), SeedMode::Fixed), &mut rng);
        assert_eq!(fixed.seed_for(0, &mut rng), 42);
        assert_eq!(fixed.seed_for(9, &mut rng), 42);

        let progressive = SeedAssigner::new(&settings(Some(42), SeedMode::Progressive), &mut rng);
        assert_eq!(progressive.seed_for(0, &mut rng), 42);
        assert_eq!(progressive.seed_for(3, &mut rng), 45);
    }

    #[test]
    fn test_negative_or_missing_base_is_random_once() {
        let mut rng = StdRng::seed_from_u64(5);
        let assigner = SeedAssigner::new(&settings(Some(-1), SeedMode::Progressive), &mut rng);
        assert!(assigner.base() <= MAX_RANDOM_SEED);
        assert_eq!(assigner.seed_for(2, &mut rng), assigner.base() + 2);

        let assigner = SeedAssigner::new(&settings(None, SeedMode::Fixed), &mut rng);
        assert_eq!(assigner.seed_for(0, &mut rng), assigner.seed_for(1, &mut rng));
    }

    #[test]
    fn test_random_mode_draws_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let assigner = SeedAssigner::new(&settings(Some(1), SeedMode::Random), &mut rng);
        for i in 0..20 {
            assert!(assigner.seed_for(i, &mut rng) <= MAX_RANDOM_SEED);
        }
    }
}
