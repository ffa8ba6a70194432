use crate::config::EvictionKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chooses which resident page gives up its frame when a swap-in finds physical memory full.
pub trait EvictionPolicy: std::fmt::Debug {
    /// Pick one of `candidates` (resident page numbers, lowest first).
    fn select_victim(&mut self, candidates: &[u64]) -> Option<u64>;
}

/// Always evicts the lowest resident page number.
#[derive(Debug, Default)]
pub struct FirstFound;

impl EvictionPolicy for FirstFound {
    fn select_victim(&mut self, candidates: &[u64]) -> Option<u64> {
        candidates.first().copied()
    }
}

/// Evicts a uniformly random resident page.
#[derive(Debug)]
pub struct RandomVictim {
    rng: StdRng,
}

impl RandomVictim {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl EvictionPolicy for RandomVictim {
    fn select_victim(&mut self, candidates: &[u64]) -> Option<u64> {
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.gen_range(0..candidates.len())])
    }
}

pub fn build_policy(kind: EvictionKind, seed: Option<u64>) -> Box<dyn EvictionPolicy> {
    match kind {
        EvictionKind::First => Box::new(FirstFound),
        EvictionKind::Random => Box::new(RandomVictim::new(seed)),
    }
}
