//! Serializable per-job random generator.
//!
//! Jobs configured with a seed get reproducible randomness that survives
//! process restarts: the `Pcg64` state is serialized into the job row
//! after every draw and restored before the next one. Jobs without a
//! seed use a process-local thread RNG and persist nothing (see
//! `service::Session`).

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;

use crate::error::Result;

/// Restorable random generator state for one job.
///
/// Every draw advances the internal state; callers must persist the
/// advanced state (via [`serialize`](Self::serialize)) in the same unit
/// of work as the draw, or concurrent predictions could replay
/// identical draws.
#[derive(Debug, Clone)]
pub struct GeneratorState(Pcg64);

impl GeneratorState {
    /// Create a fresh generator from a job seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(Pcg64::seed_from_u64(seed))
    }

    /// Create a generator from OS entropy, for jobs without a seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self(Pcg64::from_entropy())
    }

    /// Restore a generator from its serialized state.
    pub fn restore(serialized: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(serialized)?))
    }

    /// Serialize the current state for persistence.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Return the items in a random order.
    #[must_use]
    pub fn shuffled(&mut self, items: &[u32]) -> Vec<u32> {
        let mut out = items.to_vec();
        out.shuffle(&mut self.0);
        out
    }

    /// Draw one sample from `Normal(mean, std_dev^2)`.
    ///
    /// Composed from a standard-normal draw so a degenerate
    /// `std_dev = 0` still consumes exactly one draw.
    pub fn sample_normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.0.sample(StandardNormal);
        mean + std_dev * z
    }
}
