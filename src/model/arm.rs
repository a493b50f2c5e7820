//! Gaussian arm state: per-arm Bayesian belief over expected cost.

use serde::{Deserialize, Serialize};

/// Posterior belief `Normal(mean, 1/precision)` over one arm's expected
/// cost, with a fixed observation-noise precision estimated at arm
/// construction from the arm's pruning-stage measurements.
///
/// Created only for batch sizes that survive pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianArmState {
    /// Owning job.
    pub job_id: String,
    /// Batch size this arm plays.
    pub batch_size: u32,
    /// Posterior mean of the expected cost.
    pub mean: f64,
    /// Posterior precision of the expected cost.
    pub precision: f64,
    /// Fixed observation-noise precision ("reward precision").
    pub reward_precision: f64,
    /// Observations folded into the posterior so far.
    pub num_observations: u32,
}
