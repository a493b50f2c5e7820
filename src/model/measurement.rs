//! Measurement: immutable (time, energy) observation of a batch size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successful training outcome for a batch size.
///
/// Append-only; the pruning explorer and the bandit read these back as
/// their observation history, bounded by the job's window size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Batch size that produced the observation.
    pub batch_size: u32,
    /// Cumulative training time of the run.
    pub time: f64,
    /// Cumulative energy consumption of the run.
    pub energy: f64,
    /// Whether the run converged within the cost bound.
    pub converged: bool,
    /// Append timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl Measurement {
    /// Record an observation now.
    #[must_use]
    pub fn new(batch_size: u32, time: f64, energy: f64, converged: bool) -> Self {
        Self {
            batch_size,
            time,
            energy,
            converged,
            recorded_at: Utc::now(),
        }
    }
}
