//! Exploration record: pruning-stage bookkeeping per (batch size, round).

use serde::{Deserialize, Serialize};

/// Outcome of one pruning exploration cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationState {
    /// Trial dispatched, result not yet reported.
    Exploring,
    /// Converged within the cost bound.
    Converged,
    /// Failed to converge, exceeded the bound, or the trial errored.
    Unconverged,
}

/// Pruning-stage record for (job, batch size, round).
///
/// Drives the branch/prune decision: a direction only advances past a
/// candidate whose latest record is `Converged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationRecord {
    /// Owning job.
    pub job_id: String,
    /// Candidate batch size explored.
    pub batch_size: u32,
    /// Pruning round (1-based sweep number).
    pub round: u32,
    /// Cell outcome.
    pub state: ExplorationState,
    /// Cost measured when the cell resolved.
    pub cost: Option<f64>,
}

impl ExplorationRecord {
    /// Open a cell at trial dispatch time.
    #[must_use]
    pub fn exploring(job_id: impl Into<String>, batch_size: u32, round: u32) -> Self {
        Self {
            job_id: job_id.into(),
            batch_size,
            round,
            state: ExplorationState::Exploring,
            cost: None,
        }
    }

    /// Resolve the cell with its terminal outcome.
    #[must_use]
    pub fn resolved(mut self, state: ExplorationState, cost: Option<f64>) -> Self {
        self.state = state;
        self.cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution() {
        let rec = ExplorationRecord::exploring("job-1", 1024, 1);
        assert_eq!(rec.state, ExplorationState::Exploring);
        let rec = rec.resolved(ExplorationState::Converged, Some(4500.0));
        assert_eq!(rec.state, ExplorationState::Converged);
        assert_eq!(rec.cost, Some(4500.0));
    }
}
