//! Trial: one measured attempt to train at a given batch size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a trial was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialKind {
    /// Issued by the pruning explorer for a (batch size, round) cell.
    Exploration,
    /// Issued while another exploration of the same job was in flight.
    Concurrent,
    /// Issued by the bandit during the MAB stage.
    Mab,
}

/// Lifecycle status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Issued by `predict`, awaiting its terminating report.
    Dispatched,
    /// Ended without error.
    Succeeded,
    /// Ended with a training error.
    Failed,
}

/// One attempt to train at a batch size.
///
/// Keyed by `(job_id, batch_size, trial_number)`; trial numbers increase
/// monotonically per (job, batch size) and are assigned by the
/// repository. Created `Dispatched` by `predict` and terminated by
/// exactly one `report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    job_id: String,
    batch_size: u32,
    trial_number: u32,
    kind: TrialKind,
    status: TrialStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    time: Option<f64>,
    energy: Option<f64>,
    converged: Option<bool>,
}

impl Trial {
    /// Create a freshly dispatched trial.
    #[must_use]
    pub fn dispatched(
        job_id: impl Into<String>,
        batch_size: u32,
        trial_number: u32,
        kind: TrialKind,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            batch_size,
            trial_number,
            kind,
            status: TrialStatus::Dispatched,
            started_at: Utc::now(),
            ended_at: None,
            time: None,
            energy: None,
            converged: None,
        }
    }

    /// Job identifier.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Batch size under trial.
    #[must_use]
    pub const fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Trial number within (job, batch size).
    #[must_use]
    pub const fn trial_number(&self) -> u32 {
        self.trial_number
    }

    /// How the trial was issued.
    #[must_use]
    pub const fn kind(&self) -> TrialKind {
        self.kind
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Dispatch timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Termination timestamp, once terminal.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Measured cumulative time, on success.
    #[must_use]
    pub const fn time(&self) -> Option<f64> {
        self.time
    }

    /// Measured cumulative energy, on success.
    #[must_use]
    pub const fn energy(&self) -> Option<f64> {
        self.energy
    }

    /// Whether the run converged within the cost bound, on success.
    #[must_use]
    pub const fn converged(&self) -> Option<bool> {
        self.converged
    }

    /// Terminate as succeeded with the measured outcome.
    #[must_use]
    pub fn succeeded(mut self, time: f64, energy: f64, converged: bool) -> Self {
        self.status = TrialStatus::Succeeded;
        self.ended_at = Some(Utc::now());
        self.time = Some(time);
        self.energy = Some(energy);
        self.converged = Some(converged);
        self
    }

    /// Terminate as failed (client reported a training error).
    #[must_use]
    pub fn failed(mut self) -> Self {
        self.status = TrialStatus::Failed;
        self.ended_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatched_trial_is_open() {
        let trial = Trial::dispatched("job-1", 1024, 1, TrialKind::Exploration);
        assert_eq!(trial.status(), TrialStatus::Dispatched);
        assert!(trial.ended_at().is_none());
        assert!(trial.converged().is_none());
    }

    #[test]
    fn test_succeeded_records_outcome() {
        let trial = Trial::dispatched("job-1", 1024, 1, TrialKind::Mab);
        let done = trial.succeeded(14.4, 3000.1, true);
        assert_eq!(done.status(), TrialStatus::Succeeded);
        assert_eq!(done.converged(), Some(true));
        assert!(done.ended_at().is_some());
        assert!((done.time().unwrap() - 14.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_records_no_measurement() {
        let done = Trial::dispatched("job-1", 512, 2, TrialKind::Exploration).failed();
        assert_eq!(done.status(), TrialStatus::Failed);
        assert!(done.time().is_none());
        assert!(done.ended_at().is_some());
    }
}
