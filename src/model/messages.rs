//! Request/response types consumed by the transport collaborator.

use serde::{Deserialize, Serialize};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Registration {
    /// The job was unseen and has been persisted.
    Created,
    /// An identical job was already registered; nothing changed.
    AlreadyRegistered,
}

/// Batch size decision returned by `predict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Job the decision belongs to.
    pub job_id: String,
    /// Batch size to train with next.
    pub batch_size: u32,
    /// Trial number of the freshly dispatched trial.
    pub trial_number: u32,
}

/// Training outcome reported by the client once per evaluation.
///
/// `time`/`energy` are cumulative and monotonically non-decreasing
/// across reports of the same run; all three optional fields must be
/// populated unless `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Job the report belongs to.
    pub job_id: String,
    /// Batch size the run trained with.
    pub batch_size: u32,
    /// Trial number the run was dispatched as.
    pub trial_number: u32,
    /// True when training aborted with an error.
    pub error: bool,
    /// Cumulative training time so far.
    pub time: Option<f64>,
    /// Cumulative energy consumption so far.
    pub energy: Option<f64>,
    /// Current metric value after `current_epoch`.
    pub metric: Option<f64>,
    /// Current epoch index, checked against the job's epoch budget.
    pub current_epoch: u32,
}

/// Stop/continue decision returned by `report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Whether the client should stop training this run.
    pub stop_train: bool,
    /// Whether the run converged within the cost bound.
    pub converged: bool,
    /// Human-readable reason for the decision.
    pub message: String,
}

impl ReportResponse {
    /// Keep-training response.
    #[must_use]
    pub fn keep_training() -> Self {
        Self {
            stop_train: false,
            converged: false,
            message: "Stop condition not met, keep training".to_string(),
        }
    }

    /// Stop-training response with the given convergence flag and reason.
    #[must_use]
    pub fn stop(converged: bool, message: impl Into<String>) -> Self {
        Self {
            stop_train: true,
            converged,
            message: message.into(),
        }
    }
}
