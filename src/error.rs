//! Error types for ergotune
//!
//! Validation and lookup errors carry enough detail for the caller to
//! correct the request; `BadOperation` and `CorruptState` are server
//! faults signalling a core-contract violation and must not be retried.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ergotune error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed job specification (empty candidate list, default batch
    /// size not a candidate, knob out of range, missing report fields)
    #[error("invalid job spec: {0}")]
    Validation(String),

    /// A known job id was re-registered with different parameters
    #[error("job configuration mismatch: {0}\nUse a new job id for a different configuration")]
    ConfigMismatch(String),

    /// `predict`/`report` referenced a job that was never registered
    #[error("unknown job '{0}': register the job first")]
    UnknownJob(String),

    /// `report` referenced a trial that was never dispatched
    #[error("unknown trial {trial_number} for job '{job_id}' batch size {batch_size}")]
    UnknownTrial {
        /// Job the report referred to
        job_id: String,
        /// Batch size the report referred to
        batch_size: u32,
        /// Trial number the report referred to
        trial_number: u32,
    },

    /// A job-scoped mutation was attempted without fetching the job in
    /// the same unit of work (internal contract violation)
    #[error("bad repository operation: {0}")]
    BadOperation(String),

    /// Persisted state is inconsistent (e.g. a seed is configured but no
    /// generator state is stored)
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),

    /// Pruning exploration finished without a single batch size
    /// converging within the cost bound
    #[error("no batch size converged during pruning for job '{0}'")]
    NoConvergedBatchSize(String),

    /// Generator state (de)serialization failed
    #[error("generator state serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_trial_display() {
        let err = Error::UnknownTrial {
            job_id: "job-1".to_string(),
            batch_size: 512,
            trial_number: 3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("job-1"));
        assert!(msg.contains("512"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_serialization_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
