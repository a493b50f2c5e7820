//! Data model for the batch size optimizer.
//!
//! ## Schema overview
//!
//! ```text
//! JobState (1) ──< Trial (N)            keyed (job, batch size, trial no.)
//!     │     ──< Measurement (N)         append-only observation history
//!     │     ──< ExplorationRecord (N)   keyed (job, batch size, round)
//!     └─────< GaussianArmState (0..N)   keyed (job, batch size), survivors only
//! ```
//!
//! `JobState` is the aggregate root: immutable tuning parameters
//! (`JobParams` wrapped by the server-derived `JobConfig`) plus the
//! mutable stage, running-minimum cost and persisted generator state.

mod arm;
mod exploration;
mod job;
mod measurement;
mod messages;
mod trial;

pub use arm::GaussianArmState;
pub use exploration::{ExplorationRecord, ExplorationState};
pub use job::{JobConfig, JobParams, JobState, Stage};
pub use measurement::Measurement;
pub use messages::{PredictResponse, Registration, ReportResponse, TrainingResult};
pub use trial::{Trial, TrialKind, TrialStatus};
