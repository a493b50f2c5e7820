//! Repository contract: the boundary to the storage collaborator.
//!
//! Only the logical data model and operations are specified here; the
//! storage technology is a collaborator concern. [`MemoryRepository`] is
//! the default backend. Every mutation scoped to a job must be preceded,
//! within the same unit of work, by a fetch of that job — the
//! [`Session`](crate::service::Session) layer enforces this and fails
//! fast with `Error::BadOperation` otherwise.

mod memory;

pub use memory::MemoryRepository;

use std::future::Future;

use crate::error::Result;
use crate::model::{
    ExplorationRecord, GaussianArmState, JobState, Measurement, Stage, Trial, TrialKind,
};

/// Storage operations required by the decision engine.
///
/// Implementations must make `create_trial` (trial-number assignment)
/// and `update_min_cost` (compare-and-set) atomic per job, and make the
/// generator-state update visible atomically with respect to concurrent
/// readers of the same job.
pub trait Repository: Send + Sync {
    /// Persist a new job aggregate. Fails if the id already exists.
    fn create_job(&self, job: JobState) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a job by id.
    fn get_job(&self, job_id: &str) -> impl Future<Output = Result<Option<JobState>>> + Send;

    /// Set the job's lifecycle stage.
    fn update_stage(&self, job_id: &str, stage: Stage) -> impl Future<Output = Result<()>> + Send;

    /// Conditionally lower the job's running-minimum cost.
    ///
    /// Applies only when `cost` is strictly lower than the stored
    /// minimum (or none exists); returns whether it applied.
    fn update_min_cost(
        &self,
        job_id: &str,
        cost: f64,
        batch_size: u32,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Move the pruning anchor batch size.
    fn update_exp_default(
        &self,
        job_id: &str,
        batch_size: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist the advanced generator state.
    fn update_rng_state(
        &self,
        job_id: &str,
        state: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist the arms constructed for the pruning survivors.
    fn create_arms(&self, arms: Vec<GaussianArmState>)
        -> impl Future<Output = Result<()>> + Send;

    /// Fetch all arms of a job, ordered by batch size ascending.
    fn get_arms(&self, job_id: &str) -> impl Future<Output = Result<Vec<GaussianArmState>>> + Send;

    /// Fetch one arm.
    fn get_arm(
        &self,
        job_id: &str,
        batch_size: u32,
    ) -> impl Future<Output = Result<Option<GaussianArmState>>> + Send;

    /// Replace an arm's posterior state.
    fn update_arm(&self, arm: GaussianArmState) -> impl Future<Output = Result<()>> + Send;

    /// Open an exploration cell. Fails on a duplicate (batch size, round).
    fn add_exploration(
        &self,
        record: ExplorationRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Resolve an exploration cell.
    fn update_exploration(
        &self,
        record: ExplorationRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch every exploration record of a job.
    fn get_explorations_of_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Vec<ExplorationRecord>>> + Send;

    /// Fetch the exploration records of one batch size.
    fn get_explorations_of_bs(
        &self,
        job_id: &str,
        batch_size: u32,
    ) -> impl Future<Output = Result<Vec<ExplorationRecord>>> + Send;

    /// Create a Dispatched trial, assigning the next trial number for
    /// (job, batch size).
    fn create_trial(
        &self,
        job_id: &str,
        batch_size: u32,
        kind: TrialKind,
    ) -> impl Future<Output = Result<Trial>> + Send;

    /// Fetch a trial by its composite key.
    fn get_trial(
        &self,
        job_id: &str,
        batch_size: u32,
        trial_number: u32,
    ) -> impl Future<Output = Result<Option<Trial>>> + Send;

    /// Replace a trial (status transition).
    fn update_trial(&self, trial: &Trial) -> impl Future<Output = Result<()>> + Send;

    /// Append a measurement to the job's observation history.
    fn add_measurement(
        &self,
        job_id: &str,
        measurement: Measurement,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the most recent measurements of a batch size, newest last;
    /// `window = 0` fetches all.
    fn get_measurements(
        &self,
        job_id: &str,
        batch_size: u32,
        window: usize,
    ) -> impl Future<Output = Result<Vec<Measurement>>> + Send;
}
