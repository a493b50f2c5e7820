//! Per-call unit of work over a repository.
//!
//! A [`Session`] lives for exactly one `predict` or `report` call. It
//! caches the jobs fetched within the call and refuses any job-scoped
//! mutation whose job was not fetched first, failing fast with
//! `Error::BadOperation`. It also owns the generator protocol: seeded
//! jobs restore their persisted `Pcg64` state before a draw and persist
//! the advanced state before the draw's result is used, so a process
//! restart never replays randomness.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{
    ExplorationRecord, GaussianArmState, JobState, Measurement, Stage, Trial, TrialKind,
};
use crate::repo::Repository;
use crate::rng::GeneratorState;

/// Unit of work scoped to a single engine call.
pub struct Session<'r, R: Repository> {
    repo: &'r R,
    jobs: HashMap<String, JobState>,
}

impl<'r, R: Repository> Session<'r, R> {
    /// Open a session over the given repository.
    pub fn new(repo: &'r R) -> Self {
        Self {
            repo,
            jobs: HashMap::new(),
        }
    }

    /// Fetch a job and cache it for the rest of the session.
    pub async fn fetch_job(&mut self, job_id: &str) -> Result<Option<JobState>> {
        let fetched = self.repo.get_job(job_id).await?;
        if let Some(job) = &fetched {
            self.jobs.insert(job_id.to_string(), job.clone());
        }
        Ok(fetched)
    }

    /// The cached copy of a previously fetched job.
    pub fn job(&self, job_id: &str) -> Result<&JobState> {
        self.jobs.get(job_id).ok_or_else(|| {
            Error::BadOperation(format!(
                "job {job_id} touched before being fetched in this session"
            ))
        })
    }

    /// All exploration records of a job.
    pub async fn explorations(&self, job_id: &str) -> Result<Vec<ExplorationRecord>> {
        self.job(job_id)?;
        self.repo.get_explorations_of_job(job_id).await
    }

    /// Exploration records of one batch size.
    pub async fn explorations_of_bs(
        &self,
        job_id: &str,
        batch_size: u32,
    ) -> Result<Vec<ExplorationRecord>> {
        self.job(job_id)?;
        self.repo.get_explorations_of_bs(job_id, batch_size).await
    }

    /// Windowed measurements of a batch size, using the job's window.
    pub async fn measurements(&self, job_id: &str, batch_size: u32) -> Result<Vec<Measurement>> {
        let window = self.job(job_id)?.config.params.window_size;
        self.repo.get_measurements(job_id, batch_size, window).await
    }

    /// All arms of a job, ordered by batch size ascending.
    pub async fn arms(&self, job_id: &str) -> Result<Vec<GaussianArmState>> {
        self.job(job_id)?;
        self.repo.get_arms(job_id).await
    }

    /// One arm of a job.
    pub async fn arm(&self, job_id: &str, batch_size: u32) -> Result<Option<GaussianArmState>> {
        self.job(job_id)?;
        self.repo.get_arm(job_id, batch_size).await
    }

    /// A trial by its composite key.
    pub async fn trial(
        &self,
        job_id: &str,
        batch_size: u32,
        trial_number: u32,
    ) -> Result<Option<Trial>> {
        self.job(job_id)?;
        self.repo.get_trial(job_id, batch_size, trial_number).await
    }

    /// Flip the job's stage, keeping the cache in sync.
    pub async fn update_stage(&mut self, job_id: &str, stage: Stage) -> Result<()> {
        self.job(job_id)?;
        self.repo.update_stage(job_id, stage).await?;
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.stage = stage;
        }
        Ok(())
    }

    /// Move the pruning anchor, keeping the cache in sync.
    pub async fn update_exp_default(&mut self, job_id: &str, batch_size: u32) -> Result<()> {
        self.job(job_id)?;
        self.repo.update_exp_default(job_id, batch_size).await?;
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.exp_default_batch_size = batch_size;
        }
        Ok(())
    }

    /// Open an exploration cell.
    pub async fn add_exploration(&mut self, record: ExplorationRecord) -> Result<()> {
        self.job(&record.job_id)?;
        self.repo.add_exploration(record).await
    }

    /// Resolve an exploration cell.
    pub async fn update_exploration(&mut self, record: ExplorationRecord) -> Result<()> {
        self.job(&record.job_id)?;
        self.repo.update_exploration(record).await
    }

    /// Persist the arms constructed from the pruning survivors.
    pub async fn create_arms(&mut self, job_id: &str, arms: Vec<GaussianArmState>) -> Result<()> {
        self.job(job_id)?;
        self.repo.create_arms(arms).await
    }

    /// Dispatch a trial, receiving its assigned trial number.
    pub async fn create_trial(
        &mut self,
        job_id: &str,
        batch_size: u32,
        kind: TrialKind,
    ) -> Result<Trial> {
        self.job(job_id)?;
        self.repo.create_trial(job_id, batch_size, kind).await
    }

    /// Replace a trial after a status transition.
    pub async fn update_trial(&mut self, trial: &Trial) -> Result<()> {
        self.job(trial.job_id())?;
        self.repo.update_trial(trial).await
    }

    /// Append a measurement and conditionally lower the running-minimum
    /// cost, keeping the cache in sync.
    async fn record_measurement(
        &mut self,
        job_id: &str,
        measurement: Measurement,
        cost: f64,
    ) -> Result<()> {
        self.job(job_id)?;
        let batch_size = measurement.batch_size;
        self.repo.add_measurement(job_id, measurement).await?;
        let applied = self.repo.update_min_cost(job_id, cost, batch_size).await?;
        if applied {
            if let Some(job) = self.jobs.get_mut(job_id) {
                job.min_cost = Some(cost);
                job.min_batch_size = batch_size;
            }
        }
        Ok(())
    }

    /// Terminal report of an `Exploration` trial: resolve the cell,
    /// append the measurement and update the minimum cost.
    pub async fn record_exploration_result(
        &mut self,
        record: ExplorationRecord,
        measurement: Measurement,
        cost: f64,
    ) -> Result<()> {
        let job_id = record.job_id.clone();
        self.update_exploration(record).await?;
        self.record_measurement(&job_id, measurement, cost).await
    }

    /// Terminal report of a `Mab` trial: replace the arm posterior,
    /// append the measurement and update the minimum cost.
    pub async fn record_mab_result(
        &mut self,
        arm: GaussianArmState,
        measurement: Measurement,
        cost: f64,
    ) -> Result<()> {
        let job_id = arm.job_id.clone();
        self.job(&job_id)?;
        self.repo.update_arm(arm).await?;
        self.record_measurement(&job_id, measurement, cost).await
    }

    /// Terminal report of a `Concurrent` trial: measurement and minimum
    /// cost only, no stage-specific state.
    pub async fn record_concurrent_result(
        &mut self,
        job_id: &str,
        measurement: Measurement,
        cost: f64,
    ) -> Result<()> {
        self.record_measurement(job_id, measurement, cost).await
    }

    /// Draw a random permutation of `items` through the job generator.
    pub async fn permutation(&mut self, job_id: &str, items: &[u32]) -> Result<Vec<u32>> {
        self.with_generator(job_id, |generator| generator.shuffled(items))
            .await
    }

    /// Draw one `Normal(mean, std_dev^2)` sample through the job
    /// generator.
    pub async fn sample_normal(&mut self, job_id: &str, mean: f64, std_dev: f64) -> Result<f64> {
        self.with_generator(job_id, |generator| generator.sample_normal(mean, std_dev))
            .await
    }

    /// Run one draw against the job generator.
    ///
    /// Seeded jobs restore the persisted state, draw, and persist the
    /// advanced state before the result is returned; unseeded jobs draw
    /// from a throwaway entropy-seeded generator and persist nothing.
    async fn with_generator<T>(
        &mut self,
        job_id: &str,
        draw: impl FnOnce(&mut GeneratorState) -> T,
    ) -> Result<T> {
        let job = self.job(job_id)?;
        if job.config.params.mab_seed.is_none() {
            let mut generator = GeneratorState::from_entropy();
            return Ok(draw(&mut generator));
        }
        let serialized = job.rng_state.clone().ok_or_else(|| {
            Error::CorruptState(format!(
                "job {job_id} is seeded but has no stored generator state"
            ))
        })?;
        let mut generator = GeneratorState::restore(&serialized)?;
        let value = draw(&mut generator);
        let advanced = generator.serialize()?;
        self.repo.update_rng_state(job_id, &advanced).await?;
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.rng_state = Some(advanced);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobConfig, JobParams};
    use crate::repo::MemoryRepository;

    fn job(job_id: &str, seed: Option<u64>) -> JobState {
        let mut params = JobParams::new(job_id, vec![32, 64, 256, 512, 1024, 2048, 4096], 1024);
        params.mab_seed = seed;
        JobState::new(JobConfig::new(params, 300.0, 4, "A40")).unwrap()
    }

    #[tokio::test]
    async fn test_mutation_before_fetch_is_rejected() {
        let repo = MemoryRepository::new();
        repo.create_job(job("job-1", None)).await.unwrap();

        let mut session = Session::new(&repo);
        let err = session.update_stage("job-1", Stage::Mab).await.unwrap_err();
        assert!(matches!(err, Error::BadOperation(_)));

        session.fetch_job("job-1").await.unwrap();
        session.update_stage("job-1", Stage::Mab).await.unwrap();
        assert_eq!(session.job("job-1").unwrap().stage, Stage::Mab);
    }

    #[tokio::test]
    async fn test_record_measurement_tracks_minimum() {
        let repo = MemoryRepository::new();
        repo.create_job(job("job-1", None)).await.unwrap();

        let mut session = Session::new(&repo);
        session.fetch_job("job-1").await.unwrap();
        session
            .record_concurrent_result("job-1", Measurement::new(512, 10.0, 900.0, true), 80.0)
            .await
            .unwrap();
        session
            .record_concurrent_result("job-1", Measurement::new(256, 12.0, 700.0, true), 120.0)
            .await
            .unwrap();

        let cached = session.job("job-1").unwrap();
        assert_eq!(cached.min_cost, Some(80.0));
        assert_eq!(cached.min_batch_size, 512);
        let stored = repo.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(stored.min_cost, Some(80.0));
    }

    #[tokio::test]
    async fn test_seeded_draw_persists_advanced_state() {
        let repo = MemoryRepository::new();
        repo.create_job(job("job-1", Some(42))).await.unwrap();

        let mut session = Session::new(&repo);
        session.fetch_job("job-1").await.unwrap();
        let before = session.job("job-1").unwrap().rng_state.clone().unwrap();
        let _ = session.sample_normal("job-1", 0.0, 1.0).await.unwrap();
        let after = repo.get_job("job-1").await.unwrap().unwrap();
        assert_ne!(after.rng_state.unwrap(), before);
    }

    #[tokio::test]
    async fn test_seeded_draws_replay_after_restart() {
        let repo_a = MemoryRepository::new();
        let repo_b = MemoryRepository::new();
        repo_a.create_job(job("job-1", Some(7))).await.unwrap();
        repo_b.create_job(job("job-1", Some(7))).await.unwrap();

        let items = [32u32, 64, 256, 512];
        let mut session_a = Session::new(&repo_a);
        session_a.fetch_job("job-1").await.unwrap();
        let first = session_a.permutation("job-1", &items).await.unwrap();
        let second = session_a.permutation("job-1", &items).await.unwrap();

        // Fresh sessions over an identical store replay both draws.
        let mut session_b = Session::new(&repo_b);
        session_b.fetch_job("job-1").await.unwrap();
        assert_eq!(session_b.permutation("job-1", &items).await.unwrap(), first);
        let mut session_c = Session::new(&repo_b);
        session_c.fetch_job("job-1").await.unwrap();
        assert_eq!(
            session_c.permutation("job-1", &items).await.unwrap(),
            second
        );
    }

    #[tokio::test]
    async fn test_seeded_job_without_state_is_corrupt() {
        let repo = MemoryRepository::new();
        let mut broken = job("job-1", Some(9));
        broken.rng_state = None;
        repo.create_job(broken).await.unwrap();

        let mut session = Session::new(&repo);
        session.fetch_job("job-1").await.unwrap();
        let err = session.sample_normal("job-1", 0.0, 1.0).await.unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }
}
