//! In-memory repository backed by lock-free concurrent maps.
//!
//! Per-job tables live under the job id; `DashMap` entry locks give the
//! per-job atomicity the [`Repository`](super::Repository) contract
//! requires without a global lock.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::model::{
    ExplorationRecord, GaussianArmState, JobState, Measurement, Stage, Trial, TrialKind,
};
use crate::repo::Repository;

/// Concurrent in-memory storage backend.
///
/// State is lost on drop; a process restart starts every job from
/// scratch. Suitable for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    jobs: DashMap<String, JobState>,
    arms: DashMap<String, BTreeMap<u32, GaussianArmState>>,
    trials: DashMap<String, Vec<Trial>>,
    explorations: DashMap<String, Vec<ExplorationRecord>>,
    measurements: DashMap<String, Vec<Measurement>>,
}

impl MemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<T>(&self, job_id: &str, f: impl FnOnce(&mut JobState) -> T) -> Result<T> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::UnknownJob(job_id.to_string()))?;
        Ok(f(entry.value_mut()))
    }
}

impl Repository for MemoryRepository {
    async fn create_job(&self, job: JobState) -> Result<()> {
        let job_id = job.job_id().to_string();
        match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => Err(Error::BadOperation(format!(
                "job {job_id} already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.jobs.get(job_id).map(|entry| entry.value().clone()))
    }

    async fn update_stage(&self, job_id: &str, stage: Stage) -> Result<()> {
        self.with_job(job_id, |job| job.stage = stage)
    }

    async fn update_min_cost(&self, job_id: &str, cost: f64, batch_size: u32) -> Result<bool> {
        self.with_job(job_id, |job| {
            if job.min_cost.map_or(true, |current| cost < current) {
                job.min_cost = Some(cost);
                job.min_batch_size = batch_size;
                true
            } else {
                false
            }
        })
    }

    async fn update_exp_default(&self, job_id: &str, batch_size: u32) -> Result<()> {
        self.with_job(job_id, |job| job.exp_default_batch_size = batch_size)
    }

    async fn update_rng_state(&self, job_id: &str, state: &str) -> Result<()> {
        self.with_job(job_id, |job| job.rng_state = Some(state.to_string()))
    }

    async fn create_arms(&self, arms: Vec<GaussianArmState>) -> Result<()> {
        for arm in arms {
            let mut table = self.arms.entry(arm.job_id.clone()).or_default();
            table.insert(arm.batch_size, arm);
        }
        Ok(())
    }

    async fn get_arms(&self, job_id: &str) -> Result<Vec<GaussianArmState>> {
        Ok(self
            .arms
            .get(job_id)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_arm(&self, job_id: &str, batch_size: u32) -> Result<Option<GaussianArmState>> {
        Ok(self
            .arms
            .get(job_id)
            .and_then(|table| table.get(&batch_size).cloned()))
    }

    async fn update_arm(&self, arm: GaussianArmState) -> Result<()> {
        let mut table = self
            .arms
            .get_mut(&arm.job_id)
            .ok_or_else(|| Error::UnknownJob(arm.job_id.clone()))?;
        match table.get_mut(&arm.batch_size) {
            Some(slot) => {
                *slot = arm;
                Ok(())
            }
            None => Err(Error::BadOperation(format!(
                "no arm for batch size {} of job {}",
                arm.batch_size, arm.job_id
            ))),
        }
    }

    async fn add_exploration(&self, record: ExplorationRecord) -> Result<()> {
        let mut records = self.explorations.entry(record.job_id.clone()).or_default();
        if records
            .iter()
            .any(|r| r.batch_size == record.batch_size && r.round == record.round)
        {
            return Err(Error::BadOperation(format!(
                "exploration of batch size {} in round {} already opened for job {}",
                record.batch_size, record.round, record.job_id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn update_exploration(&self, record: ExplorationRecord) -> Result<()> {
        let mut records = self
            .explorations
            .get_mut(&record.job_id)
            .ok_or_else(|| Error::UnknownJob(record.job_id.clone()))?;
        match records
            .iter_mut()
            .find(|r| r.batch_size == record.batch_size && r.round == record.round)
        {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(Error::BadOperation(format!(
                "no exploration of batch size {} in round {} for job {}",
                record.batch_size, record.round, record.job_id
            ))),
        }
    }

    async fn get_explorations_of_job(&self, job_id: &str) -> Result<Vec<ExplorationRecord>> {
        Ok(self
            .explorations
            .get(job_id)
            .map(|records| records.value().clone())
            .unwrap_or_default())
    }

    async fn get_explorations_of_bs(
        &self,
        job_id: &str,
        batch_size: u32,
    ) -> Result<Vec<ExplorationRecord>> {
        Ok(self
            .explorations
            .get(job_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.batch_size == batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_trial(&self, job_id: &str, batch_size: u32, kind: TrialKind) -> Result<Trial> {
        if !self.jobs.contains_key(job_id) {
            return Err(Error::UnknownJob(job_id.to_string()));
        }
        // Entry lock makes number assignment atomic per job.
        let mut trials = self.trials.entry(job_id.to_string()).or_default();
        let number = trials
            .iter()
            .filter(|t| t.batch_size() == batch_size)
            .count() as u32
            + 1;
        let trial = Trial::dispatched(job_id, batch_size, number, kind);
        trials.push(trial.clone());
        Ok(trial)
    }

    async fn get_trial(
        &self,
        job_id: &str,
        batch_size: u32,
        trial_number: u32,
    ) -> Result<Option<Trial>> {
        Ok(self.trials.get(job_id).and_then(|trials| {
            trials
                .iter()
                .find(|t| t.batch_size() == batch_size && t.trial_number() == trial_number)
                .cloned()
        }))
    }

    async fn update_trial(&self, trial: &Trial) -> Result<()> {
        let mut trials = self
            .trials
            .get_mut(trial.job_id())
            .ok_or_else(|| Error::UnknownJob(trial.job_id().to_string()))?;
        match trials.iter_mut().find(|t| {
            t.batch_size() == trial.batch_size() && t.trial_number() == trial.trial_number()
        }) {
            Some(slot) => {
                *slot = trial.clone();
                Ok(())
            }
            None => Err(Error::UnknownTrial {
                job_id: trial.job_id().to_string(),
                batch_size: trial.batch_size(),
                trial_number: trial.trial_number(),
            }),
        }
    }

    async fn add_measurement(&self, job_id: &str, measurement: Measurement) -> Result<()> {
        if !self.jobs.contains_key(job_id) {
            return Err(Error::UnknownJob(job_id.to_string()));
        }
        self.measurements
            .entry(job_id.to_string())
            .or_default()
            .push(measurement);
        Ok(())
    }

    async fn get_measurements(
        &self,
        job_id: &str,
        batch_size: u32,
        window: usize,
    ) -> Result<Vec<Measurement>> {
        let matching: Vec<Measurement> = self
            .measurements
            .get(job_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|m| m.batch_size == batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if window == 0 || matching.len() <= window {
            return Ok(matching);
        }
        Ok(matching[matching.len() - window..].to_vec())
    }
}
