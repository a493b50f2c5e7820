//! Orchestrator: register, predict and report.
//!
//! Owns the job stage machine. Pruning-stage predictions go through the
//! exploration manager; once the survivors are final the arms are
//! constructed, the stage flips to MAB (one way) and the bandit takes
//! over. Reports terminate trials, append measurements and advance the
//! stage-specific state by trial kind. Calls touching the same job are
//! serialized by a per-job async mutex so generator draws and
//! read-modify-write sequences never interleave; distinct jobs proceed
//! in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::explorer;
use crate::mab;
use crate::model::{
    ExplorationRecord, ExplorationState, JobConfig, JobState, Measurement, PredictResponse,
    Registration, ReportResponse, Stage, TrainingResult, Trial, TrialKind, TrialStatus,
};
use crate::policy::{reached_target, training_cost, within_cost_bound};
use crate::repo::Repository;
use crate::service::Session;

/// Batch size optimization engine over a repository backend.
pub struct BatchSizeOptimizer<R: Repository> {
    repo: R,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<R: Repository> BatchSizeOptimizer<R> {
    /// Create an engine over the given repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            locks: DashMap::new(),
        }
    }

    /// The underlying repository.
    pub const fn repo(&self) -> &R {
        &self.repo
    }

    /// The per-job call lock.
    fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(job_id.to_string()).or_default().clone()
    }

    /// Register a job, idempotently.
    ///
    /// Validates and normalizes the configuration; re-registering an
    /// identical configuration is a no-op, a differing one is
    /// `Error::ConfigMismatch`.
    pub async fn register_job(&self, config: JobConfig) -> Result<Registration> {
        let config = config.validated()?;
        let job_id = config.params.job_id.clone();
        let lock = self.job_lock(&job_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.repo.get_job(&job_id).await? {
            if existing.config == config {
                info!(%job_id, "job already registered");
                return Ok(Registration::AlreadyRegistered);
            }
            return Err(Error::ConfigMismatch(format!(
                "job {job_id} is already registered with a different configuration"
            )));
        }

        self.repo.create_job(JobState::new(config)?).await?;
        info!(%job_id, "registered job");
        Ok(Registration::Created)
    }

    /// Choose the next batch size to train with, dispatching a trial.
    pub async fn predict(&self, job_id: &str) -> Result<PredictResponse> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut session = Session::new(&self.repo);
        let job = session
            .fetch_job(job_id)
            .await?
            .ok_or_else(|| Error::UnknownJob(job_id.to_string()))?;

        let trial = match job.stage {
            Stage::Mab => {
                let batch_size = mab::predict(&mut session, job_id).await?;
                session
                    .create_trial(job_id, batch_size, TrialKind::Mab)
                    .await?
            }
            Stage::Pruning => match explorer::next_decision(&mut session, job_id).await? {
                explorer::Decision::Explore { batch_size, round } => {
                    session
                        .add_exploration(ExplorationRecord::exploring(job_id, batch_size, round))
                        .await?;
                    session
                        .create_trial(job_id, batch_size, TrialKind::Exploration)
                        .await?
                }
                explorer::Decision::Concurrent { batch_size } => {
                    session
                        .create_trial(job_id, batch_size, TrialKind::Concurrent)
                        .await?
                }
                explorer::Decision::Finished { survivors } => {
                    mab::construct_arms(&mut session, job_id, &survivors).await?;
                    session.update_stage(job_id, Stage::Mab).await?;
                    info!(job_id, "entering the bandit stage");
                    let batch_size = mab::predict(&mut session, job_id).await?;
                    session
                        .create_trial(job_id, batch_size, TrialKind::Mab)
                        .await?
                }
            },
        };

        Ok(PredictResponse {
            job_id: job_id.to_string(),
            batch_size: trial.batch_size(),
            trial_number: trial.trial_number(),
        })
    }

    /// Consume a training report and decide whether to keep training.
    pub async fn report(&self, result: TrainingResult) -> Result<ReportResponse> {
        let lock = self.job_lock(&result.job_id);
        let _guard = lock.lock().await;

        let mut session = Session::new(&self.repo);
        let job = session
            .fetch_job(&result.job_id)
            .await?
            .ok_or_else(|| Error::UnknownJob(result.job_id.clone()))?;
        let trial = session
            .trial(&result.job_id, result.batch_size, result.trial_number)
            .await?
            .ok_or_else(|| Error::UnknownTrial {
                job_id: result.job_id.clone(),
                batch_size: result.batch_size,
                trial_number: result.trial_number,
            })?;
        if trial.status() != TrialStatus::Dispatched {
            return Err(Error::Validation(format!(
                "trial {} of job {} batch size {} was already terminated",
                result.trial_number, result.job_id, result.batch_size
            )));
        }

        if result.error {
            return self.terminate_failed(&mut session, &result, trial).await;
        }

        let (time, energy, metric) = match (result.time, result.energy, result.metric) {
            (Some(time), Some(energy), Some(metric)) => (time, energy, metric),
            _ => {
                return Err(Error::Validation(
                    "non-error report must include time, energy and metric".to_string(),
                ))
            }
        };

        let params = &job.config.params;
        let cost = training_cost(energy, time, params.eta_knob, job.config.max_power);
        let converged = reached_target(metric, params.target_metric, params.higher_is_better_metric);
        let within_bound = within_cost_bound(cost, job.min_cost, params.beta_knob);

        if within_bound && !converged && result.current_epoch < params.max_epochs {
            return Ok(ReportResponse::keep_training());
        }

        let final_converged = converged && within_bound;
        let message = if final_converged {
            "Train succeeded".to_string()
        } else if within_bound {
            format!(
                "Train failed to converge within max_epochs({})",
                params.max_epochs
            )
        } else {
            let bound = params.beta_knob.unwrap_or(f64::INFINITY)
                * job.min_cost.unwrap_or(f64::INFINITY);
            format!(
                "batch size {} exceeded the cost upper bound: cost {cost:.3} > {bound:.3}",
                result.batch_size
            )
        };

        let done = trial.succeeded(time, energy, final_converged);
        session.update_trial(&done).await?;
        let measurement = Measurement::new(result.batch_size, time, energy, final_converged);
        match done.kind() {
            TrialKind::Exploration => {
                let state = if final_converged {
                    ExplorationState::Converged
                } else {
                    ExplorationState::Unconverged
                };
                let record = self
                    .open_exploration(&session, &result.job_id, result.batch_size)
                    .await?
                    .resolved(state, Some(cost));
                session
                    .record_exploration_result(record, measurement, cost)
                    .await?;
            }
            TrialKind::Concurrent => {
                session
                    .record_concurrent_result(&result.job_id, measurement, cost)
                    .await?;
            }
            TrialKind::Mab => {
                mab::report(&mut session, &result.job_id, measurement, cost).await?;
            }
        }

        info!(
            job_id = %result.job_id,
            batch_size = result.batch_size,
            cost,
            converged = final_converged,
            "trial terminated"
        );
        Ok(ReportResponse::stop(final_converged, message))
    }

    /// Terminate a trial whose run errored out.
    async fn terminate_failed(
        &self,
        session: &mut Session<'_, R>,
        result: &TrainingResult,
        trial: Trial,
    ) -> Result<ReportResponse> {
        warn!(
            job_id = %result.job_id,
            batch_size = result.batch_size,
            trial_number = result.trial_number,
            "training reported an error"
        );
        let kind = trial.kind();
        session.update_trial(&trial.failed()).await?;
        if kind == TrialKind::Exploration {
            let record = self
                .open_exploration(session, &result.job_id, result.batch_size)
                .await?
                .resolved(ExplorationState::Unconverged, None);
            session.update_exploration(record).await?;
        }
        Ok(ReportResponse::stop(
            false,
            format!(
                "training of batch size {} stopped with an error",
                result.batch_size
            ),
        ))
    }

    /// The still-open exploration cell of a batch size.
    async fn open_exploration(
        &self,
        session: &Session<'_, R>,
        job_id: &str,
        batch_size: u32,
    ) -> Result<ExplorationRecord> {
        session
            .explorations_of_bs(job_id, batch_size)
            .await?
            .into_iter()
            .find(|r| r.state == ExplorationState::Exploring)
            .ok_or_else(|| {
                Error::CorruptState(format!(
                    "exploration trial of batch size {batch_size} for job {job_id} has no open cell"
                ))
            })
    }
}
