//! Job aggregate: user parameters, server configuration and mutable state.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rng::GeneratorState;

/// Stage of a job's lifecycle.
///
/// Transitions only `Pruning` → `Mab`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Initial exploration phase narrowing the candidate set.
    Pruning,
    /// Adaptive Thompson-sampling phase over the surviving arms.
    Mab,
}

/// Immutable tuning parameters submitted by the user.
///
/// `eta_knob` weighs energy against time in the cost function;
/// `beta_knob` multiplies the running-minimum cost into the early-stop
/// bound (`None` disables early stopping). Defaults mirror the
/// recommended starting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Unique job identifier.
    pub job_id: String,
    /// Candidate batch sizes; normalized to sorted ascending, distinct.
    pub batch_sizes: Vec<u32>,
    /// First batch size to try; must be a candidate.
    pub default_batch_size: u32,
    /// Energy/time trade-off in `[0, 1]`.
    pub eta_knob: f64,
    /// Early-stop multiplier (> 0), or `None` to disable early stop.
    pub beta_knob: Option<f64>,
    /// Target metric value for convergence.
    pub target_metric: f64,
    /// Direction of the target metric.
    pub higher_is_better_metric: bool,
    /// Epoch budget per training run (> 0).
    pub max_epochs: u32,
    /// Number of pruning sweeps over the candidate set.
    pub num_pruning_rounds: u32,
    /// How many recent measurements to consider per batch size
    /// (0 = unbounded).
    pub window_size: usize,
    /// Prior mean of each arm's cost belief.
    pub mab_prior_mean: f64,
    /// Prior precision of each arm's cost belief.
    pub mab_prior_precision: f64,
    /// Minimum forced explorations per arm before Thompson sampling.
    pub mab_num_explorations: u32,
    /// Seed for reproducible randomness; `None` for non-deterministic.
    pub mab_seed: Option<u64>,
}

impl JobParams {
    /// Create parameters with default knobs for the given candidates.
    #[must_use]
    pub fn new(job_id: impl Into<String>, batch_sizes: Vec<u32>, default_batch_size: u32) -> Self {
        Self {
            job_id: job_id.into(),
            batch_sizes,
            default_batch_size,
            ..Self::default()
        }
    }

    /// Normalize and validate, consuming self.
    ///
    /// Sorts and dedups the candidate list, then checks every
    /// registration constraint.
    pub fn validated(mut self) -> Result<Self> {
        self.batch_sizes.sort_unstable();
        self.batch_sizes.dedup();
        if self.job_id.is_empty() {
            return Err(Error::Validation("job_id must not be empty".to_string()));
        }
        if self.batch_sizes.is_empty() {
            return Err(Error::Validation("batch_sizes must not be empty".to_string()));
        }
        if self.default_batch_size == 0 {
            return Err(Error::Validation(
                "default_batch_size must be positive".to_string(),
            ));
        }
        if !self.batch_sizes.contains(&self.default_batch_size) {
            return Err(Error::Validation(format!(
                "default batch size {} not in batch_sizes {:?}",
                self.default_batch_size, self.batch_sizes
            )));
        }
        if !(0.0..=1.0).contains(&self.eta_knob) {
            return Err(Error::Validation(format!(
                "eta_knob {} outside [0, 1]",
                self.eta_knob
            )));
        }
        if let Some(beta) = self.beta_knob {
            if beta <= 0.0 {
                return Err(Error::Validation(format!(
                    "beta_knob {beta} must be positive; omit it to disable early stop"
                )));
            }
        }
        if self.max_epochs == 0 {
            return Err(Error::Validation("max_epochs must be positive".to_string()));
        }
        Ok(self)
    }
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            batch_sizes: Vec::new(),
            default_batch_size: 0,
            eta_knob: 0.5,
            beta_knob: Some(2.0),
            target_metric: 0.5,
            higher_is_better_metric: true,
            max_epochs: 100,
            num_pruning_rounds: 2,
            window_size: 10,
            mab_prior_mean: 0.0,
            mab_prior_precision: 0.0,
            mab_num_explorations: 2,
            mab_seed: None,
        }
    }
}

/// Server-side job configuration: user parameters plus hardware fields
/// derived outside this engine (power-limit discovery is a collaborator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// User-submitted tuning parameters.
    pub params: JobParams,
    /// Sum of per-device power ceilings across all devices in use (W).
    pub max_power: f64,
    /// Number of devices used for training.
    pub number_of_gpus: u32,
    /// Device model string, for bookkeeping.
    pub gpu_model: String,
}

impl JobConfig {
    /// Wrap validated parameters with the derived hardware fields.
    pub fn new(
        params: JobParams,
        max_power: f64,
        number_of_gpus: u32,
        gpu_model: impl Into<String>,
    ) -> Self {
        Self {
            params,
            max_power,
            number_of_gpus,
            gpu_model: gpu_model.into(),
        }
    }

    /// Normalize and validate, consuming self.
    pub fn validated(mut self) -> Result<Self> {
        self.params = self.params.validated()?;
        if self.max_power <= 0.0 {
            return Err(Error::Validation(format!(
                "max_power {} must be positive",
                self.max_power
            )));
        }
        if self.number_of_gpus == 0 {
            return Err(Error::Validation(
                "number_of_gpus must be positive".to_string(),
            ));
        }
        if self.gpu_model.is_empty() {
            return Err(Error::Validation("gpu_model must not be empty".to_string()));
        }
        Ok(self)
    }
}

/// Persisted job aggregate: immutable configuration plus mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// Immutable configuration the job was registered with.
    pub config: JobConfig,
    /// Current lifecycle stage.
    pub stage: Stage,
    /// Lowest cost observed across all measurements, if any.
    pub min_cost: Option<f64>,
    /// Batch size that achieved `min_cost` (the default until a
    /// measurement lands).
    pub min_batch_size: u32,
    /// Pruning's internal anchor batch size; starts at the user default
    /// and shifts when the anchor fails to converge.
    pub exp_default_batch_size: u32,
    /// Serialized generator state; present iff a seed is configured.
    pub rng_state: Option<String>,
}

impl JobState {
    /// Initial state for a freshly registered job.
    ///
    /// Seeds and serializes the generator when the job carries a seed.
    pub fn new(config: JobConfig) -> Result<Self> {
        let rng_state = match config.params.mab_seed {
            Some(seed) => Some(GeneratorState::seeded(seed).serialize()?),
            None => None,
        };
        let default = config.params.default_batch_size;
        Ok(Self {
            config,
            stage: Stage::Pruning,
            min_cost: None,
            min_batch_size: default,
            exp_default_batch_size: default,
            rng_state,
        })
    }

    /// Job identifier accessor.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.config.params.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParams {
        JobParams::new("job-1", vec![32, 64, 256, 512, 1024, 2048, 4096], 1024)
    }

    fn config() -> JobConfig {
        JobConfig::new(params(), 300.0, 1, "A100")
    }

    #[test]
    fn test_validation_normalizes_candidates() {
        let mut p = params();
        p.batch_sizes = vec![2048, 32, 1024, 32];
        let p = p.validated().unwrap();
        assert_eq!(p.batch_sizes, vec![32, 1024, 2048]);
    }

    #[test]
    fn test_validation_rejects_foreign_default() {
        let mut p = params();
        p.default_batch_size = 128;
        assert!(matches!(p.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_candidates() {
        let mut p = params();
        p.batch_sizes.clear();
        assert!(matches!(p.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_bad_knobs() {
        let mut p = params();
        p.eta_knob = 1.5;
        assert!(p.validated().is_err());

        let mut p = params();
        p.beta_knob = Some(-1.0);
        assert!(p.validated().is_err());

        let mut p = params();
        p.max_epochs = 0;
        assert!(p.validated().is_err());
    }

    #[test]
    fn test_beta_none_disables_early_stop() {
        let mut p = params();
        p.beta_knob = None;
        assert!(p.validated().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_hardware_fields() {
        let mut c = config();
        c.max_power = 0.0;
        assert!(c.validated().is_err());

        let mut c = config();
        c.gpu_model.clear();
        assert!(c.validated().is_err());
    }

    #[test]
    fn test_new_job_state_seeds_generator() {
        let mut c = config();
        c.params.mab_seed = Some(1);
        let state = JobState::new(c).unwrap();
        assert_eq!(state.stage, Stage::Pruning);
        assert!(state.rng_state.is_some());
        assert_eq!(state.exp_default_batch_size, 1024);
        assert_eq!(state.min_batch_size, 1024);
        assert!(state.min_cost.is_none());
    }

    #[test]
    fn test_new_job_state_without_seed() {
        let state = JobState::new(config()).unwrap();
        assert!(state.rng_state.is_none());
    }
}
