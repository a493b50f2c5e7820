//! Gaussian Thompson-Sampling bandit over the pruning survivors.
//!
//! Each arm keeps a conjugate Normal posterior over its expected
//! training cost with a fixed observation-noise precision estimated
//! from the arm's pruning-stage measurements. Arms below the forced
//! exploration quota are played first, in a reproducible random order;
//! afterwards one cost sample is drawn per arm and the smallest sample
//! wins.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{GaussianArmState, JobParams, Measurement};
use crate::policy::training_cost;
use crate::repo::Repository;
use crate::service::Session;

/// Build and persist one arm per survivor, folding the survivor's
/// windowed pruning measurements into its posterior.
pub async fn construct_arms<R: Repository>(
    session: &mut Session<'_, R>,
    job_id: &str,
    survivors: &[u32],
) -> Result<()> {
    let job = session.job(job_id)?.clone();
    let params = &job.config.params;
    let mut arms = Vec::with_capacity(survivors.len());
    for &batch_size in survivors {
        let costs: Vec<f64> = session
            .measurements(job_id, batch_size)
            .await?
            .iter()
            .map(|m| training_cost(m.energy, m.time, params.eta_knob, job.config.max_power))
            .collect();
        arms.push(fit_arm(params, job_id, batch_size, &costs));
    }
    info!(job_id, arms = arms.len(), "constructed bandit arms");
    session.create_arms(job_id, arms).await
}

/// Choose the next batch size to play.
pub async fn predict<R: Repository>(session: &mut Session<'_, R>, job_id: &str) -> Result<u32> {
    let arms = session.arms(job_id).await?;
    if arms.is_empty() {
        return Err(Error::CorruptState(format!(
            "job {job_id} is in the bandit stage but has no arms"
        )));
    }
    let quota = session.job(job_id)?.config.params.mab_num_explorations;

    // Forced exploration first, in a reproducible random order.
    let sizes: Vec<u32> = arms.iter().map(|a| a.batch_size).collect();
    let order = session.permutation(job_id, &sizes).await?;
    for batch_size in order {
        let arm = arms
            .iter()
            .find(|a| a.batch_size == batch_size)
            .ok_or_else(|| {
                Error::CorruptState(format!("permutation produced foreign arm {batch_size}"))
            })?;
        if arm.num_observations < quota {
            info!(
                job_id,
                batch_size,
                observations = arm.num_observations,
                "forced exploration"
            );
            return Ok(batch_size);
        }
    }

    // Thompson sampling: one cost draw per arm, smallest wins. Strict
    // comparison keeps the smaller batch size on ties.
    let mut chosen: Option<(u32, f64)> = None;
    for arm in &arms {
        let std_dev = if arm.precision > 0.0 {
            (1.0 / arm.precision).sqrt()
        } else {
            0.0
        };
        let sample = session.sample_normal(job_id, arm.mean, std_dev).await?;
        debug!(job_id, batch_size = arm.batch_size, sample, "arm sampled");
        if chosen.map_or(true, |(_, best)| sample < best) {
            chosen = Some((arm.batch_size, sample));
        }
    }
    match chosen {
        Some((batch_size, _)) => Ok(batch_size),
        None => Err(Error::CorruptState(format!(
            "job {job_id} bandit sampled no arm"
        ))),
    }
}

/// Fold a terminal cost observation into the arm's posterior and record
/// the measurement.
pub async fn report<R: Repository>(
    session: &mut Session<'_, R>,
    job_id: &str,
    measurement: Measurement,
    cost: f64,
) -> Result<()> {
    let batch_size = measurement.batch_size;
    let arm = session.arm(job_id, batch_size).await?.ok_or_else(|| {
        Error::CorruptState(format!(
            "bandit trial reported for batch size {batch_size} of job {job_id} without an arm"
        ))
    })?;
    let arm = observed(arm, cost);
    debug!(
        job_id,
        batch_size,
        mean = arm.mean,
        precision = arm.precision,
        "arm posterior updated"
    );
    session.record_mab_result(arm, measurement, cost).await
}

/// Fit an arm's posterior from its pruning-stage costs.
///
/// The observation-noise precision is the reciprocal sample variance of
/// the costs, falling back to the prior precision when fewer than two
/// samples exist or the variance is zero.
fn fit_arm(params: &JobParams, job_id: &str, batch_size: u32, costs: &[f64]) -> GaussianArmState {
    let n = costs.len();
    let sum: f64 = costs.iter().sum();
    let reward_precision = if n >= 2 {
        let mean = sum / n as f64;
        let variance = costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n as f64;
        if variance > 0.0 {
            1.0 / variance
        } else {
            params.mab_prior_precision
        }
    } else {
        params.mab_prior_precision
    };

    let precision = params.mab_prior_precision + n as f64 * reward_precision;
    let mean = if precision > 0.0 {
        (params.mab_prior_mean * params.mab_prior_precision + reward_precision * sum) / precision
    } else if n > 0 {
        sum / n as f64
    } else {
        params.mab_prior_mean
    };

    GaussianArmState {
        job_id: job_id.to_string(),
        batch_size,
        mean,
        precision,
        reward_precision,
        num_observations: n as u32,
    }
}

/// Conjugate Gaussian update for one new cost observation.
fn observed(mut arm: GaussianArmState, cost: f64) -> GaussianArmState {
    let new_precision = arm.precision + arm.reward_precision;
    if new_precision > 0.0 {
        arm.mean = (arm.mean * arm.precision + cost * arm.reward_precision) / new_precision;
        arm.precision = new_precision;
    }
    arm.num_observations += 1;
    arm
}
