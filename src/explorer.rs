//! Pruning exploration manager.
//!
//! Narrows the candidate batch sizes over `num_pruning_rounds` sweeps.
//! Within a round the anchor batch size is measured first, then the
//! next-smaller neighbors nearest first, then the next-larger ones; a
//! direction is abandoned as soon as a candidate fails to converge
//! within the cost bound. Candidates that converged in a round form the
//! pool of the next round, whose anchor is the cheapest survivor. The
//! survivors of the final round become the bandit's arms.

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ExplorationRecord, ExplorationState};
use crate::repo::Repository;
use crate::service::Session;

/// What the pruning stage wants `predict` to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Dispatch an exploration trial for this (batch size, round) cell.
    Explore {
        /// Candidate to measure.
        batch_size: u32,
        /// Round the cell belongs to.
        round: u32,
    },
    /// An exploration of this job is still in flight; dispatch a
    /// concurrent trial at the best known batch size instead.
    Concurrent {
        /// Best known batch size.
        batch_size: u32,
    },
    /// Pruning is complete; hand the survivors to the bandit.
    Finished {
        /// Surviving batch sizes, ascending.
        survivors: Vec<u32>,
    },
}

/// Outcome of stepping one round's state machine.
enum RoundStep {
    /// Explore this candidate; `Some` when the anchor had to shift onto
    /// it because the previous anchor failed.
    Explore { batch_size: u32, shifted: bool },
    /// A cell of this round is still Exploring.
    Busy,
    /// Every reachable candidate is resolved; converged (batch size,
    /// cost) pairs in ascending batch-size order.
    Done(Vec<(u32, Option<f64>)>),
}

/// Decide the next pruning action for a job fetched into the session.
///
/// May move the persisted anchor (on anchor failure or at a round
/// boundary) before returning.
pub async fn next_decision<R: Repository>(
    session: &mut Session<'_, R>,
    job_id: &str,
) -> Result<Decision> {
    let job = session.job(job_id)?.clone();
    let params = &job.config.params;

    if params.num_pruning_rounds == 0 {
        // Pruning disabled: the full candidate list goes to the bandit.
        return Ok(Decision::Finished {
            survivors: params.batch_sizes.clone(),
        });
    }

    let records = session.explorations(job_id).await?;
    let current_round = records.iter().map(|r| r.round).max().unwrap_or(0);
    if current_round == 0 {
        return Ok(Decision::Explore {
            batch_size: job.exp_default_batch_size,
            round: 1,
        });
    }

    let pool = round_pool(&params.batch_sizes, &records, current_round)?;
    let in_round: Vec<ExplorationRecord> = records
        .iter()
        .filter(|r| r.round == current_round)
        .cloned()
        .collect();

    match round_step(&pool, job.exp_default_batch_size, &in_round)? {
        RoundStep::Busy => Ok(Decision::Concurrent {
            batch_size: job.min_batch_size,
        }),
        RoundStep::Explore {
            batch_size,
            shifted,
        } => {
            if shifted {
                debug!(job_id, anchor = batch_size, "anchor failed, shifting");
                session.update_exp_default(job_id, batch_size).await?;
            }
            Ok(Decision::Explore {
                batch_size,
                round: current_round,
            })
        }
        RoundStep::Done(survivors) => {
            if survivors.is_empty() {
                return Err(Error::NoConvergedBatchSize(job_id.to_string()));
            }
            if current_round >= params.num_pruning_rounds {
                let survivors: Vec<u32> = survivors.into_iter().map(|(bs, _)| bs).collect();
                debug!(job_id, ?survivors, "pruning complete");
                return Ok(Decision::Finished { survivors });
            }
            let anchor = cheapest(&survivors);
            debug!(
                job_id,
                round = current_round + 1,
                anchor,
                "starting next pruning round"
            );
            session.update_exp_default(job_id, anchor).await?;
            Ok(Decision::Explore {
                batch_size: anchor,
                round: current_round + 1,
            })
        }
    }
}

/// Candidate pool of a round: the full list for round 1, otherwise the
/// converged batch sizes of the previous round.
fn round_pool(
    candidates: &[u32],
    records: &[ExplorationRecord],
    round: u32,
) -> Result<Vec<u32>> {
    if round <= 1 {
        return Ok(candidates.to_vec());
    }
    let mut pool: Vec<u32> = records
        .iter()
        .filter(|r| r.round == round - 1 && r.state == ExplorationState::Converged)
        .map(|r| r.batch_size)
        .collect();
    pool.sort_unstable();
    if pool.is_empty() {
        return Err(Error::CorruptState(format!(
            "round {round} opened without survivors from round {}",
            round - 1
        )));
    }
    Ok(pool)
}

/// Survivor with the lowest recorded cost; ties and missing costs
/// resolve toward the smaller batch size.
fn cheapest(survivors: &[(u32, Option<f64>)]) -> u32 {
    let mut best = survivors[0];
    for &candidate in &survivors[1..] {
        if let (Some(cost), Some(best_cost)) = (candidate.1, best.1) {
            if cost < best_cost {
                best = candidate;
            }
        }
    }
    best.0
}

/// Step one round's exploration order.
fn round_step(pool: &[u32], anchor: u32, records: &[ExplorationRecord]) -> Result<RoundStep> {
    if records
        .iter()
        .any(|r| r.state == ExplorationState::Exploring)
    {
        return Ok(RoundStep::Busy);
    }

    let state_of = |bs: u32| records.iter().find(|r| r.batch_size == bs);
    let anchor_idx = pool.iter().position(|&bs| bs == anchor).ok_or_else(|| {
        Error::CorruptState(format!("anchor {anchor} is not in the round's pool"))
    })?;

    match state_of(anchor) {
        None => {
            return Ok(RoundStep::Explore {
                batch_size: anchor,
                shifted: false,
            })
        }
        Some(r) if r.state == ExplorationState::Unconverged => {
            // Anchor failed: restart from the nearest unexplored
            // candidate, preferring the smaller side.
            let below = pool[..anchor_idx]
                .iter()
                .rev()
                .find(|&&bs| state_of(bs).is_none());
            let above = pool[anchor_idx + 1..]
                .iter()
                .find(|&&bs| state_of(bs).is_none());
            if let Some(&bs) = below.or(above) {
                return Ok(RoundStep::Explore {
                    batch_size: bs,
                    shifted: true,
                });
            }
        }
        Some(_) => {
            // Anchor converged: walk down, then up, abandoning a
            // direction at its first non-converged candidate.
            for &bs in pool[..anchor_idx].iter().rev() {
                match state_of(bs) {
                    None => {
                        return Ok(RoundStep::Explore {
                            batch_size: bs,
                            shifted: false,
                        })
                    }
                    Some(r) if r.state == ExplorationState::Converged => {}
                    Some(_) => break,
                }
            }
            for &bs in &pool[anchor_idx + 1..] {
                match state_of(bs) {
                    None => {
                        return Ok(RoundStep::Explore {
                            batch_size: bs,
                            shifted: false,
                        })
                    }
                    Some(r) if r.state == ExplorationState::Converged => {}
                    Some(_) => break,
                }
            }
        }
    }

    let mut survivors: Vec<(u32, Option<f64>)> = records
        .iter()
        .filter(|r| r.state == ExplorationState::Converged)
        .map(|r| (r.batch_size, r.cost))
        .collect();
    survivors.sort_unstable_by_key(|&(bs, _)| bs);
    Ok(RoundStep::Done(survivors))
}
