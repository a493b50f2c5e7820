//! Cost, convergence and early-stop policy.
//!
//! Pure functions shared by the orchestrator (final stop decision), the
//! pruning explorer (branch continuation) and the bandit (the quantity
//! its belief models). No state, no side effects.

/// Weighted energy/time cost of one training run.
///
/// `eta` trades energy against time: `eta = 1` optimizes energy alone,
/// `eta = 0` optimizes (power-scaled) time alone. `max_power` is the sum
/// of the per-device power ceilings across all devices in use, so the
/// time term is an upper bound on the energy the run could have burned.
#[must_use]
pub fn training_cost(energy: f64, time: f64, eta: f64, max_power: f64) -> f64 {
    eta * energy + (1.0 - eta) * max_power * time
}

/// Whether the measured metric has reached the job's target in the
/// configured direction.
#[must_use]
pub fn reached_target(metric: f64, target: f64, higher_is_better: bool) -> bool {
    if higher_is_better {
        metric >= target
    } else {
        metric <= target
    }
}

/// Early-stop bound check.
///
/// True when early stop is disabled (`beta` is `None`), no minimum cost
/// is known yet, or the cost is within `beta * min_cost`.
#[must_use]
pub fn within_cost_bound(cost: f64, min_cost: Option<f64>, beta: Option<f64>) -> bool {
    match (beta, min_cost) {
        (Some(beta), Some(min_cost)) => cost <= beta * min_cost,
        _ => true,
    }
}
