//! Property-based tests for the optimization engine.
//!
//! - Registration normalization invariants
//! - Prediction stays inside the candidate set
//! - The stored minimum cost is the minimum measured cost
//! - Early stop always stops
//! - Cost function algebra

use proptest::prelude::*;

use ergotune::model::{JobConfig, JobParams, TrainingResult};
use ergotune::policy::training_cost;
use ergotune::repo::{MemoryRepository, Repository};
use ergotune::{BatchSizeOptimizer, Error};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

/// Distinct candidate batch sizes, unsorted, with a valid default index.
fn arb_candidates() -> impl Strategy<Value = (Vec<u32>, usize)> {
    proptest::collection::btree_set(32u32..8192, 2..8).prop_flat_map(|set| {
        let mut sizes: Vec<u32> = set.into_iter().collect();
        sizes.reverse();
        let len = sizes.len();
        (Just(sizes), 0..len)
    })
}

fn arb_run_outcomes(runs: usize) -> impl Strategy<Value = Vec<(f64, f64)>> {
    proptest::collection::vec((1.0f64..100.0, 100.0f64..10000.0), runs)
}

fn config(sizes: Vec<u32>, default: u32) -> JobConfig {
    let mut params = JobParams::new("prop-job", sizes, default);
    // No early stop so every run terminates through convergence alone.
    params.beta_knob = None;
    params.num_pruning_rounds = 1;
    params.mab_seed = Some(7);
    JobConfig::new(params, 300.0, 1, "A40")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Validation sorts and dedups the candidates and keeps the default
    /// inside the set.
    #[test]
    fn prop_registration_normalizes_candidates((sizes, default_idx) in arb_candidates()) {
        let default = sizes[default_idx];
        let params = JobParams::new("prop-job", sizes, default).validated().unwrap();
        prop_assert!(params.batch_sizes.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(params.batch_sizes.contains(&params.default_batch_size));
    }

    /// Every prediction is a member of the registered candidate set, in
    /// both stages.
    #[test]
    fn prop_predict_stays_in_candidate_set(
        (sizes, default_idx) in arb_candidates(),
        outcomes in arb_run_outcomes(24),
    ) {
        let default = sizes[default_idx];
        let candidates = {
            let mut s = sizes.clone();
            s.sort_unstable();
            s
        };
        runtime().block_on(async {
            let engine = BatchSizeOptimizer::new(MemoryRepository::new());
            engine.register_job(config(sizes, default)).await.unwrap();
            for &(time, energy) in &outcomes {
                let prediction = engine.predict("prop-job").await.unwrap();
                prop_assert!(candidates.contains(&prediction.batch_size));
                let decision = engine
                    .report(TrainingResult {
                        job_id: "prop-job".to_string(),
                        batch_size: prediction.batch_size,
                        trial_number: prediction.trial_number,
                        error: false,
                        time: Some(time),
                        energy: Some(energy),
                        metric: Some(1.0),
                        current_epoch: 1,
                    })
                    .await
                    .unwrap();
                prop_assert!(decision.stop_train);
            }
            Ok(())
        })?;
    }

    /// After any sequence of terminal reports, the stored minimum cost
    /// is exactly the minimum cost over all recorded measurements.
    #[test]
    fn prop_min_cost_is_minimum_measured(
        (sizes, default_idx) in arb_candidates(),
        outcomes in arb_run_outcomes(16),
    ) {
        let default = sizes[default_idx];
        runtime().block_on(async {
            let engine = BatchSizeOptimizer::new(MemoryRepository::new());
            engine.register_job(config(sizes, default)).await.unwrap();
            let mut expected: Option<f64> = None;
            for &(time, energy) in &outcomes {
                let prediction = engine.predict("prop-job").await.unwrap();
                engine
                    .report(TrainingResult {
                        job_id: "prop-job".to_string(),
                        batch_size: prediction.batch_size,
                        trial_number: prediction.trial_number,
                        error: false,
                        time: Some(time),
                        energy: Some(energy),
                        metric: Some(1.0),
                        current_epoch: 1,
                    })
                    .await
                    .unwrap();
                let cost = training_cost(energy, time, 0.5, 300.0);
                expected = Some(expected.map_or(cost, |m: f64| m.min(cost)));
            }
            let job = engine.repo().get_job("prop-job").await.unwrap().unwrap();
            prop_assert_eq!(job.min_cost, expected);
            Ok(())
        })?;
    }

    /// With early stop enabled, a cost beyond `beta * min_cost` always
    /// stops, regardless of metric or remaining epoch budget.
    #[test]
    fn prop_early_stop_forces_stop(
        base_time in 1.0f64..50.0,
        base_energy in 100.0f64..5000.0,
        overshoot in 2.1f64..10.0,
        metric in 0.0f64..1.0,
    ) {
        runtime().block_on(async {
            let engine = BatchSizeOptimizer::new(MemoryRepository::new());
            let mut config = config(vec![512, 1024], 1024);
            config.params.beta_knob = Some(2.0);
            engine.register_job(config).await.unwrap();

            // Establish the running minimum with a converged run.
            let anchor = engine.predict("prop-job").await.unwrap();
            engine
                .report(TrainingResult {
                    job_id: "prop-job".to_string(),
                    batch_size: anchor.batch_size,
                    trial_number: anchor.trial_number,
                    error: false,
                    time: Some(base_time),
                    energy: Some(base_energy),
                    metric: Some(1.0),
                    current_epoch: 1,
                })
                .await
                .unwrap();

            let next = engine.predict("prop-job").await.unwrap();
            let decision = engine
                .report(TrainingResult {
                    job_id: "prop-job".to_string(),
                    batch_size: next.batch_size,
                    trial_number: next.trial_number,
                    error: false,
                    time: Some(base_time * overshoot),
                    energy: Some(base_energy * overshoot),
                    metric: Some(metric),
                    current_epoch: 1,
                })
                .await
                .unwrap();
            prop_assert!(decision.stop_train);
            prop_assert!(!decision.converged);
            Ok(())
        })?;
    }

    /// Cost algebra: the eta endpoints isolate energy and power-scaled
    /// time, and cost is monotone in both inputs.
    #[test]
    fn prop_cost_function_algebra(
        energy in 0.0f64..1e6,
        time in 0.0f64..1e4,
        eta in 0.0f64..=1.0,
        max_power in 1.0f64..1000.0,
    ) {
        prop_assert!((training_cost(energy, time, 1.0, max_power) - energy).abs() < 1e-9);
        let time_only = training_cost(energy, time, 0.0, max_power);
        prop_assert!((time_only - max_power * time).abs() < 1e-6);
        let cost = training_cost(energy, time, eta, max_power);
        prop_assert!(cost <= training_cost(energy + 1.0, time + 1.0, eta, max_power));
        prop_assert!(cost >= 0.0);
    }

    /// A validated configuration never carries an out-of-range eta knob.
    #[test]
    fn prop_validation_rejects_bad_eta(eta in prop::num::f64::ANY) {
        let mut params = JobParams::new("prop-job", vec![512, 1024], 1024);
        params.eta_knob = eta;
        let valid = (0.0..=1.0).contains(&eta);
        prop_assert_eq!(params.validated().is_ok(), valid);
    }
}

/// A registration race on the same id resolves to exactly one creation.
#[test]
fn test_concurrent_registration_is_single_winner() {
    runtime().block_on(async {
        let engine = std::sync::Arc::new(BatchSizeOptimizer::new(MemoryRepository::new()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.register_job(config(vec![512, 1024], 1024)).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ergotune::model::Registration::Created) => created += 1,
                Ok(ergotune::model::Registration::AlreadyRegistered) => {}
                Err(err) => panic!("unexpected registration error: {err}"),
            }
        }
        assert_eq!(created, 1);
    });
}

/// The engine surfaces `NoConvergedBatchSize` as a typed error, not a
/// panic, when pruning eliminates everything.
#[test]
fn test_exhausted_pruning_is_a_typed_error() {
    runtime().block_on(async {
        let engine = BatchSizeOptimizer::new(MemoryRepository::new());
        let mut config = config(vec![512, 1024], 1024);
        config.params.max_epochs = 1;
        engine.register_job(config).await.unwrap();

        loop {
            let prediction = match engine.predict("prop-job").await {
                Ok(p) => p,
                Err(Error::NoConvergedBatchSize(_)) => break,
                Err(err) => panic!("unexpected error: {err}"),
            };
            engine
                .report(TrainingResult {
                    job_id: "prop-job".to_string(),
                    batch_size: prediction.batch_size,
                    trial_number: prediction.trial_number,
                    error: false,
                    time: Some(10.0),
                    energy: Some(1000.0),
                    metric: Some(0.0),
                    current_epoch: 1,
                })
                .await
                .unwrap();
        }
    });
}
