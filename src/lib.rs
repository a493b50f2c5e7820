//! # Ergotune: Energy-Aware Batch Size Optimization
//!
//! Ergotune chooses the training batch size that minimizes a weighted
//! energy/time cost for recurring training jobs. Each job moves through
//! two stages:
//!
//! - **Pruning**: sweep the candidate batch sizes around the default,
//!   dropping candidates that fail to converge within the cost bound.
//! - **MAB**: a Gaussian Thompson-Sampling bandit over the surviving
//!   candidates, refining its cost belief with every reported run.
//!
//! The engine is driven through three calls on
//! [`BatchSizeOptimizer`](optimizer::BatchSizeOptimizer): `register_job`
//! once per job, then a `predict`/`report` pair around every training
//! run.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ergotune::model::{JobConfig, JobParams, TrainingResult};
//! use ergotune::optimizer::BatchSizeOptimizer;
//! use ergotune::repo::MemoryRepository;
//!
//! # async fn run() -> ergotune::Result<()> {
//! let engine = BatchSizeOptimizer::new(MemoryRepository::new());
//!
//! let params = JobParams::new("mnist-dev0", vec![32, 64, 256, 1024], 1024);
//! engine.register_job(JobConfig::new(params, 300.0, 1, "A40")).await?;
//!
//! let prediction = engine.predict("mnist-dev0").await?;
//! // ... train one epoch at prediction.batch_size ...
//! let decision = engine
//!     .report(TrainingResult {
//!         job_id: "mnist-dev0".into(),
//!         batch_size: prediction.batch_size,
//!         trial_number: prediction.trial_number,
//!         error: false,
//!         time: Some(16.2),
//!         energy: Some(3400.0),
//!         metric: Some(0.52),
//!         current_epoch: 1,
//!     })
//!     .await?;
//! assert!(decision.stop_train);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod explorer;
pub mod mab;
pub mod model;
pub mod optimizer;
pub mod policy;
pub mod repo;
pub mod rng;
pub mod service;

pub use error::{Error, Result};
pub use optimizer::BatchSizeOptimizer;
