//! Skip-gram word embeddings trained with negative sampling.
//!
//! The pieces, leaves first:
//!
//! -   [`Vocabulary`]: word ids ordered by descending frequency.
//! -   [`NoiseTable`] and [`Subsampler`]: the smoothed unigram table negatives
//!     are drawn from, and the policy that drops frequent words.
//! -   [`ParameterStore`]: the embedding matrix, context weights and optional
//!     biases, with sparse `project` / `unproject`.
//! -   [`model`]: forward and backward computation on a projection.
//! -   [`Optimizer`]: gradient descent or Adam, applied to a projection.
//! -   [`Trainer`]: the epoch / sentence / window loop.

pub mod config;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod persist;
pub mod sampling;
pub mod train;
pub mod vocab;

pub use config::{InitMode, OptimizerKind, TrainConfig};
pub use error::{Result, TrainError};
pub use optimizer::{Adam, GradientDescent, Optimizer};
pub use params::{ParameterStore, Projection};
pub use sampling::{negative_sample, NoiseTable, Subsampler, TrainingExample};
pub use train::{EpochStats, Trainer};
pub use vocab::Vocabulary;
