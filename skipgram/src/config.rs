//! Training configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Which update rule to apply to each projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Plain gradient descent: `param -= learning_rate * grad`.
    GradientDescent,
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gd" => Ok(OptimizerKind::GradientDescent),
            "adam" => Ok(OptimizerKind::Adam),
            _ => Err(TrainError::UnknownOptimizer(s.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizerKind::GradientDescent => "gd",
            OptimizerKind::Adam => "adam",
        })
    }
}

/// How the context-weight matrix `W` is initialized. The embedding matrix is
/// always scaled-random, as in word2vec; otherwise nothing could ever move
/// away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitMode {
    Zero,
    /// Uniform in `±sqrt(6 / (V + embed_size))`.
    Xavier,
}

impl FromStr for InitMode {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zero" => Ok(InitMode::Zero),
            "xavier" => Ok(InitMode::Xavier),
            _ => Err(TrainError::UnknownInitMode(s.to_string())),
        }
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitMode::Zero => "zero",
            InitMode::Xavier => "xavier",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Embedding vector length (number of dimensions).
    pub embed_size: usize,

    /// Half-width of the skip-gram window.
    pub window: usize,

    /// Shrink the window to a random radius in `1..=window` at each position,
    /// like word2vec does.
    pub dynamic_window: bool,

    pub use_biases: bool,
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,

    /// Optional Adam learning-rate decay: the effective rate is divided by
    /// `1 + decay * (t - 1)`. Ignored by plain gradient descent.
    pub adam_decay: Option<f32>,

    /// Subsampling threshold. Zero disables subsampling.
    pub subsample_rate: f32,

    /// Number of negative samples `k` per training example.
    pub negative_samples: usize,

    pub n_epochs: usize,
    pub init: InitMode,

    /// Seed for every random draw made during a run.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            embed_size: 100,
            window: 5,
            dynamic_window: false,
            use_biases: false,
            optimizer: OptimizerKind::GradientDescent,
            learning_rate: 0.025,
            adam_decay: None,
            subsample_rate: 1e-3,
            negative_samples: 5,
            n_epochs: 5,
            init: InitMode::Zero,
            seed: 1,
        }
    }
}

impl TrainConfig {
    /// Check every numeric setting. Called before any training work begins.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(TrainError::InvalidConfig(msg.into()))
        }

        if self.embed_size == 0 {
            return invalid("embed_size must be greater than 0");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            ));
        }
        if !(self.subsample_rate.is_finite() && self.subsample_rate >= 0.0) {
            return invalid(format!(
                "subsample_rate must be non-negative, got {}",
                self.subsample_rate
            ));
        }
        if self.negative_samples == 0 {
            return invalid("negative_samples must be at least 1");
        }
        if self.n_epochs == 0 {
            return invalid("n_epochs must be at least 1");
        }
        if let Some(decay) = self.adam_decay {
            if !(decay.is_finite() && decay >= 0.0) {
                return invalid(format!("adam_decay must be non-negative, got {decay}"));
            }
        }
        Ok(())
    }
}
