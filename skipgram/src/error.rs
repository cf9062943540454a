//! Error types for vocabulary construction, training and persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong in the library.
///
/// Unknown tokens are not errors; they are skipped while reading the corpus.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrainError {
    /// The optimizer name in the configuration is not `gd` or `adam`.
    #[error("unknown optimizer {0:?} (expected \"gd\" or \"adam\")")]
    UnknownOptimizer(String),

    /// The parameter-init name in the configuration is not `zero` or `xavier`.
    #[error("unknown init mode {0:?} (expected \"zero\" or \"xavier\")")]
    UnknownInitMode(String),

    /// Any other configuration problem, caught before training starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejection sampling could not find enough distinct negative ids.
    #[error("negative sampling exhausted: needed {needed} distinct negatives, found {found}")]
    NegativeSamplingExhausted { needed: usize, found: usize },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error on {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// A vocabulary text file has a malformed line.
    #[error("vocabulary file {path:?} syntax error on line {line}")]
    VocabSyntax { path: PathBuf, line: usize },
}

impl TrainError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TrainError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: bincode::Error) -> Self {
        TrainError::Serialization {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;
