//! Model parameters and sparse projection.
//!
//! Negative sampling only ever needs a handful of rows and columns per
//! training example. `ParameterStore::project` gathers those into a small
//! owned `Projection`, everything else (forward, backward, optimizer) works on
//! the projection, and `ParameterStore::unproject` scatters the results back.
//! Per-step cost is independent of vocabulary size.

use ndarray::prelude::*;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::InitMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterStore {
    /// `embeddings.column(i)` is the input-side vector for word `i`.
    /// Shape `(embed_size, V)`.
    embeddings: Array2<f32>,

    /// `weights.row(j)` is the output-side vector for word `j`.
    /// Shape `(V, embed_size)`.
    weights: Array2<f32>,

    /// One bias per output word, if enabled.
    biases: Option<Array1<f32>>,
}

/// The parameters touched by one training example, or their gradients.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Shape `(embed_size, inputs)`.
    pub embeddings: Array2<f32>,
    /// Shape `(targets, embed_size)`.
    pub weights: Array2<f32>,
    /// Shape `(targets,)`, present iff the store has biases.
    pub biases: Option<Array1<f32>>,
}

impl ParameterStore {
    /// Allocate parameters for a vocabulary of `vocab_size` words.
    ///
    /// Embeddings are uniform in `±0.5 / embed_size`, as in word2vec. Weights
    /// follow `init`. Biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        vocab_size: usize,
        embed_size: usize,
        use_biases: bool,
        init: InitMode,
        rng: &mut R,
    ) -> Self {
        let scale = 0.5 / embed_size as f32;
        let embeddings =
            Array2::random_using((embed_size, vocab_size), Uniform::new(-scale, scale), rng);
        let weights = match init {
            InitMode::Zero => Array2::zeros((vocab_size, embed_size)),
            InitMode::Xavier => {
                let limit = (6.0 / (vocab_size + embed_size) as f32).sqrt();
                Array2::random_using((vocab_size, embed_size), Uniform::new(-limit, limit), rng)
            }
        };
        let biases = use_biases.then(|| Array1::zeros(vocab_size));
        ParameterStore {
            embeddings,
            weights,
            biases,
        }
    }

    /// Build a store from existing matrices. Panics if the shapes disagree.
    pub fn from_parts(
        embeddings: Array2<f32>,
        weights: Array2<f32>,
        biases: Option<Array1<f32>>,
    ) -> Self {
        let (embed_size, vocab_size) = embeddings.dim();
        assert_eq!(
            weights.dim(),
            (vocab_size, embed_size),
            "weights must have shape (vocab_size, embed_size)"
        );
        if let Some(b) = &biases {
            assert_eq!(b.len(), vocab_size, "biases must have one entry per word");
        }
        ParameterStore {
            embeddings,
            weights,
            biases,
        }
    }

    /// A store of the same shape with every entry zero. Adam keeps its
    /// moment estimates in these.
    pub fn zeros_like(other: &ParameterStore) -> Self {
        ParameterStore {
            embeddings: Array2::zeros(other.embeddings.raw_dim()),
            weights: Array2::zeros(other.weights.raw_dim()),
            biases: other.biases.as_ref().map(|b| Array1::zeros(b.raw_dim())),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn embed_size(&self) -> usize {
        self.embeddings.nrows()
    }

    pub fn has_biases(&self) -> bool {
        self.biases.is_some()
    }

    pub fn embeddings(&self) -> ArrayView2<'_, f32> {
        self.embeddings.view()
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    pub fn biases(&self) -> Option<ArrayView1<'_, f32>> {
        self.biases.as_ref().map(|b| b.view())
    }

    /// The input-side vector for one word.
    pub fn embedding(&self, id: usize) -> ArrayView1<'_, f32> {
        self.embeddings.column(id)
    }

    /// Gather the embedding columns of `input_ids`, and the weight rows and
    /// biases of `target_ids`, into an owned projection.
    pub fn project(&self, input_ids: &[usize], target_ids: &[usize]) -> Projection {
        Projection {
            embeddings: self.embeddings.select(Axis(1), input_ids),
            weights: self.weights.select(Axis(0), target_ids),
            biases: self.biases.as_ref().map(|b| b.select(Axis(0), target_ids)),
        }
    }

    /// Write a projection back at the indices it was gathered from.
    ///
    /// If an id repeats, the last copy wins.
    pub fn unproject(
        &mut self,
        projection: &Projection,
        input_ids: &[usize],
        target_ids: &[usize],
    ) {
        assert_eq!(projection.embeddings.ncols(), input_ids.len());
        assert_eq!(projection.weights.nrows(), target_ids.len());

        for (col, &id) in projection.embeddings.columns().into_iter().zip(input_ids) {
            self.embeddings.column_mut(id).assign(&col);
        }
        for (row, &id) in projection.weights.rows().into_iter().zip(target_ids) {
            self.weights.row_mut(id).assign(&row);
        }
        match (&mut self.biases, &projection.biases) {
            (Some(b), Some(pb)) => {
                for (&value, &id) in pb.iter().zip(target_ids) {
                    b[id] = value;
                }
            }
            (None, None) => {}
            _ => panic!("projection bias presence does not match the parameter store"),
        }
    }
}

impl Projection {
    pub fn num_inputs(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn num_targets(&self) -> usize {
        self.weights.nrows()
    }

    /// True if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.embeddings.iter().all(|x| x.is_finite())
            && self.weights.iter().all(|x| x.is_finite())
            && self
                .biases
                .as_ref()
                .map_or(true, |b| b.iter().all(|x| x.is_finite()))
    }
}
