//! Forward and backward computation for one projected training example.
//!
//! With `d = pred - label`, the gradients of the negative-sampling loss are
//!
//! ```text
//! grad_embeddings = Wᵀ · d
//! grad_weights    = d · Eᵀ
//! grad_biases     = d
//! ```
//!
//! all taken with respect to the projected parameters only.

use ndarray::prelude::*;
use ndarray::Zip;

use crate::params::Projection;

/// Logits are clamped to `±MAX_LOGIT` before `exp`.
pub const MAX_LOGIT: f32 = 30.0;

/// Smallest probability the loss will take the log of.
pub const MIN_PROBABILITY: f32 = 1e-7;

/// The logistic function, 1 / (1 + e^-x). Never returns NaN.
pub fn sigmoid(x: f32) -> f32 {
    if x.is_nan() {
        return 0.5;
    }
    let x = x.clamp(-MAX_LOGIT, MAX_LOGIT);
    1.0 / (1.0 + (-x).exp())
}

/// Predicted probabilities, one per `(target, input)` pair.
/// The result has shape `(targets, inputs)`.
pub fn forward(p: &Projection) -> Array2<f32> {
    let mut logits = p.weights.dot(&p.embeddings);
    if let Some(b) = &p.biases {
        logits += &b.view().insert_axis(Axis(1));
    }
    logits.mapv_into(sigmoid)
}

/// Binary cross-entropy, summed over every prediction.
///
/// `-ln |pred + label - 1|` is `-ln pred` when `label == 1` and
/// `-ln (1 - pred)` when `label == 0`.
pub fn loss(preds: ArrayView2<'_, f32>, labels: &[f32]) -> f32 {
    assert_eq!(preds.nrows(), labels.len(), "one label per target row");
    let mut total = 0.0;
    Zip::from(preds.rows())
        .and(&aview1(labels))
        .for_each(|row, &label| {
            for &pred in row {
                total += -(pred + label - 1.0).abs().max(MIN_PROBABILITY).ln();
            }
        });
    total
}

/// Gradients of `loss` with respect to the projected parameters.
pub fn backward(p: &Projection, preds: ArrayView2<'_, f32>, labels: &[f32]) -> Projection {
    assert_eq!(preds.dim(), (p.num_targets(), p.num_inputs()));
    assert_eq!(preds.nrows(), labels.len(), "one label per target row");

    let d = &preds - &aview1(labels).insert_axis(Axis(1));
    Projection {
        embeddings: p.weights.t().dot(&d),
        weights: d.dot(&p.embeddings.t()),
        biases: p.biases.as_ref().map(|_| d.sum_axis(Axis(1))),
    }
}
