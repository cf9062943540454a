//! Update rules applied to a sparse projection.

use ndarray::prelude::*;
use ndarray::Zip;

use crate::config::{OptimizerKind, TrainConfig};
use crate::params::{ParameterStore, Projection};

pub trait Optimizer {
    /// Apply one step to `params`, the projection of the store at
    /// `input_ids` / `target_ids`, given gradients `grads` of the same shape.
    ///
    /// Implementations may keep per-parameter state, but must only read or
    /// write it at those same indices.
    ///
    /// Returns `false` if the step left `params` non-finite. The optimizer's
    /// own state is then unchanged, and the caller must discard `params`.
    fn update(
        &mut self,
        params: &mut Projection,
        grads: &Projection,
        input_ids: &[usize],
        target_ids: &[usize],
    ) -> bool;

    /// The configured base learning rate.
    fn learning_rate(&self) -> f32;
}

/// Build the optimizer named in `config` for parameters shaped like `store`.
pub fn build(config: &TrainConfig, store: &ParameterStore) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::GradientDescent => Box::new(GradientDescent::new(config.learning_rate)),
        OptimizerKind::Adam => {
            let mut adam = Adam::new(store, config.learning_rate);
            adam.decay = config.adam_decay;
            Box::new(adam)
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        GradientDescent { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update(
        &mut self,
        params: &mut Projection,
        grads: &Projection,
        _: &[usize],
        _: &[usize],
    ) -> bool {
        let rate = self.learning_rate;
        params.embeddings.scaled_add(-rate, &grads.embeddings);
        params.weights.scaled_add(-rate, &grads.weights);
        if let (Some(b), Some(gb)) = (&mut params.biases, &grads.biases) {
            b.scaled_add(-rate, gb);
        }
        params.is_finite()
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// Adam, with moment estimates stored at full size but read and written only
/// through projections.
///
/// Moments at indices that are not touched by a step stay exactly as they
/// were; they are not decayed.
#[derive(Debug, Clone)]
pub struct Adam {
    pub alpha: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// If set, the step size is divided by `1 + decay * (t - 1)`.
    pub decay: Option<f32>,
    /// Step counter, starting at 1 and shared by every parameter.
    t: u64,
    m: ParameterStore,
    v: ParameterStore,
}

impl Adam {
    pub fn new(store: &ParameterStore, alpha: f32) -> Self {
        Adam {
            alpha,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            decay: None,
            t: 1,
            m: ParameterStore::zeros_like(store),
            v: ParameterStore::zeros_like(store),
        }
    }

    /// The number of the next step.
    pub fn step(&self) -> u64 {
        self.t
    }

    pub fn first_moments(&self) -> &ParameterStore {
        &self.m
    }

    pub fn second_moments(&self) -> &ParameterStore {
        &self.v
    }

    /// Bias-corrected step size for step `t`.
    fn effective_rate(&self) -> f32 {
        let t = self.t as f64;
        let (beta1, beta2) = (self.beta1 as f64, self.beta2 as f64);
        let mut lr = self.alpha as f64 * (1.0 - beta2.powf(t)).sqrt() / (1.0 - beta1.powf(t));
        if let Some(decay) = self.decay {
            lr /= 1.0 + decay as f64 * (t - 1.0);
        }
        lr as f32
    }

    fn apply<D: Dimension>(
        &self,
        lr: f32,
        params: ArrayViewMut<'_, f32, D>,
        m: ArrayViewMut<'_, f32, D>,
        v: ArrayViewMut<'_, f32, D>,
        grads: ArrayView<'_, f32, D>,
    ) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        Zip::from(params)
            .and(m)
            .and(v)
            .and(grads)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *p -= lr * *m / (v.sqrt() + epsilon);
            });
    }
}

impl Optimizer for Adam {
    fn update(
        &mut self,
        params: &mut Projection,
        grads: &Projection,
        input_ids: &[usize],
        target_ids: &[usize],
    ) -> bool {
        let lr = self.effective_rate();
        let mut m = self.m.project(input_ids, target_ids);
        let mut v = self.v.project(input_ids, target_ids);

        self.apply(
            lr,
            params.embeddings.view_mut(),
            m.embeddings.view_mut(),
            v.embeddings.view_mut(),
            grads.embeddings.view(),
        );
        self.apply(
            lr,
            params.weights.view_mut(),
            m.weights.view_mut(),
            v.weights.view_mut(),
            grads.weights.view(),
        );
        if let (Some(p), Some(mb), Some(vb), Some(g)) =
            (&mut params.biases, &mut m.biases, &mut v.biases, &grads.biases)
        {
            self.apply(lr, p.view_mut(), mb.view_mut(), vb.view_mut(), g.view());
        }

        if !params.is_finite() {
            return false;
        }
        self.m.unproject(&m, input_ids, target_ids);
        self.v.unproject(&v, input_ids, target_ids);
        self.t += 1;
        true
    }

    fn learning_rate(&self) -> f32 {
        self.alpha
    }
}
