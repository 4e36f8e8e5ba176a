//! Dense layers and activations over ndarray

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fully connected layer: `y = W x + b`, with `W` stored out × in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    /// Xavier-uniform weights, zero bias
    pub fn new(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim).max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-limit..=limit));
        Self {
            weight,
            bias: Array1::zeros(out_dim),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }

    /// Apply to every row of `x` (rows are samples)
    pub fn forward_rows(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.bias.len() == self.out_dim()
    }
}

/// Two-layer perceptron: `out(relu(hidden(x)))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub hidden: Linear,
    pub output: Linear,
}

impl Mlp {
    pub fn new(in_dim: usize, hidden_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            hidden: Linear::new(in_dim, hidden_dim, rng),
            output: Linear::new(hidden_dim, out_dim, rng),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.hidden.in_dim()
    }

    pub fn out_dim(&self) -> usize {
        self.output.out_dim()
    }

    pub fn forward(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        let h = relu(self.hidden.forward(x));
        self.output.forward(h.view())
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.hidden.is_consistent()
            && self.output.is_consistent()
            && self.hidden.out_dim() == self.output.in_dim()
    }
}

pub fn relu(mut x: Array1<f32>) -> Array1<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn leaky_relu(x: f32, slope: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        slope * x
    }
}

/// Numerically stable softmax. Empty input gives empty output.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; first wins on ties
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
