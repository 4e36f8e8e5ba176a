//! Risk and relevance prediction heads

use super::linalg::{argmax, sigmoid, softmax, Mlp};
use crate::graph::RiskLevel;
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Output of the risk head for one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskOutput {
    /// Sigmoid-bounded regression output
    pub score: f32,
    /// Softmax over the four risk levels
    pub class_probabilities: [f32; 4],
    /// Arg-max of the classifier
    pub class_level: RiskLevel,
}

/// Scalar regression plus 4-way classification over a hidden vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskHead {
    regressor: Mlp,
    classifier: Mlp,
}

impl RiskHead {
    pub fn new(hidden_dim: usize, rng: &mut StdRng) -> Self {
        let mid = (hidden_dim / 2).max(1);
        Self {
            regressor: Mlp::new(hidden_dim, mid, 1, rng),
            classifier: Mlp::new(hidden_dim, mid, RiskLevel::ALL.len(), rng),
        }
    }

    pub fn predict(&self, hidden: ArrayView1<'_, f32>) -> RiskOutput {
        let score = sigmoid(self.regressor.forward(hidden)[0]);
        let logits = self.classifier.forward(hidden).to_vec();
        let probs = softmax(&logits);
        let mut class_probabilities = [0.0; 4];
        for (slot, p) in class_probabilities.iter_mut().zip(&probs) {
            *slot = *p;
        }
        let class_level = RiskLevel::from_class_index(argmax(&class_probabilities)).unwrap_or_default();
        RiskOutput {
            score,
            class_probabilities,
            class_level,
        }
    }

    pub(crate) fn is_consistent(&self, hidden_dim: usize) -> bool {
        self.regressor.is_consistent()
            && self.classifier.is_consistent()
            && self.regressor.in_dim() == hidden_dim
            && self.classifier.in_dim() == hidden_dim
            && self.regressor.out_dim() == 1
            && self.classifier.out_dim() == RiskLevel::ALL.len()
    }
}

/// Scalar relevance regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceHead {
    regressor: Mlp,
}

impl RelevanceHead {
    pub fn new(hidden_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            regressor: Mlp::new(hidden_dim, (hidden_dim / 2).max(1), 1, rng),
        }
    }

    pub fn predict(&self, hidden: ArrayView1<'_, f32>) -> f32 {
        sigmoid(self.regressor.forward(hidden)[0])
    }

    pub(crate) fn is_consistent(&self, hidden_dim: usize) -> bool {
        self.regressor.is_consistent() && self.regressor.in_dim() == hidden_dim && self.regressor.out_dim() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::SeedableRng;

    #[test]
    fn risk_head_outputs_are_bounded() {
        let head = RiskHead::new(8, &mut StdRng::seed_from_u64(1));
        for scale in [-100.0f32, 0.0, 0.3, 100.0] {
            let h = Array1::from_elem(8, scale);
            let out = head.predict(h.view());
            assert!((0.0..=1.0).contains(&out.score));
            assert!((out.class_probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            let best = out
                .class_probabilities
                .iter()
                .cloned()
                .fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(out.class_probabilities[out.class_level as usize], best);
        }
    }

    #[test]
    fn relevance_head_is_bounded() {
        let head = RelevanceHead::new(6, &mut StdRng::seed_from_u64(2));
        let r = head.predict(Array1::from_elem(6, 3.0).view());
        assert!((0.0..=1.0).contains(&r));
        assert!(head.is_consistent(6));
        assert!(!head.is_consistent(7));
    }
}
