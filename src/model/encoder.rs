//! Message-passing graph encoder

use super::linalg::{leaky_relu, softmax, Linear};
use super::{ModelError, ModelResult};
use crate::graph::TemporalGraph;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BATCH_NORM_EPS: f32 = 1e-5;
const ATTENTION_SLOPE: f32 = 0.2;

/// How a node combines its neighbours' representations into one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Unweighted average of all neighbours
    #[default]
    #[serde(alias = "gcn")]
    Mean,
    /// Learned compatibility scores, softmax-normalized over the neighbourhood
    #[serde(alias = "gat")]
    Attention,
    /// Average of a fixed-size random subsample of neighbours
    #[serde(alias = "sage", alias = "graphsage")]
    Sample,
}

impl std::str::FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "gcn" => Ok(Aggregation::Mean),
            "attention" | "gat" => Ok(Aggregation::Attention),
            "sample" | "sage" | "graphsage" => Ok(Aggregation::Sample),
            other => Err(format!("unknown aggregation: {}", other)),
        }
    }
}

/// Encoder input: one feature row per node plus neighbour index lists.
///
/// Row `i` of `features` and entry `i` of `neighbors` describe the same node.
#[derive(Debug, Clone)]
pub struct EncoderInput {
    features: Array2<f32>,
    neighbors: Vec<Vec<usize>>,
}

impl EncoderInput {
    pub fn new(features: Array2<f32>, neighbors: Vec<Vec<usize>>) -> ModelResult<Self> {
        let n = features.nrows();
        if neighbors.len() != n {
            return Err(ModelError::ShapeMismatch {
                what: "neighbour lists",
                expected: n,
                actual: neighbors.len(),
            });
        }
        if let Some(&bad) = neighbors.iter().flatten().find(|&&j| j >= n) {
            return Err(ModelError::ShapeMismatch {
                what: "neighbour index",
                expected: n,
                actual: bad,
            });
        }
        Ok(Self { features, neighbors })
    }

    /// Build from a graph, in the graph's node order.
    ///
    /// `embeddings[i]` must belong to the i-th node of `graph.nodes()`.
    /// Neighbourhoods are distinct neighbours over both edge directions,
    /// excluding the node itself.
    pub fn from_graph(graph: &TemporalGraph, embeddings: &[Vec<f32>]) -> ModelResult<Self> {
        let n = graph.node_count();
        if embeddings.len() != n {
            return Err(ModelError::ShapeMismatch {
                what: "embedding rows",
                expected: n,
                actual: embeddings.len(),
            });
        }
        let dim = embeddings.first().map_or(0, Vec::len);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
            return Err(ModelError::ShapeMismatch {
                what: "embedding width",
                expected: dim,
                actual: bad.len(),
            });
        }

        let index: HashMap<_, usize> = graph.nodes().enumerate().map(|(i, n)| (&n.id, i)).collect();
        let neighbors: Vec<Vec<usize>> = graph
            .nodes()
            .map(|node| {
                graph
                    .distinct_neighbors(&node.id)
                    .map(|ids| {
                        ids.into_iter()
                            .filter_map(|id| index.get(id).copied())
                            .collect::<Vec<usize>>()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let flat: Vec<f32> = embeddings.iter().flatten().copied().collect();
        let features = Array2::from_shape_vec((n, dim), flat).map_err(|_| ModelError::ShapeMismatch {
            what: "embedding matrix",
            expected: n * dim,
            actual: embeddings.iter().map(Vec::len).sum(),
        })?;
        Self::new(features, neighbors)
    }

    pub fn node_count(&self) -> usize {
        self.features.nrows()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }
}

/// One message-passing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderLayer {
    self_transform: Linear,
    neighbor_transform: Linear,
    attention_self: Array1<f32>,
    attention_neighbor: Array1<f32>,
    gamma: Array1<f32>,
    beta: Array1<f32>,
}

impl EncoderLayer {
    fn new(hidden_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (hidden_dim + 1) as f32).sqrt();
        Self {
            self_transform: Linear::new(hidden_dim, hidden_dim, rng),
            neighbor_transform: Linear::new(hidden_dim, hidden_dim, rng),
            attention_self: Array1::from_shape_fn(hidden_dim, |_| rng.gen_range(-limit..=limit)),
            attention_neighbor: Array1::from_shape_fn(hidden_dim, |_| rng.gen_range(-limit..=limit)),
            gamma: Array1::ones(hidden_dim),
            beta: Array1::zeros(hidden_dim),
        }
    }

    fn is_consistent(&self, hidden_dim: usize) -> bool {
        [&self.self_transform, &self.neighbor_transform]
            .iter()
            .all(|l| l.is_consistent() && l.in_dim() == hidden_dim && l.out_dim() == hidden_dim)
            && [&self.attention_self, &self.attention_neighbor, &self.gamma, &self.beta]
                .iter()
                .all(|v| v.len() == hidden_dim)
    }

    fn attention_message(&self, h: &Array2<f32>, v: usize, neighbors: &[usize]) -> Array1<f32> {
        let own = self.attention_self.dot(&h.row(v));
        let scores: Vec<f32> = neighbors
            .iter()
            .map(|&u| leaky_relu(own + self.attention_neighbor.dot(&h.row(u)), ATTENTION_SLOPE))
            .collect();
        let weights = softmax(&scores);
        let mut message = Array1::zeros(h.ncols());
        for (&u, w) in neighbors.iter().zip(weights) {
            message.scaled_add(w, &h.row(u));
        }
        message
    }

    /// Rescale every column to zero mean, unit variance across nodes, then
    /// apply the learned scale and shift
    fn batch_norm(&self, z: &mut Array2<f32>) {
        let Some(mean) = z.mean_axis(Axis(0)) else {
            return;
        };
        let var = z.var_axis(Axis(0), 0.0);
        let inv_std = var.mapv(|v| 1.0 / (v + BATCH_NORM_EPS).sqrt());
        for mut row in z.rows_mut() {
            row -= &mean;
            row *= &inv_std;
            row *= &self.gamma;
            row += &self.beta;
        }
    }
}

/// Multi-layer graph encoder.
///
/// Input features are projected to the hidden width, then each layer runs
/// aggregate → update → batch norm → ReLU → residual add. Pure function of
/// (topology, features, parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEncoder {
    input_proj: Linear,
    layers: Vec<EncoderLayer>,
    aggregation: Aggregation,
    sample_size: usize,
    seed: u64,
}

impl GraphEncoder {
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        aggregation: Aggregation,
        sample_size: usize,
        rng: &mut StdRng,
        seed: u64,
    ) -> Self {
        let input_proj = Linear::new(input_dim, hidden_dim, rng);
        let layers = (0..num_layers).map(|_| EncoderLayer::new(hidden_dim, rng)).collect();
        Self {
            input_proj,
            layers,
            aggregation,
            sample_size: sample_size.max(1),
            seed,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_proj.in_dim()
    }

    pub fn hidden_dim(&self) -> usize {
        self.input_proj.out_dim()
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Switch aggregation policy without touching learned weights
    pub fn set_aggregation(&mut self, aggregation: Aggregation) {
        self.aggregation = aggregation;
    }

    pub(crate) fn is_consistent(&self) -> bool {
        let hidden = self.hidden_dim();
        self.input_proj.is_consistent() && self.layers.iter().all(|l| l.is_consistent(hidden))
    }

    /// Final hidden representation, one row per input node
    pub fn forward(&self, input: &EncoderInput) -> ModelResult<Array2<f32>> {
        if input.feature_dim() != self.input_dim() && input.node_count() > 0 {
            return Err(ModelError::ShapeMismatch {
                what: "input features",
                expected: self.input_dim(),
                actual: input.feature_dim(),
            });
        }
        let n = input.node_count();
        if n == 0 {
            return Ok(Array2::zeros((0, self.hidden_dim())));
        }

        let mut h = self.input_proj.forward_rows(input.features());
        for (depth, layer) in self.layers.iter().enumerate() {
            let rows: Vec<Array1<f32>> = (0..n)
                .into_par_iter()
                .map(|v| {
                    let message = self.aggregate(layer, depth, &h, v, input.neighbors(v));
                    layer.self_transform.forward(h.row(v)) + layer.neighbor_transform.forward(message.view())
                })
                .collect();

            let mut z = Array2::zeros((n, self.hidden_dim()));
            for (mut dst, src) in z.rows_mut().into_iter().zip(&rows) {
                dst.assign(src);
            }
            layer.batch_norm(&mut z);
            z.mapv_inplace(|x| x.max(0.0));
            h += &z;
        }
        Ok(h)
    }

    fn aggregate(
        &self,
        layer: &EncoderLayer,
        depth: usize,
        h: &Array2<f32>,
        v: usize,
        neighbors: &[usize],
    ) -> Array1<f32> {
        if neighbors.is_empty() {
            return Array1::zeros(h.ncols());
        }
        match self.aggregation {
            Aggregation::Mean => mean_of(h, neighbors),
            Aggregation::Attention => layer.attention_message(h, v, neighbors),
            Aggregation::Sample => {
                if neighbors.len() <= self.sample_size {
                    return mean_of(h, neighbors);
                }
                let mut rng = StdRng::seed_from_u64(self.sample_seed(depth, v));
                let mut picked = rand::seq::index::sample(&mut rng, neighbors.len(), self.sample_size).into_vec();
                picked.sort_unstable();
                let chosen: Vec<usize> = picked.into_iter().map(|i| neighbors[i]).collect();
                mean_of(h, &chosen)
            }
        }
    }

    fn sample_seed(&self, depth: usize, node: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((depth as u64) << 32)
            .wrapping_add(node as u64)
    }
}

fn mean_of(h: &Array2<f32>, rows: &[usize]) -> Array1<f32> {
    let mut sum = Array1::zeros(h.ncols());
    for &u in rows {
        sum += &h.row(u);
    }
    sum / rows.len() as f32
}
