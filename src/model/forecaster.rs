//! Recurrent risk forecaster over activity trends

use super::linalg::{sigmoid, Linear, Mlp};
use ndarray::{s, Array1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// LSTM cell. Gate rows are stacked input, forget, cell, output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmCell {
    input: Linear,
    recurrent: Linear,
}

impl LstmCell {
    fn new(input_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        let mut input = Linear::new(input_dim, 4 * hidden_dim, rng);
        // forget-gate bias of 1 keeps early state flowing
        input.bias.slice_mut(s![hidden_dim..2 * hidden_dim]).fill(1.0);
        Self {
            input,
            recurrent: Linear::new(hidden_dim, 4 * hidden_dim, rng),
        }
    }

    fn hidden_dim(&self) -> usize {
        self.recurrent.in_dim()
    }

    fn step(&self, x: &Array1<f32>, h: &Array1<f32>, c: &Array1<f32>) -> (Array1<f32>, Array1<f32>) {
        let hd = self.hidden_dim();
        let gates = self.input.forward(x.view()) + self.recurrent.forward(h.view());
        let i = gates.slice(s![0..hd]).mapv(sigmoid);
        let f = gates.slice(s![hd..2 * hd]).mapv(sigmoid);
        let g = gates.slice(s![2 * hd..3 * hd]).mapv(f32::tanh);
        let o = gates.slice(s![3 * hd..4 * hd]).mapv(sigmoid);
        let c_next = &f * c + &i * &g;
        let h_next = &o * &c_next.mapv(f32::tanh);
        (h_next, c_next)
    }

    fn is_consistent(&self) -> bool {
        let hd = self.hidden_dim();
        self.input.is_consistent()
            && self.recurrent.is_consistent()
            && self.input.out_dim() == 4 * hd
            && self.recurrent.out_dim() == 4 * hd
    }
}

/// Stacked LSTM over a scalar activity series, followed by a sigmoid MLP head.
///
/// Uses only the node's own history; no other node's scores enter the
/// computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalForecaster {
    cells: Vec<LstmCell>,
    head: Mlp,
}

impl TemporalForecaster {
    pub fn new(hidden_dim: usize, num_layers: usize, rng: &mut StdRng) -> Self {
        let hidden_dim = hidden_dim.max(1);
        let cells = (0..num_layers.max(1))
            .map(|layer| {
                let input_dim = if layer == 0 { 1 } else { hidden_dim };
                LstmCell::new(input_dim, hidden_dim, rng)
            })
            .collect();
        Self {
            cells,
            head: Mlp::new(hidden_dim, (hidden_dim / 2).max(1), 1, rng),
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.cells.first().map_or(0, LstmCell::hidden_dim)
    }

    pub fn num_layers(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        let hd = self.hidden_dim();
        !self.cells.is_empty()
            && self.cells.iter().all(LstmCell::is_consistent)
            && self.cells.iter().skip(1).all(|c| c.input.in_dim() == hd)
            && self.cells[0].input.in_dim() == 1
            && self.head.is_consistent()
            && self.head.in_dim() == hd
            && self.head.out_dim() == 1
    }

    /// Forecast risk `horizon` periods past the end of `trend`.
    ///
    /// The series is scaled by its largest magnitude, run through the LSTM,
    /// and then rolled forward one period at a time, feeding each prediction
    /// back in as the next observation. Returns `None` for an empty trend.
    pub fn forecast(&self, trend: &[f32], horizon: usize) -> Option<f32> {
        if trend.is_empty() {
            return None;
        }
        let clean: Vec<f32> = trend.iter().map(|v| if v.is_finite() { *v } else { 0.0 }).collect();
        let scale = clean.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let scale = if scale > 0.0 { scale } else { 1.0 };

        let hd = self.hidden_dim();
        let mut state: Vec<(Array1<f32>, Array1<f32>)> =
            self.cells.iter().map(|_| (Array1::zeros(hd), Array1::zeros(hd))).collect();

        let mut prediction = 0.0;
        for value in clean.iter().map(|v| v / scale) {
            prediction = self.advance(&mut state, value);
        }
        for _ in 1..horizon.max(1) {
            prediction = self.advance(&mut state, prediction);
        }
        Some(prediction)
    }

    fn advance(&self, state: &mut [(Array1<f32>, Array1<f32>)], value: f32) -> f32 {
        let mut x = Array1::from_elem(1, value);
        for (cell, (h, c)) in self.cells.iter().zip(state.iter_mut()) {
            let (h_next, c_next) = cell.step(&x, h, c);
            *h = h_next;
            *c = c_next;
            x = h.clone();
        }
        sigmoid(self.head.forward(x.view())[0])
    }
}
