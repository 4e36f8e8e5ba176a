//! Graph neural network inference
//!
//! `InferenceModel` is the seam the processor depends on. `PredictiveGnn` is
//! the bundled implementation: a message-passing encoder feeding risk and
//! relevance heads, plus an LSTM forecaster over activity trends. A new model
//! is a seeded, deterministic initialisation; trained weights are loaded from
//! a JSON checkpoint.

mod encoder;
mod forecaster;
mod heads;
pub mod linalg;

pub use encoder::{Aggregation, EncoderInput, GraphEncoder};
pub use forecaster::TemporalForecaster;
pub use heads::{RelevanceHead, RiskHead, RiskOutput};

use crate::graph::RiskLevel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Checkpoint format version written by `save`
const CHECKPOINT_VERSION: u32 = 1;

/// Errors from model construction, inference and checkpoints
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Architecture and initialisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding width fed to the encoder
    pub input_dim: usize,
    pub hidden_dim: usize,
    /// Message-passing layers
    pub num_layers: usize,
    pub aggregation: Aggregation,
    /// Neighbours drawn per node by `Aggregation::Sample`
    pub sample_size: usize,
    pub forecast_hidden: usize,
    pub forecast_layers: usize,
    /// Seed for weight initialisation and neighbour sampling
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_dim: 384,
            hidden_dim: 128,
            num_layers: 3,
            aggregation: Aggregation::Mean,
            sample_size: 10,
            forecast_hidden: 16,
            forecast_layers: 2,
            seed: 7,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 || self.forecast_hidden == 0 {
            return Err(ModelError::InvalidConfig("dimensions must be non-zero".into()));
        }
        if self.forecast_layers == 0 {
            return Err(ModelError::InvalidConfig("forecast_layers must be at least 1".into()));
        }
        if self.aggregation == Aggregation::Sample && self.sample_size == 0 {
            return Err(ModelError::InvalidConfig("sample_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Per-node output of one inference pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePrediction {
    /// Raw regression output in [0, 1]
    pub risk_score: f32,
    /// Level chosen by the classifier (cross-check only)
    pub risk_class: RiskLevel,
    pub class_probabilities: [f32; 4],
    pub relevance_score: f32,
}

/// A model the processor can run.
///
/// Implementations must be pure: identical input gives bit-identical output.
pub trait InferenceModel: Send + Sync {
    /// Embedding width the model expects
    fn input_dim(&self) -> usize;

    /// Score every node of `input`, in input order
    fn predict(&self, input: &EncoderInput) -> ModelResult<Vec<NodePrediction>>;

    /// Forecast risk `horizon` periods ahead from one node's own activity
    /// trend. `None` when the trend is empty.
    fn forecast(&self, trend: &[f32], horizon: usize) -> Option<f32>;

    /// Short name for logs
    fn name(&self) -> &str {
        "model"
    }
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    version: u32,
    model: &'a PredictiveGnn,
}

#[derive(Deserialize)]
struct Checkpoint {
    version: u32,
    model: PredictiveGnn,
}

/// Encoder plus risk, relevance and forecast heads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveGnn {
    config: ModelConfig,
    encoder: GraphEncoder,
    risk: RiskHead,
    relevance: RelevanceHead,
    forecaster: TemporalForecaster,
}

impl PredictiveGnn {
    /// Seeded initialisation. The same config always yields the same weights.
    pub fn new(config: ModelConfig) -> ModelResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let encoder = GraphEncoder::new(
            config.input_dim,
            config.hidden_dim,
            config.num_layers,
            config.aggregation,
            config.sample_size,
            &mut rng,
            config.seed,
        );
        let risk = RiskHead::new(config.hidden_dim, &mut rng);
        let relevance = RelevanceHead::new(config.hidden_dim, &mut rng);
        let forecaster = TemporalForecaster::new(config.forecast_hidden, config.forecast_layers, &mut rng);
        Ok(Self {
            config,
            encoder,
            risk,
            relevance,
            forecaster,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn encoder(&self) -> &GraphEncoder {
        &self.encoder
    }

    /// Switch the aggregation policy, keeping all weights
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.config.aggregation = aggregation;
        self.encoder.set_aggregation(aggregation);
        self
    }

    /// Write all weights and the config as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> ModelResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(&CheckpointRef {
            version: CHECKPOINT_VERSION,
            model: self,
        })?;
        std::fs::write(path.as_ref(), json)?;
        tracing::info!(path = %path.as_ref().display(), "saved model checkpoint");
        Ok(())
    }

    /// Read a checkpoint written by `save`, checking every weight shape
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let checkpoint: Checkpoint = serde_json::from_str(&text)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(ModelError::UnsupportedVersion(checkpoint.version));
        }
        let model = checkpoint.model;
        model.check_shapes()?;
        tracing::info!(
            path = %path.as_ref().display(),
            hidden_dim = model.config.hidden_dim,
            layers = model.config.num_layers,
            "loaded model checkpoint"
        );
        Ok(model)
    }

    fn check_shapes(&self) -> ModelResult<()> {
        self.config.validate()?;
        let c = &self.config;
        let checks = [
            ("encoder input width", c.input_dim, self.encoder.input_dim()),
            ("encoder hidden width", c.hidden_dim, self.encoder.hidden_dim()),
            ("encoder layers", c.num_layers, self.encoder.num_layers()),
            ("forecaster hidden width", c.forecast_hidden, self.forecaster.hidden_dim()),
            ("forecaster layers", c.forecast_layers, self.forecaster.num_layers()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(ModelError::ShapeMismatch { what, expected, actual });
            }
        }
        let consistent = self.encoder.is_consistent()
            && self.risk.is_consistent(c.hidden_dim)
            && self.relevance.is_consistent(c.hidden_dim)
            && self.forecaster.is_consistent();
        if !consistent {
            return Err(ModelError::InvalidConfig("checkpoint weights have inconsistent shapes".into()));
        }
        Ok(())
    }
}

impl InferenceModel for PredictiveGnn {
    fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    fn predict(&self, input: &EncoderInput) -> ModelResult<Vec<NodePrediction>> {
        let hidden = self.encoder.forward(input)?;
        Ok(hidden
            .rows()
            .into_iter()
            .map(|row| {
                let risk = self.risk.predict(row);
                NodePrediction {
                    risk_score: risk.score,
                    risk_class: risk.class_level,
                    class_probabilities: risk.class_probabilities,
                    relevance_score: self.relevance.predict(row),
                }
            })
            .collect())
    }

    fn forecast(&self, trend: &[f32], horizon: usize) -> Option<f32> {
        self.forecaster.forecast(trend, horizon)
    }

    fn name(&self) -> &str {
        "predictive-gnn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_config() -> ModelConfig {
        ModelConfig {
            input_dim: 3,
            hidden_dim: 8,
            num_layers: 2,
            forecast_hidden: 4,
            ..ModelConfig::default()
        }
    }

    fn input() -> EncoderInput {
        EncoderInput::new(
            array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            vec![vec![1], vec![0, 2], vec![1]],
        )
        .unwrap()
    }

    #[test]
    fn same_seed_same_model() {
        let a = PredictiveGnn::new(small_config()).unwrap();
        let b = PredictiveGnn::new(small_config()).unwrap();
        assert_eq!(a, b);
        let c = PredictiveGnn::new(ModelConfig { seed: 99, ..small_config() }).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn predictions_are_bounded() {
        let model = PredictiveGnn::new(small_config()).unwrap();
        let out = model.predict(&input()).unwrap();
        assert_eq!(out.len(), 3);
        for p in out {
            assert!((0.0..=1.0).contains(&p.risk_score));
            assert!((0.0..=1.0).contains(&p.relevance_score));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = PredictiveGnn::new(ModelConfig { hidden_dim: 0, ..small_config() }).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }

    #[test]
    fn checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("gnn.json");
        let model = PredictiveGnn::new(small_config())
            .unwrap()
            .with_aggregation(Aggregation::Attention);
        model.save(&path).unwrap();

        let loaded = PredictiveGnn::load(&path).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.config().aggregation, Aggregation::Attention);
        assert_eq!(loaded.predict(&input()).unwrap(), model.predict(&input()).unwrap());
    }

    #[test]
    fn checkpoint_with_wrong_shapes_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gnn.json");
        let model = PredictiveGnn::new(small_config()).unwrap();
        model.save(&path).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["model"]["config"]["input_dim"] = serde_json::json!(5);
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(
            PredictiveGnn::load(&path),
            Err(ModelError::ShapeMismatch { what: "encoder input width", .. })
        ));
    }

    #[test]
    fn checkpoint_with_wrong_forecaster_depth_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gnn.json");
        PredictiveGnn::new(small_config()).unwrap().save(&path).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        let mut deeper = saved.clone();
        deeper["model"]["config"]["forecast_layers"] = serde_json::json!(3);
        std::fs::write(&path, deeper.to_string()).unwrap();
        assert!(matches!(
            PredictiveGnn::load(&path),
            Err(ModelError::ShapeMismatch { what: "forecaster layers", expected: 3, actual: 2 })
        ));

        // dropping a cell from the weights trips the same check
        let mut shallower = saved;
        if let Some(cells) = shallower["model"]["forecaster"]["cells"].as_array_mut() {
            cells.pop();
        }
        std::fs::write(&path, shallower.to_string()).unwrap();
        assert!(matches!(
            PredictiveGnn::load(&path),
            Err(ModelError::ShapeMismatch { what: "forecaster layers", expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gnn.json");
        PredictiveGnn::new(small_config()).unwrap().save(&path).unwrap();
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["version"] = serde_json::json!(42);
        std::fs::write(&path, json.to_string()).unwrap();
        assert!(matches!(PredictiveGnn::load(&path), Err(ModelError::UnsupportedVersion(42))));
    }
}
