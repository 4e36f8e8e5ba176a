//! Settings loaded from YAML
//!
//! Lookup order: an explicit path, then `$RISKGRAPH_CONFIG`, then
//! `<config_dir>/riskgraph/config.yaml`, then built-in defaults. Every field
//! has a default, so a file only needs the values it changes.

use crate::embedding::DEFAULT_DIMENSION;
use crate::model::ModelConfig;
use crate::processor::ProcessorConfig;
use crate::query::CriticalNodeRanker;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a settings file
pub const CONFIG_ENV: &str = "RISKGRAPH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dimension: usize,
    /// Backend name: "hashing", or a fastembed model when built with the
    /// `embeddings` feature
    pub model_name: String,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            model_name: "hashing".to_string(),
            batch_size: crate::embedding::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub max_rejection_fraction: f32,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_rejection_fraction: crate::adapter::DEFAULT_MAX_REJECTION_FRACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationSettings {
    pub max_depth: usize,
    pub min_risk: f32,
    /// Periods ahead for stored forecasts
    pub forecast_horizon: usize,
    pub anomaly_gap: f32,
}

impl Default for InvestigationSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_risk: 0.5,
            forecast_horizon: 3,
            anomaly_gap: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// SQLite file for the scored snapshot
    pub db_path: Option<PathBuf>,
    /// JSON checkpoint; a seeded model is built when absent
    pub model_path: Option<PathBuf>,
}

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gnn: ModelConfig,
    pub embedding: EmbeddingSettings,
    pub ranking: CriticalNodeRanker,
    pub ingestion: IngestionSettings,
    pub investigation: InvestigationSettings,
    pub data: DataSettings,
}

impl Settings {
    /// Resolve and load settings. Defaults when no file is found; an
    /// explicit or `$RISKGRAPH_CONFIG` path must exist.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = default_path().filter(|p| p.is_file()) {
            return Self::from_file(&path);
        }
        tracing::debug!("no settings file, using defaults");
        let settings = Self::default();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let settings: Settings = if text.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.gnn.validate().map_err(|e| invalid("gnn", e.to_string()))?;
        if self.embedding.dimension != self.gnn.input_dim {
            return Err(invalid(
                "embedding.dimension",
                format!("{} does not match gnn.input_dim {}", self.embedding.dimension, self.gnn.input_dim),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be at least 1".into()));
        }
        let r = &self.ranking;
        if !(r.risk_weight >= 0.0 && r.relevance_weight >= 0.0) {
            return Err(invalid("ranking", "weights must be non-negative".into()));
        }
        unit("ranking.critical_threshold", r.critical_threshold)?;
        unit("ingestion.max_rejection_fraction", self.ingestion.max_rejection_fraction)?;
        unit("investigation.min_risk", self.investigation.min_risk)?;
        unit("investigation.anomaly_gap", self.investigation.anomaly_gap)?;
        Ok(())
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            forecast_horizon: self.investigation.forecast_horizon,
            anomaly_gap: self.investigation.anomaly_gap,
            ranker: self.ranking,
        }
    }
}

/// `<config_dir>/riskgraph/config.yaml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("riskgraph").join("config.yaml"))
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn unit(field: &'static str, value: f32) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("{} is outside [0, 1]", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Aggregation;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.gnn.hidden_dim, 128);
        assert_eq!(s.ranking.critical_threshold, 0.75);
        assert_eq!(s.ingestion.max_rejection_fraction, 0.25);
        assert_eq!(s.investigation.max_depth, 3);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let s = Settings::from_yaml(
            "gnn:\n  aggregation: gat\n  num_layers: 2\nranking:\n  critical_threshold: 0.8\n",
        )
        .unwrap();
        assert_eq!(s.gnn.aggregation, Aggregation::Attention);
        assert_eq!(s.gnn.num_layers, 2);
        assert_eq!(s.gnn.hidden_dim, 128);
        assert_eq!(s.ranking.critical_threshold, 0.8);
        assert_eq!(s.ranking.risk_weight, 0.6);
    }

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Settings::from_yaml("ranking:\n  critical_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ranking.critical_threshold", .. }));

        let err = Settings::from_yaml("ranking:\n  risk_weight: -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ranking", .. }));

        let err = Settings::from_yaml("embedding:\n  dimension: 64\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "embedding.dimension", .. }));

        let err = Settings::from_yaml("gnn: not-a-map\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riskgraph.yaml");
        std::fs::write(
            &path,
            "gnn:\n  input_dim: 64\nembedding:\n  dimension: 64\ninvestigation:\n  min_risk: 0.7\n",
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.gnn.input_dim, 64);
        assert_eq!(s.investigation.min_risk, 0.7);
        assert_eq!(s.processor_config().forecast_horizon, 3);

        let missing = dir.path().join("nope.yaml");
        assert!(matches!(Settings::load(Some(&missing)), Err(ConfigError::Io { .. })));
    }
}
