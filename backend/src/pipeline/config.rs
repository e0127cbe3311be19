use serde::{Deserialize, Serialize};
use shared::ModelId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_CONFIG_PATH: &str = "CREDIT_RISK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub version: f32,
    pub server: ServerConfig,
    pub artifact: ArtifactConfig,
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub explain: ExplainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub path: PathBuf,
    /// Train from the sample dataset when no artifact exists at `path`.
    pub train_if_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSON-lines file of labelled applicants; synthesised when absent.
    pub path: PathBuf,
    pub synthetic_rows: usize,
    pub seed: u64,
    pub test_fraction: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub logistic: LogisticParams,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub mlp: MlpParams,
    /// Per-model decision cutoff on P(good payer); 0.5 when absent.
    pub thresholds: BTreeMap<ModelId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Candidate features per split; `sqrt(d)` when absent.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    pub hidden: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub timeout_ms: u64,
    /// Rows kept from the training split as the SHAP background.
    pub background_size: usize,
    /// Test rows explained for the summary plot.
    pub summary_rows: usize,
    /// Permutations drawn by the sampling explainer (rounded up to even).
    pub permutations: usize,
    pub max_display: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("artifacts/credit_models.json"),
            train_if_missing: true,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/syntetic_sample.jsonl"),
            synthetic_rows: 1000,
            seed: 42,
            test_fraction: 0.2,
        }
    }
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            epochs: 400,
            learning_rate: 0.1,
            l2: 1e-3,
        }
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_rounds: 120,
            learning_rate: 0.1,
            max_depth: 3,
            min_child_weight: 1.0,
            lambda: 1.0,
        }
    }
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden: 16,
            epochs: 150,
            batch_size: 32,
            learning_rate: 0.05,
            l2: 1e-4,
        }
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            background_size: 50,
            summary_rows: 60,
            permutations: 12,
            max_display: 10,
        }
    }
}

impl TrainingConfig {
    pub fn threshold(&self, model: ModelId) -> f64 {
        self.thresholds.get(&model).copied().unwrap_or(0.5)
    }
}

impl ServiceConfig {
    /// Reads the YAML file named by `CREDIT_RISK_CONFIG` (default
    /// `config/service.yaml`); a missing file yields the built-in defaults.
    /// `HOST` and `PORT` override the server section.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_path(&path)?
        } else {
            log::warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        if let Ok(host) = std::env::var("HOST") {
            config.server.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Small, fast settings used by tests and smoke runs.
    pub fn tiny() -> Self {
        let mut config = Self::default();
        config.dataset.synthetic_rows = 300;
        config.training.logistic.epochs = 150;
        config.training.forest.n_trees = 8;
        config.training.forest.max_depth = 5;
        config.training.boosting.n_rounds = 15;
        config.training.mlp.epochs = 25;
        config.training.mlp.hidden = 8;
        config.explain.background_size = 12;
        config.explain.summary_rows = 10;
        config.explain.permutations = 4;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ServiceConfig::from_yaml(
            r#"
version: 1.0
server:
  port: 8080
training:
  forest:
    n_trees: 10
  thresholds:
    xg-boost: 0.6
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.training.forest.n_trees, 10);
        assert_eq!(config.training.forest.max_depth, 8);
        assert_eq!(config.training.threshold(ModelId::XgBoost), 0.6);
        assert_eq!(config.training.threshold(ModelId::Mlp), 0.5);
        assert_eq!(config.explain.max_display, 10);
    }

    #[test]
    fn unknown_model_in_thresholds_is_rejected() {
        let err = ServiceConfig::from_yaml("training:\n  thresholds:\n    svm: 0.5\n");
        assert!(matches!(err, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped =
            ServiceConfig::from_yaml(include_str!("../../../config/service.yaml")).unwrap();
        let defaults = ServiceConfig::default();
        assert_eq!(shipped.bind_address(), defaults.bind_address());
        assert_eq!(shipped.training.forest.n_trees, defaults.training.forest.n_trees);
        assert_eq!(shipped.explain.timeout_ms, defaults.explain.timeout_ms);
        for id in ModelId::ALL {
            assert_eq!(shipped.training.threshold(id), 0.5);
        }
    }
}
