use config::ConfigError;
use data_ingestion::config::{CONFIG_PATH, load_section};
use feature_processing::fundamentals::REFERENCE_PE;
use feature_processing::{DEFAULT_HORIZON, FillPolicy, HypeThresholds, WARM_UP_ROWS};
use serde::Deserialize;

/// Random-forest settings for both bagged models.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaggingConfig {
    pub n_trees: usize,
    pub seed: u64,
    /// Unlimited when absent.
    pub max_depth: Option<u16>,
}

impl Default for BaggingConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            seed: 42,
            max_depth: None,
        }
    }
}

/// Gradient-boosting settings for both boosted models.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows drawn per round.
    pub subsample: f64,
    /// Fraction of features drawn per tree.
    pub colsample: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub min_child_weight: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            rounds: 300,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.8,
            colsample: 0.8,
            lambda: 1.0,
            min_child_weight: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub bagging: BaggingConfig,
    pub boosting: BoostingConfig,
    /// Labelled tables shorter than this are rejected.
    pub min_training_rows: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            bagging: BaggingConfig::default(),
            boosting: BoostingConfig::default(),
            min_training_rows: WARM_UP_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub horizon: usize,
    pub fill_policy: FillPolicy,
    pub reference_pe: f64,
    pub hype: HypeThresholds,
    pub ensemble: EnsembleConfig,
    pub bind_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            fill_policy: FillPolicy::Filled,
            reference_pe: REFERENCE_PE,
            hype: HypeThresholds::default(),
            ensemble: EnsembleConfig::default(),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_section(CONFIG_PATH, "pipeline")
    }
}
