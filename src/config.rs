use crate::features::{ImputeStrategy, DEFAULT_INGREDIENT_VOCABULARY};
use crate::model::metrics::DEFAULT_RESPONSE_TIME_THRESHOLD;
use crate::model::outliers::DEFAULT_IQR_MULTIPLIER;
use crate::model::split::{DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use crate::model::{SearchConfig, SearchPreset};
use crate::nutrition::ScoringPreset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "RECIPE_REC_";

/// Runtime settings read from `RECIPE_REC_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Recipe dataset in the RAW_recipes.csv layout
    #[serde(default = "default_recipes_csv")]
    pub recipes_csv: PathBuf,

    /// Where trained models are written and read
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Maximum CSV rows to read; 0 reads everything
    #[serde(default = "default_csv_limit")]
    pub csv_limit: usize,

    #[serde(default)]
    pub search_preset: SearchPreset,

    /// Search worker threads; 0 uses all cores
    #[serde(default)]
    pub n_jobs: usize,

    #[serde(default)]
    pub time_budget_secs: Option<f64>,

    #[serde(default = "default_response_time_threshold")]
    pub response_time_threshold: f64,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,

    #[serde(default)]
    pub impute: ImputeStrategy,

    #[serde(default)]
    pub scoring_preset: ScoringPreset,
}

fn default_recipes_csv() -> PathBuf {
    PathBuf::from("RAW_recipes.csv")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("recipe_recommender.bin")
}

fn default_csv_limit() -> usize {
    5000
}

fn default_response_time_threshold() -> f64 {
    DEFAULT_RESPONSE_TIME_THRESHOLD
}

fn default_test_fraction() -> f64 {
    DEFAULT_TEST_FRACTION
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_iqr_multiplier() -> f64 {
    DEFAULT_IQR_MULTIPLIER
}

impl Settings {
    /// Loads `.env` if present, then reads the prefixed environment.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenv::dotenv().ok();
        envy::prefixed(ENV_PREFIX).from_env::<Settings>()
    }

    pub fn csv_row_limit(&self) -> Option<usize> {
        (self.csv_limit > 0).then_some(self.csv_limit)
    }

    /// Training configuration for `preset`, with seeds, parallelism and
    /// thresholds taken from these settings.
    pub fn training_config(&self, preset: SearchPreset) -> TrainingConfig {
        let mut config = TrainingConfig::from_preset(preset);
        config.search.seed = self.seed;
        config.search.solver.seed = self.seed;
        config.search.n_jobs = self.n_jobs;
        config.search.time_budget_secs = self.time_budget_secs;
        config.impute = self.impute;
        config.test_fraction = self.test_fraction;
        config.split_seed = self.seed;
        config.iqr_multiplier = self.iqr_multiplier;
        config.response_time_threshold = self.response_time_threshold;
        config
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recipes_csv: default_recipes_csv(),
            model_path: default_model_path(),
            csv_limit: default_csv_limit(),
            search_preset: SearchPreset::default(),
            n_jobs: 0,
            time_budget_secs: None,
            response_time_threshold: default_response_time_threshold(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            iqr_multiplier: default_iqr_multiplier(),
            impute: ImputeStrategy::default(),
            scoring_preset: ScoringPreset::default(),
        }
    }
}

/// Everything a training run needs besides the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub search: SearchConfig,
    pub ingredient_vocabulary: Vec<String>,
    pub impute: ImputeStrategy,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub iqr_multiplier: f64,
    pub response_time_threshold: f64,
}

impl TrainingConfig {
    pub fn from_preset(preset: SearchPreset) -> Self {
        Self {
            search: SearchConfig::from_preset(preset),
            ingredient_vocabulary: DEFAULT_INGREDIENT_VOCABULARY.iter().map(|s| s.to_string()).collect(),
            impute: ImputeStrategy::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: DEFAULT_SEED,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            response_time_threshold: DEFAULT_RESPONSE_TIME_THRESHOLD,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::from_preset(SearchPreset::default())
    }
}
