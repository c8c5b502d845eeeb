use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub forest: ForestConfig,
    #[serde(default)]
    pub boosting: BoostingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default)]
    pub use_semantic_model: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            random_state: default_random_state(),
            validation_split: default_validation_split(),
            use_semantic_model: false,
        }
    }
}

/// Hyperparameters of the bagging ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    #[serde(default = "default_forest_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_forest_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_balanced_class_weight")]
    pub balanced_class_weight: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_forest_estimators(),
            max_depth: default_forest_depth(),
            min_samples_split: default_min_samples_split(),
            balanced_class_weight: default_balanced_class_weight(),
        }
    }
}

/// Hyperparameters of the boosting ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    #[serde(default = "default_boosting_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_boosting_depth")]
    pub max_depth: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_boosting_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_boosting_depth(),
        }
    }
}

/// Uncertainty and explanation settings for single predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_margin_threshold")]
    pub margin_threshold: f64,
    #[serde(default = "default_top_features")]
    pub top_features: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            margin_threshold: default_margin_threshold(),
            top_features: default_top_features(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_retrain_threshold")]
    pub retrain_threshold: usize,
    #[serde(default = "default_max_per_account")]
    pub max_per_account: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            retrain_threshold: default_retrain_threshold(),
            max_per_account: default_max_per_account(),
        }
    }
}

/// Keyword and pattern tables used by the feature extractor.
///
/// Loaded once and never mutated while extracting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_bot_keywords")]
    pub bot_keywords: Vec<String>,
    #[serde(default = "default_urgency_words")]
    pub urgency_words: Vec<String>,
    #[serde(default = "default_shortener_domains")]
    pub shortener_domains: Vec<String>,
    #[serde(default = "default_bulk_mailers")]
    pub bulk_mailers: Vec<String>,
    #[serde(default = "default_noreply_patterns")]
    pub noreply_patterns: Vec<String>,
    #[serde(default = "default_automated_sender_patterns")]
    pub automated_sender_patterns: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            bot_keywords: default_bot_keywords(),
            urgency_words: default_urgency_words(),
            shortener_domains: default_shortener_domains(),
            bulk_mailers: default_bulk_mailers(),
            noreply_patterns: default_noreply_patterns(),
            automated_sender_patterns: default_automated_sender_patterns(),
        }
    }
}

fn default_random_state() -> u64 {
    42
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_forest_estimators() -> usize {
    200
}

fn default_forest_depth() -> usize {
    20
}

fn default_min_samples_split() -> usize {
    10
}

fn default_balanced_class_weight() -> bool {
    true
}

fn default_boosting_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_boosting_depth() -> usize {
    5
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_margin_threshold() -> f64 {
    0.1
}

fn default_top_features() -> usize {
    10
}

fn default_retrain_threshold() -> usize {
    50
}

fn default_max_per_account() -> usize {
    1000
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_bot_keywords() -> Vec<String> {
    strings(&[
        "unsubscribe",
        "newsletter",
        "marketing",
        "subscription",
        "promotional",
        "advertisement",
        "click here",
        "special offer",
        "limited time",
        "act now",
        "don't miss",
        "exclusive deal",
        "sale",
        "discount",
        "coupon",
        "free shipping",
    ])
}

fn default_urgency_words() -> Vec<String> {
    strings(&[
        "urgent",
        "immediately",
        "asap",
        "critical",
        "important",
        "action required",
        "time-sensitive",
        "expiring",
        "deadline",
        "final notice",
        "last chance",
        "ending soon",
    ])
}

fn default_shortener_domains() -> Vec<String> {
    strings(&["bit.ly", "tinyurl.com", "goo.gl", "t.co", "ow.ly"])
}

fn default_bulk_mailers() -> Vec<String> {
    strings(&["mailchimp", "sendgrid", "constant contact", "bulk"])
}

fn default_noreply_patterns() -> Vec<String> {
    strings(&["noreply", "no-reply", "donotreply"])
}

fn default_automated_sender_patterns() -> Vec<String> {
    strings(&[
        "noreply",
        "no-reply",
        "donotreply",
        "do-not-reply",
        "auto@",
        "automated@",
        "robot@",
        "bot@",
        "notification",
        "alert",
        "system",
    ])
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let split = self.classifier.validation_split;
        if !(split > 0.0 && split < 1.0) {
            return Err(TriageError::ConfigError(format!(
                "classifier.validation_split must be between 0 and 1 (exclusive), got {}",
                split
            )));
        }

        if self.forest.n_estimators == 0 {
            return Err(TriageError::ConfigError(
                "forest.n_estimators must be greater than 0".to_string(),
            ));
        }
        if self.forest.max_depth == 0 {
            return Err(TriageError::ConfigError(
                "forest.max_depth must be greater than 0".to_string(),
            ));
        }
        if self.forest.min_samples_split < 2 {
            return Err(TriageError::ConfigError(
                "forest.min_samples_split must be at least 2".to_string(),
            ));
        }

        if self.boosting.n_estimators == 0 {
            return Err(TriageError::ConfigError(
                "boosting.n_estimators must be greater than 0".to_string(),
            ));
        }
        if self.boosting.max_depth == 0 {
            return Err(TriageError::ConfigError(
                "boosting.max_depth must be greater than 0".to_string(),
            ));
        }
        let rate = self.boosting.learning_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(TriageError::ConfigError(format!(
                "boosting.learning_rate must be in (0, 1], got {}",
                rate
            )));
        }

        for (name, value) in [
            ("confidence_threshold", self.calibration.confidence_threshold),
            ("margin_threshold", self.calibration.margin_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TriageError::ConfigError(format!(
                    "calibration.{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.calibration.top_features == 0 {
            return Err(TriageError::ConfigError(
                "calibration.top_features must be greater than 0".to_string(),
            ));
        }

        if self.training.retrain_threshold == 0 {
            return Err(TriageError::ConfigError(
                "training.retrain_threshold must be greater than 0".to_string(),
            ));
        }
        if self.training.max_per_account == 0 {
            return Err(TriageError::ConfigError(
                "training.max_per_account must be greater than 0".to_string(),
            ));
        }

        let tables = [
            ("bot_keywords", &self.extraction.bot_keywords),
            ("urgency_words", &self.extraction.urgency_words),
            ("shortener_domains", &self.extraction.shortener_domains),
            ("bulk_mailers", &self.extraction.bulk_mailers),
            ("noreply_patterns", &self.extraction.noreply_patterns),
            (
                "automated_sender_patterns",
                &self.extraction.automated_sender_patterns,
            ),
        ];
        for (name, entries) in tables {
            if entries.iter().any(|entry| entry.trim().is_empty()) {
                return Err(TriageError::ConfigError(format!(
                    "extraction.{} cannot contain empty strings",
                    name
                )));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
