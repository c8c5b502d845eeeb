//! Mail Triage ML
//!
//! Feature extraction and ensemble classification for email triage: decide
//! whether a message is bot or human mail, or which priority it deserves.
//!
//! # Overview
//!
//! - **Feature extraction**: a fixed, typed schema of 68 numeric features
//!   drawn from headers, content, sender, timing, structure and user behavior
//! - **Classification**: a random forest and a gradient boosting ensemble
//!   combined with fixed weights, with a calibrated "uncertain" flag
//! - **Persistence**: versioned JSON model artifacts plus training metadata
//! - **Training data**: a multi-account corpus and a seeded synthetic generator
//!
//! # Example Usage
//!
//! ```no_run
//! use mail_triage_ml::{
//!     EnsembleClassifier, FeatureExtractor, SenderStatsMap, SyntheticEmailGenerator,
//! };
//! use ndarray::Array2;
//!
//! #[tokio::main]
//! async fn main() -> mail_triage_ml::Result<()> {
//!     let (emails, labels) = SyntheticEmailGenerator::new(Some(42)).generate_dataset(500, 0.7);
//!
//!     let extractor = FeatureExtractor::default();
//!     let stats = SenderStatsMap::new();
//!     let rows: Vec<f64> = emails
//!         .iter()
//!         .flat_map(|e| extractor.extract(&e.message, &stats).to_array().to_vec())
//!         .collect();
//!     let x = Array2::from_shape_vec((emails.len(), extractor.feature_count()), rows)?;
//!
//!     let mut classifier = EnsembleClassifier::default();
//!     let metrics = classifier.fit(x.view(), &labels, extractor.feature_names(), 0.2)?;
//!     println!("{}", metrics);
//!
//!     let features = extractor.extract(&emails[0].message, &stats).to_feature_vector();
//!     let prediction = classifier.predict_single(&features, true)?;
//!     println!("{} ({:.2})", prediction.label, prediction.confidence);
//!
//!     classifier.save("models/triage.json").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`models`] - Messages, headers, sender statistics and feature vectors
//! - [`features`] - Feature extraction
//! - [`preprocessing`] - Scaling, label encoding and stratified splits
//! - [`tree`] - Histogram-binned decision trees
//! - [`forest`] - Random forest
//! - [`boosting`] - Gradient boosting
//! - [`metrics`] - Validation metrics
//! - [`classifier`] - The weighted ensemble
//! - [`model_store`] - Model persistence
//! - [`training`] - Multi-account training corpus
//! - [`synthetic`] - Synthetic training data
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases

pub mod boosting;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod model_store;
pub mod models;
pub mod preprocessing;
pub mod synthetic;
pub mod training;
pub mod tree;

// Re-export commonly used types for convenience
pub use error::{Result, TriageError};

// Core data models
pub use models::{
    FeatureValue, FeatureVector, Headers, MessageOrigin, Priority, RawMessage, SenderStatistics,
    SenderStatsMap,
};

// Feature extraction
pub use features::{EmailFeatures, FeatureExtractor, FEATURE_NAMES};

// Classifier types
pub use classifier::{EnsembleClassifier, EnsembleWeights, ModelConfig, PredictionResult};
pub use metrics::TrainingMetrics;

// Persistence
pub use model_store::{LoadedModel, TrainingMetadata};

// Training data
pub use synthetic::{SyntheticEmail, SyntheticEmailGenerator};
pub use training::{TrainingCorpus, TrainingSet};

// Config types
pub use config::{
    BoostingConfig, CalibrationConfig, ClassifierConfig, Config, ExtractionConfig, ForestConfig,
    TrainingConfig,
};
