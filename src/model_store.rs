//! Versioned model artifacts and their companion training metadata
//!
//! A model is one JSON document tagged with [`FORMAT_VERSION`]. Training
//! metadata lives next to it in a small JSON file (see [`metadata_path`]).

use crate::boosting::GradientBoosting;
use crate::classifier::{EnsembleClassifier, EnsembleWeights, FittedEnsemble, ModelConfig};
use crate::error::{Result, TriageError};
use crate::features::FEATURE_NAMES;
use crate::forest::RandomForest;
use crate::metrics::TrainingMetrics;
use crate::preprocessing::{LabelEncoder, StandardScaler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Bumped whenever the artifact layout changes
pub const FORMAT_VERSION: u32 = 1;

/// Summary of the data a model was trained on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub accounts_trained: Vec<String>,
    pub training_date: Option<DateTime<Utc>>,
    pub total_samples: usize,
    pub samples_per_account: BTreeMap<String, usize>,
    pub class_distribution: BTreeMap<String, usize>,
    pub feature_count: usize,
}

pub struct LoadedModel {
    pub classifier: EnsembleClassifier,
    pub metadata: Option<TrainingMetadata>,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    model_id: Uuid,
    saved_at: DateTime<Utc>,
    classifier_config: &'a ModelConfig,
    weights: &'a EnsembleWeights,
    feature_names: &'a [String],
    classes: &'a [String],
    scaler: &'a StandardScaler,
    forest: &'a RandomForest,
    boosting: &'a GradientBoosting,
    metrics: &'a TrainingMetrics,
}

#[derive(Deserialize)]
struct Artifact {
    model_id: Uuid,
    saved_at: DateTime<Utc>,
    classifier_config: ModelConfig,
    weights: EnsembleWeights,
    feature_names: Vec<String>,
    classes: Vec<String>,
    scaler: StandardScaler,
    forest: RandomForest,
    boosting: GradientBoosting,
    metrics: TrainingMetrics,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

/// `<model>.json`, or `<model>.meta.json` when the model itself ends in `.json`
pub fn metadata_path(model_path: &Path) -> PathBuf {
    match model_path.extension().and_then(|e| e.to_str()) {
        Some("json") => model_path.with_extension("meta.json"),
        _ => model_path.with_extension("json"),
    }
}

pub async fn save_model(
    classifier: &EnsembleClassifier,
    path: &Path,
    metadata: Option<&TrainingMetadata>,
) -> Result<()> {
    let fitted = classifier.fitted()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let artifact = ArtifactRef {
        format_version: FORMAT_VERSION,
        model_id: fitted.model_id,
        saved_at: Utc::now(),
        classifier_config: classifier.config(),
        weights: classifier.weights(),
        feature_names: &fitted.feature_names,
        classes: fitted.classes.classes(),
        scaler: &fitted.scaler,
        forest: &fitted.forest,
        boosting: &fitted.boosting,
        metrics: &fitted.metrics,
    };
    let json = serde_json::to_vec(&artifact)?;
    tokio::fs::write(path, json).await?;
    tracing::info!("Model {} saved to {:?}", fitted.model_id, path);

    if let Some(metadata) = metadata {
        save_metadata(metadata, &metadata_path(path)).await?;
    }

    Ok(())
}

pub async fn load_model(path: &Path) -> Result<LoadedModel> {
    if !path.exists() {
        return Err(TriageError::ModelNotFound(path.to_path_buf()));
    }

    let json = tokio::fs::read_to_string(path).await?;

    let probe: VersionProbe = serde_json::from_str(&json)?;
    if probe.format_version != FORMAT_VERSION {
        return Err(TriageError::UnsupportedModelVersion {
            found: probe.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let artifact: Artifact = serde_json::from_str(&json)?;
    if artifact.scaler.n_features() != artifact.feature_names.len() {
        return Err(TriageError::FeatureShapeMismatch {
            expected: artifact.feature_names.len(),
            found: artifact.scaler.n_features(),
        });
    }
    if artifact.feature_names != *FEATURE_NAMES {
        tracing::warn!(
            "Model at {:?} was trained on {} features that differ from the current extractor schema ({} features); missing features will read as 0.0",
            path,
            artifact.feature_names.len(),
            FEATURE_NAMES.len()
        );
    }

    tracing::info!(
        "Model {} loaded from {:?} (saved {})",
        artifact.model_id,
        path,
        artifact.saved_at.to_rfc3339()
    );

    let fitted = FittedEnsemble {
        model_id: artifact.model_id,
        feature_names: artifact.feature_names,
        classes: LabelEncoder::from_classes(artifact.classes),
        scaler: artifact.scaler,
        forest: artifact.forest,
        boosting: artifact.boosting,
        metrics: artifact.metrics,
    };
    let classifier =
        EnsembleClassifier::from_parts(artifact.classifier_config, artifact.weights, fitted);

    let metadata = load_metadata(&metadata_path(path)).await?;

    Ok(LoadedModel {
        classifier,
        metadata,
    })
}

pub async fn save_metadata(metadata: &TrainingMetadata, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(metadata)?;
    tokio::fs::write(path, json).await?;
    tracing::debug!("Saved training metadata to {:?}", path);
    Ok(())
}

/// `None` when no metadata file exists
pub async fn load_metadata(path: &Path) -> Result<Option<TrainingMetadata>> {
    if !path.exists() {
        tracing::debug!("No training metadata at {:?}", path);
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(path).await?;
    let metadata: TrainingMetadata = serde_json::from_str(&json)?;
    tracing::info!(
        "Trained on {} samples, training date: {}",
        metadata.total_samples,
        metadata
            .training_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );
    Ok(Some(metadata))
}
