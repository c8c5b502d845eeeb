//! Weighted random forest + gradient boosting ensemble with confidence calibration
//!
//! The classifier is either unfitted or fitted. `fit` replaces every fitted
//! component at once; prediction on an unfitted classifier returns
//! [`TriageError::NotTrained`].
//!
//! The feature-name order captured by `fit` is the contract between training
//! and inference: [`EnsembleClassifier::predict_single`] aligns its input by
//! name against that order, with absent names read as 0.0.

use crate::boosting::GradientBoosting;
use crate::config::{BoostingConfig, CalibrationConfig, ClassifierConfig, Config, ForestConfig};
use crate::error::{Result, TriageError};
use crate::forest::RandomForest;
use crate::metrics::{TrainingMetrics, ValidationOutcome};
use crate::model_store::{self, LoadedModel, TrainingMetadata};
use crate::models::{FeatureVector, Priority};
use crate::preprocessing::{stratified_split, LabelEncoder, StandardScaler};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Hyperparameters that shape a trained model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub forest: ForestConfig,
    #[serde(default)]
    pub boosting: BoostingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl From<&Config> for ModelConfig {
    fn from(config: &Config) -> Self {
        Self {
            classifier: config.classifier.clone(),
            forest: config.forest.clone(),
            boosting: config.boosting.clone(),
            calibration: config.calibration.clone(),
        }
    }
}

/// Voting weight of each ensemble member
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub random_forest: f64,
    pub gradient_boosting: f64,
    /// Weight reserved for an embedding-based model
    pub semantic: Option<f64>,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self::two_model()
    }
}

impl EnsembleWeights {
    pub fn two_model() -> Self {
        Self {
            random_forest: 0.6,
            gradient_boosting: 0.4,
            semantic: None,
        }
    }

    pub fn three_model() -> Self {
        Self {
            random_forest: 0.4,
            gradient_boosting: 0.3,
            semantic: Some(0.3),
        }
    }

    pub fn for_config(config: &ClassifierConfig) -> Self {
        if config.use_semantic_model {
            Self::three_model()
        } else {
            Self::two_model()
        }
    }

    /// Weights of the two tree models renormalised over the models present
    pub fn tree_weights(&self) -> (f64, f64) {
        let total = self.random_forest + self.gradient_boosting;
        if total > 0.0 {
            (self.random_forest / total, self.gradient_boosting / total)
        } else {
            (0.5, 0.5)
        }
    }

    fn combine(&self, rf: &[f64], gb: &[f64]) -> Vec<f64> {
        let (w_rf, w_gb) = self.tree_weights();
        rf.iter().zip(gb).map(|(a, b)| w_rf * a + w_gb * b).collect()
    }
}

/// Each sub-model's probability for the predicted class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfidences {
    pub random_forest: f64,
    pub gradient_boosting: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub confidence_breakdown: ModelConfidences,
    pub class_probabilities: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    /// Ensemble probability of `label`
    pub confidence: f64,
    pub is_uncertain: bool,
    pub model_confidences: ModelConfidences,
    /// Global forest importances, most important first
    pub top_features: Option<Vec<(String, f64)>>,
    pub explanation: Option<Explanation>,
}

impl PredictionResult {
    /// The label as a [`Priority`], when the model was trained on priorities
    pub fn priority(&self) -> Option<Priority> {
        self.label.parse().ok()
    }
}

/// Index of the largest probability; the first one wins ties
pub fn argmax(probs: &[f64]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        })
        .0
}

/// Low confidence or a near tie with the runner-up
pub fn is_uncertain(probs: &[f64], calibration: &CalibrationConfig) -> bool {
    let mut sorted = probs.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let top = sorted.first().copied().unwrap_or(0.0);
    let second = sorted.get(1).copied().unwrap_or(0.0);

    top < calibration.confidence_threshold || top - second < calibration.margin_threshold
}

/// Everything produced by a successful `fit`
#[derive(Debug, Clone)]
pub(crate) struct FittedEnsemble {
    pub(crate) model_id: Uuid,
    pub(crate) feature_names: Vec<String>,
    pub(crate) classes: LabelEncoder,
    pub(crate) scaler: StandardScaler,
    pub(crate) forest: RandomForest,
    pub(crate) boosting: GradientBoosting,
    pub(crate) metrics: TrainingMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct EnsembleClassifier {
    config: ModelConfig,
    weights: EnsembleWeights,
    fitted: Option<FittedEnsemble>,
}

impl EnsembleClassifier {
    pub fn new(config: ModelConfig) -> Self {
        let weights = EnsembleWeights::for_config(&config.classifier);
        Self {
            config,
            weights,
            fitted: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ModelConfig::from(config))
    }

    pub fn with_weights(mut self, weights: EnsembleWeights) -> Self {
        self.weights = weights;
        self
    }

    pub(crate) fn from_parts(
        config: ModelConfig,
        weights: EnsembleWeights,
        fitted: FittedEnsemble,
    ) -> Self {
        Self {
            config,
            weights,
            fitted: Some(fitted),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Sorted class labels; empty until fitted
    pub fn classes(&self) -> &[String] {
        self.fitted
            .as_ref()
            .map(|f| f.classes.classes())
            .unwrap_or(&[])
    }

    /// Feature order captured at fit time; empty until fitted
    pub fn feature_names(&self) -> &[String] {
        self.fitted
            .as_ref()
            .map(|f| f.feature_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn training_metrics(&self) -> Option<&TrainingMetrics> {
        self.fitted.as_ref().map(|f| &f.metrics)
    }

    pub fn model_id(&self) -> Option<Uuid> {
        self.fitted.as_ref().map(|f| f.model_id)
    }

    pub(crate) fn fitted(&self) -> Result<&FittedEnsemble> {
        self.fitted.as_ref().ok_or(TriageError::NotTrained)
    }

    /// Train both models on a stratified split of `(x, y)` and return
    /// validation metrics.
    ///
    /// Any previously fitted state is discarded first, so a failed fit
    /// leaves the classifier unfitted.
    pub fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: &[String],
        feature_names: &[String],
        validation_split: f64,
    ) -> Result<TrainingMetrics> {
        self.fitted = None;

        if x.nrows() == 0 {
            return Err(TriageError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(TriageError::LabelCountMismatch {
                samples: x.nrows(),
                labels: y.len(),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(TriageError::FeatureShapeMismatch {
                expected: feature_names.len(),
                found: x.ncols(),
            });
        }

        let classes = LabelEncoder::fit(y);
        if classes.n_classes() < 2 {
            return Err(TriageError::TooFewClasses {
                found: classes.n_classes(),
            });
        }

        tracing::info!(
            "Training ensemble classifier on {} samples with {} features",
            x.nrows(),
            x.ncols()
        );

        let seed = self.config.classifier.random_state;
        let split = stratified_split(y, validation_split, seed)?;
        tracing::info!(
            "Training set: {}, Validation set: {}",
            split.train.len(),
            split.validation.len()
        );

        let encoded = classes.encode(y)?;
        let y_train: Vec<usize> = split.train.iter().map(|&i| encoded[i]).collect();
        let y_val: Vec<usize> = split.validation.iter().map(|&i| encoded[i]).collect();

        let x_train = x.select(Axis(0), &split.train);
        let x_val = x.select(Axis(0), &split.validation);

        let scaler = StandardScaler::fit(x_train.view())?;
        let x_train = scaler.transform(x_train.view())?;
        let x_val = scaler.transform(x_val.view())?;

        let n_classes = classes.n_classes();

        tracing::info!("Training Random Forest...");
        let forest = RandomForest::fit(
            x_train.view(),
            &y_train,
            n_classes,
            &self.config.forest,
            seed,
        )?;
        let rf_val = forest.predict_proba(x_val.view())?;

        tracing::info!("Training Gradient Boosting...");
        let boosting = GradientBoosting::fit(
            x_train.view(),
            &y_train,
            n_classes,
            &self.config.boosting,
            seed,
        )?;
        let gb_val = boosting.predict_proba(x_val.view())?;

        let rf_pred = row_argmax(&rf_val);
        let gb_pred = row_argmax(&gb_val);
        let ensemble_pred = row_argmax(&self.combine_matrix(&rf_val, &gb_val));

        let metrics = TrainingMetrics::from_validation(
            &ValidationOutcome {
                classes: classes.classes(),
                y_true: &y_val,
                ensemble: &ensemble_pred,
                random_forest: &rf_pred,
                gradient_boosting: &gb_pred,
            },
            split.train.len(),
            split.validation.len(),
        );

        tracing::info!("  Random Forest validation accuracy: {:.3}", metrics.rf_accuracy);
        tracing::info!(
            "  Gradient Boosting validation accuracy: {:.3}",
            metrics.gb_accuracy
        );
        tracing::info!("  Ensemble validation accuracy: {:.3}", metrics.accuracy);

        self.fitted = Some(FittedEnsemble {
            model_id: Uuid::new_v4(),
            feature_names: feature_names.to_vec(),
            classes,
            scaler,
            forest,
            boosting,
            metrics: metrics.clone(),
        });

        tracing::info!("Training complete");
        Ok(metrics)
    }

    /// Combined class probabilities, columns in [`classes`](Self::classes) order
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let fitted = self.fitted()?;
        let scaled = fitted.scaler.transform(x)?;
        let rf = fitted.forest.predict_proba(scaled.view())?;
        let gb = fitted.boosting.predict_proba(scaled.view())?;
        Ok(self.combine_matrix(&rf, &gb))
    }

    /// Predicted label per row
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<String>> {
        let fitted = self.fitted()?;
        let proba = self.predict_proba(x)?;
        Ok(row_argmax(&proba)
            .into_iter()
            .map(|i| fitted.classes.classes()[i].clone())
            .collect())
    }

    /// Classify one feature mapping, aligned by name to the training order.
    ///
    /// With `explain`, the result also carries the top global forest
    /// importances and the full per-class probability breakdown.
    pub fn predict_single(
        &self,
        features: &FeatureVector,
        explain: bool,
    ) -> Result<PredictionResult> {
        let fitted = self.fitted()?;

        let row = Array1::from(features.to_dense(&fitted.feature_names));
        let scaled = fitted.scaler.transform_row(row.view())?;
        let scaled = ArrayView1::from(scaled.as_slice());

        let rf = fitted.forest.predict_proba_row(scaled);
        let gb = fitted.boosting.predict_proba_row(scaled);
        let probs = self.weights.combine(&rf, &gb);

        let best = argmax(&probs);
        let confidence = probs[best];
        let model_confidences = ModelConfidences {
            random_forest: rf[best],
            gradient_boosting: gb[best],
        };

        let (top_features, explanation) = if explain {
            let top = self.feature_importance(self.config.calibration.top_features)?;
            let class_probabilities = fitted
                .classes
                .classes()
                .iter()
                .cloned()
                .zip(probs.iter().copied())
                .collect();
            (
                Some(top),
                Some(Explanation {
                    confidence_breakdown: model_confidences,
                    class_probabilities,
                }),
            )
        } else {
            (None, None)
        };

        Ok(PredictionResult {
            label: fitted.classes.classes()[best].clone(),
            confidence,
            is_uncertain: is_uncertain(&probs, &self.config.calibration),
            model_confidences,
            top_features,
            explanation,
        })
    }

    /// Top `top_n` global forest importances, highest first, ties by name
    pub fn feature_importance(&self, top_n: usize) -> Result<Vec<(String, f64)>> {
        let fitted = self.fitted()?;

        let mut ranked: Vec<(String, f64)> = fitted
            .feature_names
            .iter()
            .cloned()
            .zip(fitted.forest.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_n);

        Ok(ranked)
    }

    /// Write the model artifact (no companion metadata)
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        model_store::save_model(self, path.as_ref(), None).await
    }

    /// Write the model artifact plus the companion metadata file
    pub async fn save_with_metadata(
        &self,
        path: impl AsRef<Path>,
        metadata: &TrainingMetadata,
    ) -> Result<()> {
        model_store::save_model(self, path.as_ref(), Some(metadata)).await
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let LoadedModel { classifier, .. } = model_store::load_model(path.as_ref()).await?;
        Ok(classifier)
    }

    fn combine_matrix(&self, rf: &Array2<f64>, gb: &Array2<f64>) -> Array2<f64> {
        let (w_rf, w_gb) = self.weights.tree_weights();
        rf * w_rf + gb * w_gb
    }
}

fn row_argmax(proba: &Array2<f64>) -> Vec<usize> {
    proba
        .rows()
        .into_iter()
        .map(|row| argmax(&row.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ModelConfig {
        ModelConfig {
            forest: ForestConfig {
                n_estimators: 10,
                max_depth: 6,
                min_samples_split: 2,
                balanced_class_weight: true,
            },
            boosting: BoostingConfig {
                n_estimators: 10,
                learning_rate: 0.3,
                max_depth: 3,
            },
            ..ModelConfig::default()
        }
    }

    fn names() -> Vec<String> {
        vec!["has_list_unsubscribe".to_string(), "hour_of_day".to_string(), "noise".to_string()]
    }

    /// "bot" rows have the unsubscribe flag and late hours
    fn dataset() -> (Array2<f64>, Vec<String>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let noise = ((i * 13) % 5) as f64;
            if i % 3 == 0 {
                rows.extend_from_slice(&[0.0, 10.0 + (i % 8) as f64, noise]);
                y.push("human".to_string());
            } else {
                rows.extend_from_slice(&[1.0, (i % 5) as f64 + 20.0, noise]);
                y.push("bot".to_string());
            }
        }
        (Array2::from_shape_vec((60, 3), rows).unwrap(), y)
    }

    fn trained() -> EnsembleClassifier {
        let (x, y) = dataset();
        let mut classifier = EnsembleClassifier::new(small_config());
        classifier.fit(x.view(), &y, &names(), 0.2).unwrap();
        classifier
    }

    #[test]
    fn test_weight_presets() {
        assert_eq!(EnsembleWeights::default().tree_weights(), (0.6, 0.4));

        let (rf, gb) = EnsembleWeights::three_model().tree_weights();
        assert!((rf - 4.0 / 7.0).abs() < 1e-12);
        assert!((gb - 3.0 / 7.0).abs() < 1e-12);

        let config = ClassifierConfig {
            use_semantic_model: true,
            ..ClassifierConfig::default()
        };
        assert_eq!(EnsembleWeights::for_config(&config).semantic, Some(0.3));
    }

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), 1);
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
    }

    #[test]
    fn test_uncertainty_rule() {
        let calibration = CalibrationConfig::default();

        assert!(!is_uncertain(&[0.9, 0.1], &calibration));
        // Low confidence
        assert!(is_uncertain(&[0.65, 0.2, 0.15], &calibration));
        // Confident but nearly tied (only possible with lowered threshold)
        let loose = CalibrationConfig {
            confidence_threshold: 0.4,
            ..CalibrationConfig::default()
        };
        assert!(is_uncertain(&[0.45, 0.4, 0.15], &loose));
        assert!(!is_uncertain(&[0.6, 0.3, 0.1], &loose));
    }

    #[test]
    fn test_unfitted_classifier() {
        let classifier = EnsembleClassifier::default();
        assert!(!classifier.is_fitted());
        assert!(classifier.classes().is_empty());
        assert!(classifier.training_metrics().is_none());

        let err = classifier
            .predict_single(&FeatureVector::new(), true)
            .unwrap_err();
        assert!(matches!(err, TriageError::NotTrained));
        assert!(err.to_string().contains("Model not trained"));

        let x = Array2::<f64>::zeros((1, 3));
        assert!(matches!(
            classifier.predict(x.view()),
            Err(TriageError::NotTrained)
        ));
        assert!(classifier.feature_importance(5).is_err());
    }

    #[test]
    fn test_fit_and_predict() {
        let classifier = trained();

        assert!(classifier.is_fitted());
        assert_eq!(classifier.classes(), &["bot", "human"]);
        assert_eq!(classifier.feature_names(), names().as_slice());

        let metrics = classifier.training_metrics().unwrap();
        assert_eq!(metrics.training_samples + metrics.validation_samples, 60);
        assert!((0.0..=1.0).contains(&metrics.accuracy));
        assert!(metrics.precision_by_class.contains_key("bot"));
        assert!(metrics.f1_by_class.contains_key("human"));

        let x = ndarray::array![[1.0, 22.0, 1.0], [0.0, 12.0, 1.0]];
        let labels = classifier.predict(x.view()).unwrap();
        assert_eq!(labels, vec!["bot", "human"]);

        let proba = classifier.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_single_with_explanation() {
        let classifier = trained();

        let mut features = FeatureVector::new();
        features.insert("has_list_unsubscribe", true);
        features.insert("hour_of_day", 21u32);
        features.insert("unused_feature", 7.0);

        let result = classifier.predict_single(&features, true).unwrap();

        assert_eq!(result.label, "bot");
        assert!((0.0..=1.0).contains(&result.confidence));

        let explanation = result.explanation.unwrap();
        let total: f64 = explanation.class_probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(explanation.class_probabilities["bot"], result.confidence);
        assert_eq!(explanation.confidence_breakdown, result.model_confidences);

        let top = result.top_features.unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_predict_single_without_explanation() {
        let classifier = trained();
        let result = classifier
            .predict_single(&FeatureVector::new(), false)
            .unwrap();

        assert!(result.top_features.is_none());
        assert!(result.explanation.is_none());
        assert!(classifier.classes().contains(&result.label));
    }

    #[test]
    fn test_importance_is_global() {
        let classifier = trained();
        let mut a = FeatureVector::new();
        a.insert("has_list_unsubscribe", true);
        let mut b = FeatureVector::new();
        b.insert("hour_of_day", 9u32);

        let first = classifier.predict_single(&a, true).unwrap().top_features;
        let second = classifier.predict_single(&b, true).unwrap().top_features;
        assert_eq!(first, second);
        assert_eq!(first.unwrap(), classifier.feature_importance(10).unwrap());
    }

    #[test]
    fn test_fit_validates_input() {
        let (x, y) = dataset();
        let mut classifier = EnsembleClassifier::new(small_config());

        assert!(matches!(
            classifier.fit(x.view(), &y[..10], &names(), 0.2),
            Err(TriageError::LabelCountMismatch { .. })
        ));
        assert!(matches!(
            classifier.fit(x.view(), &y, &names()[..2], 0.2),
            Err(TriageError::FeatureShapeMismatch { .. })
        ));

        let single = vec!["bot".to_string(); 60];
        assert!(matches!(
            classifier.fit(x.view(), &single, &names(), 0.2),
            Err(TriageError::TooFewClasses { found: 1 })
        ));
        assert!(!classifier.is_fitted());
    }

    #[test]
    fn test_refit_replaces_model() {
        let (x, y) = dataset();
        let mut classifier = trained();
        let first_id = classifier.model_id();

        classifier.fit(x.view(), &y, &names(), 0.25).unwrap();
        assert_ne!(classifier.model_id(), first_id);
        assert_eq!(classifier.training_metrics().unwrap().validation_samples, 15);
    }

    #[test]
    fn test_wrong_width_batch_is_rejected() {
        let classifier = trained();
        let x = Array2::<f64>::zeros((2, 5));
        assert!(matches!(
            classifier.predict(x.view()),
            Err(TriageError::FeatureShapeMismatch {
                expected: 3,
                found: 5
            })
        ));
    }

    #[test]
    fn test_priority_parsing() {
        let result = PredictionResult {
            label: "archive".to_string(),
            confidence: 0.9,
            is_uncertain: false,
            model_confidences: ModelConfidences {
                random_forest: 0.9,
                gradient_boosting: 0.9,
            },
            top_features: None,
            explanation: None,
        };
        assert_eq!(result.priority(), Some(Priority::Archive));
    }
}
