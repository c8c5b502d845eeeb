//! Validation metrics recorded at the end of `fit`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fraction of positions where prediction equals truth; 0.0 for empty input
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(truth, pred)| truth == pred)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Per-class precision, recall, F1 and support, indexed by class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
    pub support: Vec<usize>,
}

/// Undefined ratios (no predictions, no support) are reported as 0.0
pub fn precision_recall_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> ClassScores {
    let mut true_pos = vec![0usize; n_classes];
    let mut predicted = vec![0usize; n_classes];
    let mut support = vec![0usize; n_classes];

    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        support[truth] += 1;
        predicted[pred] += 1;
        if truth == pred {
            true_pos[truth] += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision: Vec<f64> = (0..n_classes)
        .map(|k| ratio(true_pos[k], predicted[k]))
        .collect();
    let recall: Vec<f64> = (0..n_classes)
        .map(|k| ratio(true_pos[k], support[k]))
        .collect();
    let f1 = precision
        .iter()
        .zip(&recall)
        .map(|(p, r)| if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 })
        .collect();

    ClassScores {
        precision,
        recall,
        f1,
        support,
    }
}

/// Metrics of the most recent `fit`, computed on the validation split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub rf_accuracy: f64,
    pub gb_accuracy: f64,
    pub precision_by_class: BTreeMap<String, f64>,
    pub recall_by_class: BTreeMap<String, f64>,
    pub f1_by_class: BTreeMap<String, f64>,
    pub support_by_class: BTreeMap<String, usize>,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub trained_at: DateTime<Utc>,
}

/// Validation predictions of each model, as class indices
pub struct ValidationOutcome<'a> {
    pub classes: &'a [String],
    pub y_true: &'a [usize],
    pub ensemble: &'a [usize],
    pub random_forest: &'a [usize],
    pub gradient_boosting: &'a [usize],
}

impl TrainingMetrics {
    pub fn from_validation(
        outcome: &ValidationOutcome<'_>,
        training_samples: usize,
        validation_samples: usize,
    ) -> Self {
        let scores = precision_recall_f1(outcome.y_true, outcome.ensemble, outcome.classes.len());
        let by_class = |values: &[f64]| -> BTreeMap<String, f64> {
            outcome
                .classes
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect()
        };

        Self {
            accuracy: accuracy(outcome.y_true, outcome.ensemble),
            rf_accuracy: accuracy(outcome.y_true, outcome.random_forest),
            gb_accuracy: accuracy(outcome.y_true, outcome.gradient_boosting),
            precision_by_class: by_class(&scores.precision),
            recall_by_class: by_class(&scores.recall),
            f1_by_class: by_class(&scores.f1),
            support_by_class: outcome
                .classes
                .iter()
                .cloned()
                .zip(scores.support.iter().copied())
                .collect(),
            training_samples,
            validation_samples,
            trained_at: Utc::now(),
        }
    }
}

impl fmt::Display for TrainingMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(70);
        let light = "-".repeat(70);

        writeln!(f, "{}", heavy)?;
        writeln!(f, "MODEL TRAINING METRICS")?;
        writeln!(f, "{}", heavy)?;
        writeln!(f)?;
        writeln!(f, "Overall Accuracy: {:.3}", self.accuracy)?;
        writeln!(f, "Random Forest Accuracy: {:.3}", self.rf_accuracy)?;
        writeln!(f, "Gradient Boosting Accuracy: {:.3}", self.gb_accuracy)?;
        writeln!(f)?;
        writeln!(f, "Training Samples: {}", self.training_samples)?;
        writeln!(f, "Validation Samples: {}", self.validation_samples)?;
        writeln!(f, "Trained At: {}", self.trained_at.to_rfc3339())?;
        writeln!(f)?;
        writeln!(f, "{}", light)?;
        writeln!(f, "Per-Class Metrics:")?;
        writeln!(f, "{}", light)?;

        for (class, precision) in &self.precision_by_class {
            let recall = self.recall_by_class.get(class).copied().unwrap_or(0.0);
            let f1 = self.f1_by_class.get(class).copied().unwrap_or(0.0);
            let support = self.support_by_class.get(class).copied().unwrap_or(0);

            writeln!(f)?;
            writeln!(f, "{}:", class.to_uppercase())?;
            writeln!(f, "  Precision: {:.3}", precision)?;
            writeln!(f, "  Recall:    {:.3}", recall)?;
            writeln!(f, "  F1-Score:  {:.3}", f1)?;
            writeln!(f, "  Support:   {}", support)?;
        }

        writeln!(f)?;
        write!(f, "{}", heavy)
    }
}
