//! Scaling, label encoding and stratified splitting

use crate::error::{Result, TriageError};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIN_SCALE: f64 = 1e-12;

/// Per-feature zero-mean, unit-variance transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `x` (population variance). Constant columns get a scale of 1.
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(TriageError::EmptyTrainingSet);
        }

        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / column.len() as f64;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / column.len() as f64;
            let sd = var.sqrt();
            mean.push(m);
            scale.push(if sd < MIN_SCALE { 1.0 } else { sd });
        }

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    fn check_width(&self, found: usize) -> Result<()> {
        if found != self.n_features() {
            return Err(TriageError::FeatureShapeMismatch {
                expected: self.n_features(),
                found,
            });
        }
        Ok(())
    }
}

/// Sorted set of class labels with index lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(labels: &[String]) -> Self {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn from_classes(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    /// Encode labels; every label must be one of the fitted classes
    pub fn encode(&self, labels: &[String]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.index_of(label).ok_or_else(|| {
                    TriageError::ConfigError(format!("unknown class label '{}'", label))
                })
            })
            .collect()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

/// Train and validation row indices
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Stratified split preserving per-class proportions.
///
/// Each class contributes `round(n_c * validation_fraction)` rows to
/// validation, clamped to `[1, n_c - 1]`, so every class appears on both sides.
pub fn stratified_split(labels: &[String], validation_fraction: f64, seed: u64) -> Result<Split> {
    if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
        return Err(TriageError::InvalidValidationSplit(validation_fraction));
    }
    if labels.is_empty() {
        return Err(TriageError::EmptyTrainingSet);
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }

    if let Some((class, members)) = by_class.iter().find(|(_, members)| members.len() < 2) {
        return Err(TriageError::InsufficientClassMembers {
            class: class.to_string(),
            count: members.len(),
            required: 2,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_val = ((n as f64 * validation_fraction).round() as usize).clamp(1, n - 1);
        validation.extend_from_slice(&members[..n_val]);
        train.extend_from_slice(&members[n_val..]);
    }

    train.shuffle(&mut rng);
    validation.shuffle(&mut rng);

    Ok(Split { train, validation })
}
