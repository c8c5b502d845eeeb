//! Multinomial gradient boosting with shallow regression trees
//!
//! One tree per class per stage, fitted to `1{y == k} - p_k`, with Newton
//! leaf values. Raw scores start at the log class priors.

use crate::config::BoostingConfig;
use crate::error::{Result, TriageError};
use crate::forest::check_training_input;
use crate::tree::{fit_tree, BinnedMatrix, DecisionTree, SplitTarget, TreeParams};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

const PRIOR_FLOOR: f64 = 1e-12;
const MIN_HESSIAN: f64 = 1e-150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_classes: usize,
    n_features: usize,
    learning_rate: f64,
    init_scores: Vec<f64>,
    /// `stages[m][k]` is the tree for class `k` at stage `m`
    stages: Vec<Vec<DecisionTree>>,
}

/// Numerically stable softmax
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

impl GradientBoosting {
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        config: &BoostingConfig,
        seed: u64,
    ) -> Result<Self> {
        check_training_input(x, y, n_classes)?;

        let n = x.nrows();
        let mut counts = vec![0.0; n_classes];
        for &label in y {
            counts[label] += 1.0;
        }
        let init_scores: Vec<f64> = counts
            .iter()
            .map(|c| (c / n as f64).max(PRIOR_FLOOR).ln())
            .collect();

        let binned = BinnedMatrix::new(x);
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let k_factor = (n_classes as f64 - 1.0) / n_classes as f64;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut scores: Vec<Vec<f64>> = vec![init_scores.clone(); n];
        let mut stages = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let proba: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
            let mut stage = Vec::with_capacity(n_classes);

            for k in 0..n_classes {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| f64::from(u8::from(y[i] == k)) - proba[i][k])
                    .collect();
                let newton_step = |rows: &[usize]| {
                    let numerator: f64 = rows.iter().map(|&r| residuals[r]).sum();
                    let denominator: f64 = rows
                        .iter()
                        .map(|&r| {
                            let a = residuals[r].abs();
                            a * (1.0 - a)
                        })
                        .sum();
                    if denominator.abs() < MIN_HESSIAN {
                        vec![0.0]
                    } else {
                        vec![k_factor * numerator / denominator]
                    }
                };

                let fitted = fit_tree(
                    &binned,
                    SplitTarget::Residuals {
                        residuals: &residuals,
                    },
                    params,
                    (0..n).collect(),
                    &newton_step,
                    &mut rng,
                );

                for (i, row) in x.rows().into_iter().enumerate() {
                    scores[i][k] += config.learning_rate * fitted.tree.predict_row(row)[0];
                }
                stage.push(fitted.tree);
            }

            stages.push(stage);
        }

        tracing::debug!(
            "Gradient boosting fitted: {} stages x {} classes",
            stages.len(),
            n_classes
        );

        Ok(Self {
            n_classes,
            n_features: x.ncols(),
            learning_rate: config.learning_rate,
            init_scores,
            stages,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Raw per-class scores before softmax
    pub fn decision_function_row(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut scores = self.init_scores.clone();
        for stage in &self.stages {
            for (score, tree) in scores.iter_mut().zip(stage) {
                *score += self.learning_rate * tree.predict_row(row)[0];
            }
        }
        scores
    }

    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> Vec<f64> {
        softmax(&self.decision_function_row(row))
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(TriageError::FeatureShapeMismatch {
                expected: self.n_features,
                found: x.ncols(),
            });
        }
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, p) in self.predict_proba_row(row).into_iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }
}
