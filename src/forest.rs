//! Random forest: bootstrap-bagged Gini trees with class-balanced weights

use crate::config::ForestConfig;
use crate::error::{Result, TriageError};
use crate::tree::{fit_tree, BinnedMatrix, DecisionTree, SplitTarget, TreeParams};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

/// `n / (k * n_c)` per sample, where `k` counts the classes present
pub fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = y.len() as f64;

    y.iter()
        .map(|&label| n / (present * counts[label] as f64))
        .collect()
}

/// `floor(sqrt(d))`, at least one
fn sqrt_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

impl RandomForest {
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        config: &ForestConfig,
        seed: u64,
    ) -> Result<Self> {
        check_training_input(x, y, n_classes)?;

        let n = x.nrows();
        let weights = if config.balanced_class_weight {
            balanced_class_weights(y, n_classes)
        } else {
            vec![1.0; n]
        };

        let binned = BinnedMatrix::new(x);
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            max_features: Some(sqrt_features(x.ncols())),
        };
        let target = SplitTarget::Classes {
            labels: y,
            weights: &weights,
            n_classes,
        };
        let leaf_value = |rows: &[usize]| {
            let mut dist = vec![0.0; n_classes];
            for &row in rows {
                dist[y[row]] += weights[row];
            }
            let total: f64 = dist.iter().sum();
            if total > 0.0 {
                dist.iter_mut().for_each(|p| *p /= total);
            }
            dist
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..config.n_estimators {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let fitted = fit_tree(&binned, target, params, bootstrap, &leaf_value, &mut rng);

            let total: f64 = fitted.importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&fitted.importances) {
                    *acc += v / total;
                }
            }
            trees.push(fitted.tree);
        }

        normalize(&mut importances);

        tracing::debug!(
            "Random forest fitted: {} trees, {} features, {} classes",
            trees.len(),
            x.ncols(),
            n_classes
        );

        Ok(Self {
            n_classes,
            n_features: x.ncols(),
            trees,
            feature_importances: importances,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Impurity-based importances, normalised to sum to 1 (all zero if no tree split)
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Mean of the trees' leaf class distributions
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_row(row)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        proba
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

pub(crate) fn check_training_input(x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
    if x.nrows() == 0 {
        return Err(TriageError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(TriageError::LabelCountMismatch {
            samples: x.nrows(),
            labels: y.len(),
        });
    }
    if n_classes < 2 {
        return Err(TriageError::TooFewClasses { found: n_classes });
    }
    Ok(())
}

pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}
