//! Histogram-binned CART trees shared by both ensembles
//!
//! Features are quantised once into at most [`MAX_BINS`] ordered bins. Split
//! search scans bin histograms, and a fitted split is stored as a raw
//! threshold (`x <= threshold` goes left), so prediction needs no binning.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MAX_BINS: usize = 64;

/// Splits must reduce impurity by more than this
const MIN_DECREASE: f64 = 1e-12;

/// Column-major bin codes for a feature matrix
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Vec<Vec<u8>>,
    thresholds: Vec<Vec<f64>>,
    n_rows: usize,
}

impl BinnedMatrix {
    pub fn new(x: ArrayView2<f64>) -> Self {
        let n_rows = x.nrows();
        let mut bins = Vec::with_capacity(x.ncols());
        let mut thresholds = Vec::with_capacity(x.ncols());

        for column in x.columns() {
            let edges = bin_edges(column);
            let codes = column
                .iter()
                .map(|&v| edges.partition_point(|&t| t < v) as u8)
                .collect();
            bins.push(codes);
            thresholds.push(edges);
        }

        Self {
            bins,
            thresholds,
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.bins.len()
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }
}

/// Upper edges between bins: midpoints of adjacent distinct values, or of
/// evenly spaced quantiles when there are more distinct values than bins.
fn bin_edges(column: ArrayView1<f64>) -> Vec<f64> {
    let mut unique: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    unique.sort_by(f64::total_cmp);
    unique.dedup();

    if unique.len() <= 1 {
        return Vec::new();
    }

    if unique.len() <= MAX_BINS {
        return unique.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let mut edges: Vec<f64> = (1..MAX_BINS)
        .map(|k| {
            let idx = k * unique.len() / MAX_BINS;
            (unique[idx - 1] + unique[idx]) / 2.0
        })
        .collect();
    edges.dedup();
    edges
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// Flat node arena; the root is node 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Leaf value reached by `row`
    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { value } => return value,
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                Node::Leaf { .. } => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Candidate features drawn per node; `None` uses every feature
    pub max_features: Option<usize>,
}

/// What a split tries to separate
#[derive(Debug, Clone, Copy)]
pub enum SplitTarget<'a> {
    /// Weighted Gini impurity over class indices
    Classes {
        labels: &'a [usize],
        weights: &'a [f64],
        n_classes: usize,
    },
    /// Squared error of real-valued residuals
    Residuals { residuals: &'a [f64] },
}

impl SplitTarget<'_> {
    fn width(&self) -> usize {
        match self {
            SplitTarget::Classes { n_classes, .. } => *n_classes,
            SplitTarget::Residuals { .. } => 2,
        }
    }

    fn accumulate(&self, row: usize, stats: &mut [f64]) {
        match self {
            SplitTarget::Classes {
                labels, weights, ..
            } => stats[labels[row]] += weights[row],
            SplitTarget::Residuals { residuals } => {
                stats[0] += 1.0;
                stats[1] += residuals[row];
            }
        }
    }

    /// Node cost; lower is purer. Impurity decrease is parent minus children.
    fn cost(&self, stats: &[f64]) -> f64 {
        match self {
            SplitTarget::Classes { .. } => {
                let total: f64 = stats.iter().sum();
                if total <= 0.0 {
                    0.0
                } else {
                    total - stats.iter().map(|c| c * c).sum::<f64>() / total
                }
            }
            SplitTarget::Residuals { .. } => {
                if stats[0] <= 0.0 {
                    0.0
                } else {
                    -(stats[1] * stats[1]) / stats[0]
                }
            }
        }
    }
}

/// A fitted tree plus the impurity decrease credited to each feature
pub struct FittedTree {
    pub tree: DecisionTree,
    pub importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    bin: usize,
    decrease: f64,
}

struct Grower<'a, R: Rng> {
    data: &'a BinnedMatrix,
    target: SplitTarget<'a>,
    params: TreeParams,
    leaf_value: &'a dyn Fn(&[usize]) -> Vec<f64>,
    rng: &'a mut R,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

/// Grow one tree over `samples` (row indices, duplicates allowed).
///
/// `leaf_value` maps the rows that reach a leaf to the value stored there.
pub fn fit_tree<R: Rng>(
    data: &BinnedMatrix,
    target: SplitTarget<'_>,
    params: TreeParams,
    samples: Vec<usize>,
    leaf_value: &dyn Fn(&[usize]) -> Vec<f64>,
    rng: &mut R,
) -> FittedTree {
    let mut grower = Grower {
        data,
        target,
        params,
        leaf_value,
        rng,
        nodes: Vec::new(),
        importances: vec![0.0; data.n_features()],
    };
    grower.grow(samples, 0);

    FittedTree {
        tree: DecisionTree {
            nodes: grower.nodes,
        },
        importances: grower.importances,
    }
}

impl<R: Rng> Grower<'_, R> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });

        let split = if depth < self.params.max_depth
            && samples.len() >= self.params.min_samples_split.max(2)
        {
            self.best_split(&samples)
        } else {
            None
        };

        match split {
            Some(best) => {
                self.importances[best.feature] += best.decrease;
                let codes = &self.data.bins[best.feature];
                let (left, right): (Vec<usize>, Vec<usize>) = samples
                    .into_iter()
                    .partition(|&row| usize::from(codes[row]) <= best.bin);
                let threshold = self.data.thresholds[best.feature][best.bin];

                let left = self.grow(left, depth + 1);
                let right = self.grow(right, depth + 1);
                self.nodes[index] = Node::Split {
                    feature: best.feature,
                    threshold,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[index] = Node::Leaf {
                    value: (self.leaf_value)(&samples),
                };
            }
        }

        index
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n = self.data.n_features();
        match self.params.max_features {
            Some(k) if k < n => rand::seq::index::sample(&mut *self.rng, n, k.max(1)).into_vec(),
            _ => (0..n).collect(),
        }
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<BestSplit> {
        let width = self.target.width();
        let mut parent = vec![0.0; width];
        for &row in samples {
            self.target.accumulate(row, &mut parent);
        }
        let parent_cost = self.target.cost(&parent);

        let mut best: Option<BestSplit> = None;
        for feature in self.candidate_features() {
            let n_bins = self.data.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            let codes = &self.data.bins[feature];
            let mut hist = vec![0.0; n_bins * width];
            let mut counts = vec![0usize; n_bins];
            for &row in samples {
                let bin = usize::from(codes[row]);
                counts[bin] += 1;
                self.target
                    .accumulate(row, &mut hist[bin * width..(bin + 1) * width]);
            }

            let mut left = vec![0.0; width];
            let mut left_count = 0;
            for bin in 0..n_bins - 1 {
                for (acc, v) in left.iter_mut().zip(&hist[bin * width..(bin + 1) * width]) {
                    *acc += v;
                }
                left_count += counts[bin];
                if counts[bin] == 0 || left_count == 0 || left_count == samples.len() {
                    continue;
                }

                let right: Vec<f64> = parent.iter().zip(&left).map(|(p, l)| p - l).collect();
                let decrease =
                    parent_cost - self.target.cost(&left) - self.target.cost(&right);

                let improves = match &best {
                    Some(b) => decrease > b.decrease,
                    None => decrease > MIN_DECREASE,
                };
                if improves {
                    best = Some(BestSplit {
                        feature,
                        bin,
                        decrease,
                    });
                }
            }
        }

        best
    }
}
