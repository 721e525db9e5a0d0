//! Random forest regression: bagged variance-reduction trees.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{check_rows, check_training_set, not_fitted, Scorer};
use crate::domain::error::FactorpickError;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means a third of them, at least one.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 631,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left.as_ref() } else { right.as_ref() };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    config: &'a ForestConfig,
    max_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let n = indices.len();
        let (sum, sum_sq) = indices
            .iter()
            .fold((0.0, 0.0), |(s, q), &i| (s + self.y[i], q + self.y[i] * self.y[i]));
        let mean = sum / n as f64;
        let sse = sum_sq - sum * sum / n as f64;

        if depth >= self.config.max_depth || n < self.config.min_samples_split || sse <= 1e-12 {
            return Node::Leaf(mean);
        }

        let Some(best) = self.best_split(indices, sse, rng) else {
            return Node::Leaf(mean);
        };

        let (left, right) = partition(indices, |i| self.x[[i, best.feature]] <= best.threshold);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1, rng)),
            right: Box::new(self.build(right, depth + 1, rng)),
        }
    }

    fn best_split(&self, indices: &[usize], parent_sse: f64, rng: &mut ChaCha8Rng) -> Option<BestSplit> {
        let width = self.x.ncols();
        let mut features: Vec<usize> = (0..width).collect();
        features.shuffle(rng);
        features.truncate(self.max_features);

        let min_leaf = self.config.min_samples_leaf.max(1);
        let n = indices.len();
        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let total: f64 = sorted.iter().map(|&i| self.y[i]).sum();
            let total_sq: f64 = sorted.iter().map(|&i| self.y[i] * self.y[i]).sum();

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for k in 0..n - 1 {
                let yi = self.y[sorted[k]];
                left_sum += yi;
                left_sq += yi * yi;

                let here = self.x[[sorted[k], feature]];
                let next = self.x[[sorted[k + 1], feature]];
                let n_left = k + 1;
                let n_right = n - n_left;
                if here == next || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                if sse < parent_sse && best.as_ref().is_none_or(|b| sse < b.sse) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        sse,
                    });
                }
            }
        }
        best
    }
}

/// Reorder `indices` so rows matching `pred` come first; return both halves.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> (&mut [usize], &mut [usize]) {
    let mut split = 0;
    for k in 0..indices.len() {
        if pred(indices[k]) {
            indices.swap(split, k);
            split += 1;
        }
    }
    indices.split_at_mut(split)
}

#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<Node>,
    width: Option<usize>,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            width: None,
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Scorer for RandomForestRegressor {
    fn name(&self) -> &str {
        "forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FactorpickError> {
        let width = check_training_set(x, y)?;
        if self.config.n_trees == 0 {
            return Err(FactorpickError::model("forest needs at least one tree"));
        }
        let builder = TreeBuilder {
            x,
            y,
            config: &self.config,
            max_features: self
                .config
                .max_features
                .unwrap_or(width / 3)
                .clamp(1, width),
        };

        let n = x.nrows();
        let seed = self.config.seed;
        let trees: Vec<Node> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));
                let mut sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                builder.build(&mut sample, 0, &mut rng)
            })
            .collect();

        tracing::debug!(trees = trees.len(), rows = n, features = width, "forest fitted");
        self.trees = trees;
        self.width = Some(width);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FactorpickError> {
        let width = self.width.ok_or_else(|| not_fitted(self.name()))?;
        check_rows(x, width)?;
        let count = self.trees.len() as f64;
        Ok(x.map_axis(Axis(1), |row| {
            self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / count
        }))
    }
}
