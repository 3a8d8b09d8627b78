use rand::rngs::StdRng;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::error::{CodecError, TrainingError};

/// Hyperparameters for the random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestOptions {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Seed for bootstrap sampling and feature ordering
    pub seed: u64,
    /// Maximum tree depth, unlimited when `None`
    pub max_depth: Option<usize>,
    /// Nodes with fewer samples than this become leaves
    pub min_samples_split: usize,
    /// Averaged positive fraction a label must exceed to be predicted
    pub threshold: f64,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
            threshold: 0.5,
        }
    }
}

/// Tree node stored in a flat arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    /// Fraction of positive samples per label
    Leaf { values: Vec<f64> },
    /// Samples with `row[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A multi-output CART tree; the root is `nodes[0]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Per-label positive fractions of the leaf `row` falls into
    pub fn leaf_values(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { values } => return values,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children must be in bounds and come after their parent, which also
    /// rules out cycles
    fn check(&self, n_features: usize, n_labels: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { values } => {
                    if values.len() != n_labels {
                        return Err(format!(
                            "leaf {} has {} values, expected {}",
                            idx,
                            values.len(),
                            n_labels
                        ));
                    }
                }
                Node::Split {
                    feature, left, right, ..
                } => {
                    if *feature >= n_features {
                        return Err(format!("split {} uses feature {} of {}", idx, feature, n_features));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("split {} points to node {}", idx, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Multi-output random forest classifier over binary label columns
///
/// Every tree predicts all labels jointly. The split criterion is the sum
/// of the per-label Gini impurities, weighted by child size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_labels: usize,
    threshold: f64,
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Fit the ensemble on encoded rows `x` and indicator targets `y`
    pub fn fit(x: &[Vec<f64>], y: &[Vec<u8>], options: &ForestOptions) -> Result<Self, TrainingError> {
        if x.is_empty() || y.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        if x.len() != y.len() {
            return Err(TrainingError::Model(format!(
                "mismatched rows: {} feature rows, {} target rows",
                x.len(),
                y.len()
            )));
        }
        if options.n_estimators == 0 {
            return Err(TrainingError::Model("n_estimators must be at least 1".to_string()));
        }

        let n_features = x[0].len();
        let n_labels = y[0].len();
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(CodecError::WidthMismatch {
                expected: n_features,
                actual: row.len(),
            }
            .into());
        }
        if let Some(row) = y.iter().find(|row| row.len() != n_labels) {
            return Err(CodecError::WidthMismatch {
                expected: n_labels,
                actual: row.len(),
            }
            .into());
        }

        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(options.seed);
        let n = x.len();

        let mut trees = Vec::with_capacity(options.n_estimators);
        for _ in 0..options.n_estimators {
            let tree_seed: u64 = rng.random();
            let mut tree_rng = StdRng::seed_from_u64(tree_seed);
            let bootstrap: Vec<usize> = (0..n).map(|_| tree_rng.random_range(0..n)).collect();

            let mut builder = TreeBuilder {
                x,
                y,
                n_features,
                n_labels,
                max_features,
                max_depth: options.max_depth,
                min_samples_split: options.min_samples_split.max(2),
                rng: tree_rng,
                nodes: Vec::new(),
            };
            builder.grow(bootstrap, 0);
            trees.push(Tree { nodes: builder.nodes });
        }

        tracing::debug!(
            "Fitted forest: {} trees, {} features, {} labels, {} rows",
            trees.len(),
            n_features,
            n_labels,
            n
        );

        Ok(Self {
            n_features,
            n_labels,
            threshold: options.threshold,
            trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Width of the indicator vectors this model emits
    pub fn n_labels(&self) -> usize {
        self.n_labels
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Verify a deserialized forest can be traversed safely
    pub fn check_structure(&self) -> Result<(), CodecError> {
        if self.trees.is_empty() {
            return Err(CodecError::InvalidModel("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features, self.n_labels)
                .map_err(|reason| CodecError::InvalidModel(format!("tree {}: {}", i, reason)))?;
        }
        Ok(())
    }

    /// Averaged per-label positive fractions across all trees
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, CodecError> {
        if row.len() != self.n_features {
            return Err(CodecError::WidthMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }

        let mut sums = vec![0.0; self.n_labels];
        for tree in &self.trees {
            for (sum, value) in sums.iter_mut().zip(tree.leaf_values(row)) {
                *sum += value;
            }
        }
        let count = self.trees.len().max(1) as f64;
        Ok(sums.into_iter().map(|s| s / count).collect())
    }

    /// Indicator-vector prediction for one encoded row
    pub fn predict(&self, row: &[f64]) -> Result<Vec<u8>, CodecError> {
        Ok(self
            .predict_proba(row)?
            .into_iter()
            .map(|p| u8::from(p > self.threshold))
            .collect())
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [Vec<u8>],
    n_features: usize,
    n_labels: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `samples` and return its node index
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let n = samples.len();
        let counts = self.positive_counts(&samples);
        let values: Vec<f64> = counts.iter().map(|&c| c as f64 / n as f64).collect();

        let is_pure = counts.iter().all(|&c| c == 0 || c == n);
        let depth_exhausted = self.max_depth.is_some_and(|max| depth >= max);
        if n < self.min_samples_split || is_pure || depth_exhausted {
            return self.push(Node::Leaf { values });
        }

        let Some(split) = self.best_split(&samples, &counts) else {
            return self.push(Node::Leaf { values });
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        // Reserve the slot so children are laid out after their parent
        let idx = self.push(Node::Leaf { values: Vec::new() });
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn positive_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_labels];
        for &i in samples {
            for (count, &bit) in counts.iter_mut().zip(&self.y[i]) {
                *count += usize::from(bit != 0);
            }
        }
        counts
    }

    /// Lowest weighted impurity split over a random feature ordering
    ///
    /// At least `max_features` non-constant features are examined; the
    /// search keeps going past that until some valid split is found.
    fn best_split(&mut self, samples: &[usize], totals: &[usize]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(&mut self.rng);

        let n = samples.len();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature in features {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            let mut sorted: Vec<(f64, usize)> = samples.iter().map(|&i| (self.x[i][feature], i)).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            if sorted[0].0 == sorted[n - 1].0 {
                continue;
            }
            visited += 1;

            let mut left = vec![0usize; self.n_labels];
            for k in 0..n - 1 {
                let (value, i) = sorted[k];
                for (count, &bit) in left.iter_mut().zip(&self.y[i]) {
                    *count += usize::from(bit != 0);
                }

                let next = sorted[k + 1].0;
                if value == next {
                    continue;
                }

                let n_left = k + 1;
                let n_right = n - n_left;
                let score = n_left as f64 * gini_sum(left.iter().copied(), n_left)
                    + n_right as f64 * gini_sum(totals.iter().zip(&left).map(|(t, l)| t - l), n_right);

                if best.as_ref().map_or(true, |b| score < b.score) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }

        best
    }
}

/// Sum of binary Gini impurities over all labels of a node with `n` samples
fn gini_sum(positives: impl Iterator<Item = usize>, n: usize) -> f64 {
    let n = n as f64;
    positives
        .map(|c| {
            let p = c as f64 / n;
            2.0 * p * (1.0 - p)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like() -> (Vec<Vec<f64>>, Vec<Vec<u8>>) {
        let x = vec![
            vec![1.0, 0.0, 3.0],
            vec![1.0, 0.0, 8.0],
            vec![0.0, 1.0, 3.0],
            vec![0.0, 1.0, 8.0],
        ];
        let y = vec![vec![1, 0], vec![1, 1], vec![0, 0], vec![0, 1]];
        (x, y)
    }

    #[test]
    fn test_gini_sum() {
        assert_eq!(gini_sum([0, 4].into_iter(), 4), 0.0);
        assert!((gini_sum([2].into_iter(), 4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_leaf_traversal() {
        let tree = Tree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { values: vec![0.0] },
                Node::Leaf { values: vec![1.0] },
            ],
        };

        assert_eq!(tree.leaf_values(&[0.5]), &[0.0]);
        assert_eq!(tree.leaf_values(&[0.6]), &[1.0]);
    }

    #[test]
    fn test_forest_learns_separable_labels() {
        let (x, y) = xor_like();
        let forest = RandomForest::fit(&x, &y, &ForestOptions::default()).unwrap();

        assert_eq!(forest.n_features(), 3);
        assert_eq!(forest.n_labels(), 2);
        assert_eq!(forest.trees().len(), 100);
        // First label tracks the first one-hot column
        assert_eq!(forest.predict(&[1.0, 0.0, 5.0]).unwrap()[0], 1);
        assert_eq!(forest.predict(&[0.0, 1.0, 5.0]).unwrap()[0], 0);
    }

    #[test]
    fn test_constant_label_is_always_predicted() {
        let x = vec![vec![1.0, 2.0], vec![0.0, 9.0], vec![1.0, 4.0]];
        let y = vec![vec![1, 0], vec![1, 1], vec![1, 0]];
        let forest = RandomForest::fit(&x, &y, &ForestOptions::default()).unwrap();

        let proba = forest.predict_proba(&[0.0, 1.0]).unwrap();
        assert_eq!(proba[0], 1.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = xor_like();
        let options = ForestOptions {
            n_estimators: 10,
            ..ForestOptions::default()
        };

        let a = RandomForest::fit(&x, &y, &options).unwrap();
        let b = RandomForest::fit(&x, &y, &options).unwrap();
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = xor_like();
        let forest = RandomForest::fit(&x, &y, &ForestOptions::default()).unwrap();

        assert_eq!(
            forest.predict(&[1.0, 0.0]),
            Err(CodecError::WidthMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_check_structure() {
        let (x, y) = xor_like();
        let forest = RandomForest::fit(&x, &y, &ForestOptions::default()).unwrap();
        assert!(forest.check_structure().is_ok());

        let split = |left, right| Node::Split {
            feature: 0,
            threshold: 0.5,
            left,
            right,
        };
        let leaf = || Node::Leaf { values: vec![0.0, 1.0] };
        let with_nodes = |nodes| RandomForest {
            n_features: 3,
            n_labels: 2,
            threshold: 0.5,
            trees: vec![Tree { nodes }],
        };

        assert!(with_nodes(vec![split(1, 9), leaf()]).check_structure().is_err());
        assert!(with_nodes(vec![split(0, 1), leaf()]).check_structure().is_err());
        assert!(with_nodes(vec![Node::Leaf { values: vec![1.0] }]).check_structure().is_err());
        assert!(with_nodes(Vec::new()).check_structure().is_err());
        assert!(with_nodes(vec![split(1, 2), leaf(), leaf()]).check_structure().is_ok());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let result = RandomForest::fit(&[], &[], &ForestOptions::default());
        assert!(matches!(result, Err(TrainingError::EmptyDataset)));
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let (x, y) = xor_like();
        let options = ForestOptions {
            n_estimators: 5,
            max_depth: Some(0),
            ..ForestOptions::default()
        };
        let forest = RandomForest::fit(&x, &y, &options).unwrap();

        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
    }
}
