//! Random forest of CART trees
//!
//! Each tree is grown on a bootstrap sample with a random feature subset per
//! split and Gini impurity as the split criterion. All randomness flows from
//! one seeded generator, so the same data and seed rebuild the same forest.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of candidate features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().round() as usize,
            MaxFeatures::Log2 => n.log2().round() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Hyperparameters for [`RandomForest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    /// Fraction of churners among the training rows that reached this leaf
    Leaf { value: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_one(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on validated, non-empty data with binary labels
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: &ForestParams) -> Self {
        let mut master = StdRng::seed_from_u64(params.random_state);
        let n = rows.len();
        let n_features = rows.first().map(Vec::len).unwrap_or(0);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(master.gen());
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    rows,
                    labels,
                    params,
                    n_candidates: params.max_features.resolve(n_features),
                    n_features,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(bootstrap, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Self { trees }
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let n_trees = self.trees.len().max(1) as f64;
        rows.iter()
            .map(|row| self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>() / n_trees)
            .collect()
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    params: &'a ForestParams,
    n_candidates: usize,
    n_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `samples` and return its node index
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let positives = samples.iter().filter(|&&i| self.labels[i] == 1).count();
        let value = positives as f64 / samples.len().max(1) as f64;

        let pure = positives == 0 || positives == samples.len();
        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split {
            return self.leaf(value);
        }

        let best = match self.best_split(&samples) {
            Some(best) => best,
            None => return self.leaf(value),
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.rows[i][best.feature] <= best.threshold);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value });
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn leaf(&mut self, value: f64) -> usize {
        self.nodes.push(Node::Leaf { value });
        self.nodes.len() - 1
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<BestSplit> {
        let candidates = sample(&mut self.rng, self.n_features, self.n_candidates).into_vec();
        let total = samples.len() as f64;
        let total_pos = samples.iter().filter(|&&i| self.labels[i] == 1).count() as f64;
        let mut best: Option<BestSplit> = None;

        for feature in candidates {
            let mut sorted: Vec<(f64, u8)> = samples
                .iter()
                .map(|&i| (self.rows[i][feature], self.labels[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_n = 0.0;
            let mut left_pos = 0.0;
            for w in 0..sorted.len() - 1 {
                left_n += 1.0;
                left_pos += f64::from(sorted[w].1);
                let (here, next) = (sorted[w].0, sorted[w + 1].0);
                if here == next {
                    continue;
                }

                let right_n = total - left_n;
                let right_pos = total_pos - left_pos;
                let impurity = (left_n * gini(left_pos, left_n) + right_n * gini(right_pos, right_n)) / total;

                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        impurity,
                    });
                }
            }
        }

        // Splits that do not reduce impurity make no progress
        let parent = gini(total_pos, total);
        best.filter(|b| b.impurity < parent)
    }
}

fn gini(positives: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let p = positives / n;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}
