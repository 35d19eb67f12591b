//! Bagged regression trees for the next-game points model.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A model that maps one feature row to one number.
pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    fn predict(&self, row: &[f64]) -> f64;

    fn predict_many(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows each tree until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Nodes live in one arena; index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    at = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub params: ForestParams,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create model dir {}", parent.display()))?;
        }
        let raw = serde_json::to_string(self).context("serialize forest")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.len() != y.len() {
            bail!("feature rows ({}) and targets ({}) differ", x.len(), y.len());
        }
        if x.is_empty() {
            bail!("cannot fit a forest on zero rows");
        }
        if self.params.n_estimators == 0 {
            bail!("n_estimators must be at least 1");
        }
        let n_features = x[0].len();
        if let Some(pos) = x.iter().position(|row| row.len() != n_features) {
            bail!(
                "row {pos} has {} features, expected {n_features}",
                x[pos].len()
            );
        }

        let params = self.params;
        let n = x.len();
        self.trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let sample = (0..n).map(|_| rng.gen_range(0..n)).collect::<Vec<_>>();
                grow_tree(x, y, sample, n_features, &params)
            })
            .collect();
        self.n_features = n_features;
        Ok(())
    }

    /// Mean of the trees' predictions; NaN before `fit`.
    fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    score: f64,
}

fn grow_tree(
    x: &[Vec<f64>],
    y: &[f64],
    mut sample: Vec<usize>,
    n_features: usize,
    params: &ForestParams,
) -> RegressionTree {
    let min_leaf = params.min_samples_leaf.max(1);
    let min_split = params.min_samples_split.max(2);

    let mut nodes = vec![Node::Leaf { value: 0.0 }];
    // (node, start, end, depth) over `sample`.
    let mut stack = vec![(0usize, 0usize, sample.len(), 0usize)];

    while let Some((node, start, end, depth)) = stack.pop() {
        let slice = &mut sample[start..end];
        let mean = slice.iter().map(|&i| y[i]).sum::<f64>() / slice.len() as f64;

        let may_split =
            slice.len() >= min_split && params.max_depth.is_none_or(|max| depth < max);
        let split = if may_split {
            best_split(x, y, slice, n_features, min_leaf)
        } else {
            None
        };

        let Some(split) = split else {
            nodes[node] = Node::Leaf { value: mean };
            continue;
        };

        let mid = start + partition(slice, |i| x[i][split.feature] <= split.threshold);
        let left = nodes.len();
        nodes.push(Node::Leaf { value: 0.0 });
        let right = nodes.len();
        nodes.push(Node::Leaf { value: 0.0 });
        nodes[node] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        stack.push((left, start, mid, depth + 1));
        stack.push((right, mid, end, depth + 1));
    }

    RegressionTree { nodes }
}

/// Maximizes `sum_l^2/n_l + sum_r^2/n_r`, which is the same as minimizing the
/// children's squared error.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    idx: &[usize],
    n_features: usize,
    min_leaf: usize,
) -> Option<Split> {
    let n = idx.len();
    let total: f64 = idx.iter().map(|&i| y[i]).sum();
    let parent = total * total / n as f64;
    let tolerance = 1e-12 * parent.abs().max(1.0);

    let mut order = idx.to_vec();
    let mut best: Option<Split> = None;

    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += y[order[k]];
            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let here = x[order[k]][feature];
            let next = x[order[k + 1]][feature];
            if next <= here {
                continue;
            }
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if score <= parent + tolerance {
                continue;
            }
            if best.as_ref().is_none_or(|b| score > b.score) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next || threshold.is_nan() {
                    threshold = here;
                }
                best = Some(Split {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}

fn partition(slice: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..slice.len() {
        let item = slice[i];
        if goes_left(item) {
            slice.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
