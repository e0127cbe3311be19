use super::tree::{RegressionTree, TreeParams};
use crate::pipeline::config::ForestParams;
use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Bagged classification trees. Leaves hold the bootstrap frequency of the
/// good-payer class, so the averaged output is already a probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &ForestParams, seed: u64) -> Self {
        let n = x.nrows();
        let d = x.ncols();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            min_child_weight: 0.0,
            lambda: 0.0,
            max_features: Some(
                params
                    .max_features
                    .unwrap_or_else(|| ((d as f64).sqrt().round() as usize).max(1)),
            ),
        };
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; n];

        let mut rng = StdRng::seed_from_u64(seed);
        let trees = (0..params.n_trees)
            .map(|_| {
                let rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                RegressionTree::fit(x, &grad, &hess, rows, &tree_params, &mut rng)
            })
            .collect();
        Self { trees }
    }

    pub fn predict_proba(&self, x: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        total / self.trees.len() as f64
    }

    pub fn expected_value(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(RegressionTree::expected_value).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{accuracy, separable};

    #[test]
    fn forest_learns_a_linear_boundary() {
        let (x, y) = separable(400, 3);
        let params = ForestParams {
            n_trees: 15,
            max_depth: 6,
            min_samples_leaf: 2,
            max_features: Some(2),
        };
        let forest = RandomForest::fit(x.view(), y.view(), &params, 42);
        assert_eq!(forest.trees.len(), 15);

        let scores: Vec<f64> = x.rows().into_iter().map(|r| forest.predict_proba(r)).collect();
        assert!(scores.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(accuracy(&scores, &y) > 0.9);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = separable(100, 5);
        let params = ForestParams {
            n_trees: 4,
            ..ForestParams::default()
        };
        let a = RandomForest::fit(x.view(), y.view(), &params, 9);
        let b = RandomForest::fit(x.view(), y.view(), &params, 9);
        assert_eq!(a, b);
    }
}
