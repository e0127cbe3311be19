use super::tree::{RegressionTree, TreeParams};
use super::{logit, sigmoid};
use crate::pipeline::config::BoostingParams;
use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Gradient-boosted trees on the logistic loss. Trees add up in log-odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &BoostingParams, seed: u64) -> Self {
        let n = x.nrows();
        let base_score = logit(y.mean().unwrap_or(0.5));
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: 1,
            min_child_weight: params.min_child_weight,
            lambda: params.lambda,
            max_features: None,
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let mut margin = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_rounds);

        for round in 0..params.n_rounds {
            for i in 0..n {
                let p = sigmoid(margin[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }
            let rows = (0..n).collect();
            let mut tree = RegressionTree::fit(x, &grad, &hess, rows, &tree_params, &mut rng);
            tree.scale_leaves(params.learning_rate);
            if tree.nodes.len() == 1 {
                log::debug!("Boosting stopped after {} rounds: no split improves the loss", round);
                break;
            }
            for (i, row) in x.rows().into_iter().enumerate() {
                margin[i] += tree.predict(row);
            }
            trees.push(tree);
        }

        Self { base_score, trees }
    }

    pub fn margin(&self, x: ArrayView1<f64>) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    pub fn predict_proba(&self, x: ArrayView1<f64>) -> f64 {
        sigmoid(self.margin(x))
    }

    /// Expected margin under the training covers.
    pub fn expected_margin(&self) -> f64 {
        self.base_score + self.trees.iter().map(RegressionTree::expected_value).sum::<f64>()
    }
}
