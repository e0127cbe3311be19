use super::sigmoid;
use crate::pipeline::config::LogisticParams;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// L2-regularised logistic regression fit by full-batch gradient descent.
/// Expects standardised inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Array1<f64>,
    pub bias: f64,
}

impl LogisticRegression {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &LogisticParams) -> Self {
        let (n, d) = x.dim();
        let mut weights = Array1::<f64>::zeros(d);
        let mut bias = 0.0;
        if n == 0 {
            return Self { weights, bias };
        }

        for _ in 0..params.epochs {
            let z = x.dot(&weights) + bias;
            let residual = z.mapv(sigmoid) - &y;
            let grad_w = x.t().dot(&residual) / n as f64 + &weights * params.l2;
            let grad_b = residual.sum() / n as f64;
            weights.scaled_add(-params.learning_rate, &grad_w);
            bias -= params.learning_rate * grad_b;
        }

        Self { weights, bias }
    }

    pub fn decision(&self, x: ArrayView1<f64>) -> f64 {
        self.weights.dot(&x) + self.bias
    }

    pub fn predict_proba(&self, x: ArrayView1<f64>) -> f64 {
        sigmoid(self.decision(x))
    }
}
