use super::sigmoid;
use crate::pipeline::config::MlpParams;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Feed-forward network: one ReLU hidden layer and a sigmoid output unit,
/// trained with mini-batch SGD on the cross-entropy loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    /// `inputs x hidden`
    pub w1: Array2<f64>,
    pub b1: Array1<f64>,
    pub w2: Array1<f64>,
    pub b2: f64,
}

fn glorot<R: Rng>(
    rng: &mut R,
    fan_in: usize,
    fan_out: usize,
    shape: (usize, usize),
) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::from_shape_fn(shape, |_| rng.random_range(-limit..limit))
}

impl Mlp {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &MlpParams, seed: u64) -> Self {
        let (n, d) = x.dim();
        let hidden = params.hidden.max(1);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut model = Self {
            w1: glorot(&mut rng, d, hidden, (d, hidden)),
            b1: Array1::zeros(hidden),
            w2: glorot(&mut rng, hidden, 1, (hidden, 1)).column(0).to_owned(),
            b2: 0.0,
        };

        let batch_size = params.batch_size.max(1);
        let mut order: Vec<usize> = (0..n).collect();
        for _ in 0..params.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                model.step(xb.view(), yb.view(), params);
            }
        }
        model
    }

    fn step(&mut self, xb: ArrayView2<f64>, yb: ArrayView1<f64>, params: &MlpParams) {
        let m = xb.nrows() as f64;
        let pre = xb.dot(&self.w1) + &self.b1;
        let act = pre.mapv(|v| v.max(0.0));
        let out = act.dot(&self.w2) + self.b2;
        let delta = out.mapv(sigmoid) - &yb;

        let grad_w2 = act.t().dot(&delta) / m + &self.w2 * params.l2;
        let grad_b2 = delta.sum() / m;

        let back = delta
            .view()
            .insert_axis(Axis(1))
            .dot(&self.w2.view().insert_axis(Axis(0)));
        let dpre = back * pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let grad_w1 = xb.t().dot(&dpre) / m + &self.w1 * params.l2;
        let grad_b1 = dpre.sum_axis(Axis(0)) / m;

        let lr = params.learning_rate;
        self.w1.scaled_add(-lr, &grad_w1);
        self.b1.scaled_add(-lr, &grad_b1);
        self.w2.scaled_add(-lr, &grad_w2);
        self.b2 -= lr * grad_b2;
    }

    pub fn predict_proba(&self, x: ArrayView1<f64>) -> f64 {
        let act = (x.dot(&self.w1) + &self.b1).mapv(|v| v.max(0.0));
        sigmoid(act.dot(&self.w2) + self.b2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{accuracy, separable};

    #[test]
    fn mlp_learns_a_linear_boundary() {
        let (x, y) = separable(400, 21);
        let params = MlpParams {
            hidden: 8,
            epochs: 80,
            batch_size: 16,
            learning_rate: 0.1,
            l2: 1e-5,
        };
        let model = Mlp::fit(x.view(), y.view(), &params, 42);
        assert_eq!(model.w1.nrows(), 4);

        let scores: Vec<f64> = x.rows().into_iter().map(|r| model.predict_proba(r)).collect();
        assert!(accuracy(&scores, &y) > 0.9);
    }

    #[test]
    fn training_is_reproducible() {
        let (x, y) = separable(60, 4);
        let params = MlpParams {
            epochs: 3,
            ..MlpParams::default()
        };
        assert_eq!(
            Mlp::fit(x.view(), y.view(), &params, 7),
            Mlp::fit(x.view(), y.view(), &params, 7)
        );
    }
}
