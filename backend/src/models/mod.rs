//! Binary classifiers implemented on `ndarray`. Every estimator outputs
//! P(good payer) for one encoded applicant.

pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod mlp;
pub mod tree;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use logistic::LogisticRegression;
pub use mlp::Mlp;

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Natural log of the odds, clamped away from 0 and 1.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Two informative columns plus noise; label is 1 when `x0 + 0.5 x1 > 0`.
    pub(crate) fn separable(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 4), |_| rng.random_range(-1.0..1.0));
        let y = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + 0.5 * row[1] > 0.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    pub(crate) fn accuracy(scores: &[f64], y: &Array1<f64>) -> f64 {
        let hits = scores
            .iter()
            .zip(y.iter())
            .filter(|(p, t)| (**p >= 0.5) == (**t == 1.0))
            .count();
        hits as f64 / y.len() as f64
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0).is_finite());
        assert!(sigmoid(800.0) <= 1.0);
        assert!((sigmoid(logit(0.8)) - 0.8).abs() < 1e-12);
    }
}
