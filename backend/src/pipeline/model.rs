use crate::models::{GradientBoosting, LogisticRegression, Mlp, RandomForest};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use shared::PayerLabel;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("Expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Model produced a non-finite score ({0})")]
    NonFinite(f64),
}

/// Per-column z-score fitted on the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl Scaler {
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let d = x.ncols();
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        let std = if x.nrows() > 0 {
            x.std_axis(Axis(0), 0.0)
        } else {
            Array1::ones(d)
        };
        // constant columns pass through centred
        let std = std.mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn transform(&self, x: ArrayView1<f64>) -> Array1<f64> {
        (&x - &self.mean) / &self.std
    }

    pub fn transform_matrix(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.std
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Estimator {
    Logistic(LogisticRegression),
    Forest(RandomForest),
    Boosted(GradientBoosting),
    Mlp(Mlp),
}

/// Optional scaler followed by one estimator; consumes encoded features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub n_features: usize,
    pub scaler: Option<Scaler>,
    pub estimator: Estimator,
}

impl TrainedModel {
    /// Applies the scaler, if any. Tree explainers and the sampler work on
    /// this space.
    pub fn prepare(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, InferenceError> {
        if x.len() != self.n_features {
            return Err(InferenceError::DimensionMismatch {
                expected: self.n_features,
                got: x.len(),
            });
        }
        Ok(match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => x.to_owned(),
        })
    }

    pub fn prepare_matrix(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, InferenceError> {
        if x.ncols() != self.n_features {
            return Err(InferenceError::DimensionMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        Ok(match &self.scaler {
            Some(scaler) => scaler.transform_matrix(x),
            None => x.to_owned(),
        })
    }

    /// P(good payer) for an already prepared row.
    pub fn score_prepared(&self, z: ArrayView1<f64>) -> f64 {
        match &self.estimator {
            Estimator::Logistic(m) => m.predict_proba(z),
            Estimator::Forest(m) => m.predict_proba(z),
            Estimator::Boosted(m) => m.predict_proba(z),
            Estimator::Mlp(m) => m.predict_proba(z),
        }
    }

    pub fn predict_proba(&self, x: ArrayView1<f64>) -> Result<f64, InferenceError> {
        let z = self.prepare(x)?;
        let p = self.score_prepared(z.view());
        if p.is_finite() {
            Ok(p)
        } else {
            Err(InferenceError::NonFinite(p))
        }
    }

    pub fn predict_label(
        &self,
        x: ArrayView1<f64>,
        threshold: f64,
    ) -> Result<PayerLabel, InferenceError> {
        self.predict_proba(x).map(|p| label_for(p, threshold))
    }
}

pub fn label_for(probability: f64, threshold: f64) -> PayerLabel {
    if probability >= threshold {
        PayerLabel::Good
    } else {
        PayerLabel::Bad
    }
}
