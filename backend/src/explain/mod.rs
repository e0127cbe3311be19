//! SHAP attributions per model family, reported per applicant field in
//! probability-of-good-payer space.

pub mod kernel;
pub mod service;
pub mod tree_shap;

use crate::models::sigmoid;
use crate::pipeline::config::ExplainConfig;
use crate::pipeline::model::{Estimator, InferenceError, TrainedModel};
use crate::render::RenderError;
use kernel::PermutationSampler;
use ndarray::{Array1, ArrayView1, ArrayView2};
use shared::ModelId;
use std::ops::Range;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Explanation for {0} exceeded its time budget")]
    Timeout(ModelId),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("No registered model {0}")]
    MissingModel(ModelId),
    #[error("Explainer does not support the {0} estimator")]
    Unsupported(&'static str),
    #[error("Explanation worker failed: {0}")]
    Worker(String),
}

/// Attribution strategy, fixed per model when the registry is built.
#[derive(Debug, Clone)]
pub enum Explainer {
    /// Exact interventional values of a linear score.
    Linear { background_mean: Array1<f64> },
    /// Path-dependent TreeSHAP over the training covers.
    Tree,
    /// Permutation sampling against a background sample.
    Kernel(PermutationSampler),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub base_value: f64,
    /// One value per field group, in schema order.
    pub values: Vec<f64>,
    /// Model output; `base_value + sum(values)`.
    pub output: f64,
}

impl Explanation {
    pub fn additivity_gap(&self) -> f64 {
        (self.base_value + self.values.iter().sum::<f64>() - self.output).abs()
    }
}

fn family(estimator: &Estimator) -> &'static str {
    match estimator {
        Estimator::Logistic(_) => "logistic",
        Estimator::Forest(_) => "forest",
        Estimator::Boosted(_) => "boosted",
        Estimator::Mlp(_) => "mlp",
    }
}

fn group_sum(phi: &[f64], groups: &[Range<usize>]) -> Vec<f64> {
    groups.iter().map(|range| phi[range.clone()].iter().sum()).collect()
}

/// Maps log-odds attributions onto probabilities, keeping their proportions.
fn margin_to_probability(base_margin: f64, output_margin: f64, values: Vec<f64>) -> Explanation {
    let base_value = sigmoid(base_margin);
    let output = sigmoid(output_margin);
    let total: f64 = values.iter().sum();
    let factor = if total.abs() > 1e-12 {
        (output - base_value) / total
    } else {
        base_value * (1.0 - base_value)
    };
    Explanation {
        base_value,
        values: values.into_iter().map(|v| v * factor).collect(),
        output,
    }
}

impl Explainer {
    pub fn for_model(
        model: &TrainedModel,
        background: ArrayView2<f64>,
        config: &ExplainConfig,
    ) -> Result<Self, InferenceError> {
        Ok(match &model.estimator {
            Estimator::Logistic(_) => {
                let prepared = model.prepare_matrix(background)?;
                let background_mean = prepared
                    .mean_axis(ndarray::Axis(0))
                    .unwrap_or_else(|| Array1::zeros(model.n_features));
                Explainer::Linear { background_mean }
            }
            Estimator::Forest(_) | Estimator::Boosted(_) => Explainer::Tree,
            Estimator::Mlp(_) => {
                let prepared = model.prepare_matrix(background)?;
                let walks = config.permutations.div_ceil(2);
                Explainer::Kernel(PermutationSampler::new(prepared, walks))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Explainer::Linear { .. } => "linear",
            Explainer::Tree => "tree",
            Explainer::Kernel(_) => "kernel",
        }
    }

    /// Explains one encoded row. `groups` are column ranges over the encoded
    /// features, usually `FeatureSchema::field_groups`.
    pub fn explain(
        &self,
        id: ModelId,
        model: &TrainedModel,
        x: ArrayView1<f64>,
        groups: &[Range<usize>],
        deadline: Option<Instant>,
    ) -> Result<Explanation, ExplainError> {
        let z = model.prepare(x)?;
        let explanation = match (self, &model.estimator) {
            (Explainer::Linear { background_mean }, Estimator::Logistic(lr)) => {
                let phi: Vec<f64> = lr
                    .weights
                    .iter()
                    .zip(z.iter().zip(background_mean.iter()))
                    .map(|(w, (zi, mi))| w * (zi - mi))
                    .collect();
                let base_margin = lr.decision(background_mean.view());
                margin_to_probability(base_margin, lr.decision(z.view()), group_sum(&phi, groups))
            }
            (Explainer::Tree, Estimator::Forest(forest)) => {
                let mut phi = vec![0.0; z.len()];
                for tree in &forest.trees {
                    tree_shap::accumulate(tree, z.view(), &mut phi);
                }
                let n = forest.trees.len().max(1) as f64;
                phi.iter_mut().for_each(|v| *v /= n);
                Explanation {
                    base_value: forest.expected_value(),
                    values: group_sum(&phi, groups),
                    output: forest.predict_proba(z.view()),
                }
            }
            (Explainer::Tree, Estimator::Boosted(booster)) => {
                let mut phi = vec![0.0; z.len()];
                for tree in &booster.trees {
                    tree_shap::accumulate(tree, z.view(), &mut phi);
                }
                margin_to_probability(
                    booster.expected_margin(),
                    booster.margin(z.view()),
                    group_sum(&phi, groups),
                )
            }
            (Explainer::Kernel(sampler), estimator) => {
                let f = |row: ArrayView1<f64>| model.score_prepared(row);
                let values = sampler
                    .shapley(f, z.view(), groups, deadline)
                    .map_err(|_| ExplainError::Timeout(id))?;
                log::debug!("Sampled {} explanation for {}", family(estimator), id);
                Explanation {
                    base_value: sampler.expected_value(f),
                    values: values.to_vec(),
                    output: model.score_prepared(z.view()),
                }
            }
            (_, estimator) => return Err(ExplainError::Unsupported(family(estimator))),
        };

        if !explanation.output.is_finite() || explanation.values.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite(explanation.output).into());
        }
        Ok(explanation)
    }
}

/// Display value of each field for one encoded row: the column itself for
/// single-column fields, the index of the active category for one-hot ones.
pub fn field_values(x: ArrayView1<f64>, groups: &[Range<usize>]) -> Vec<f64> {
    groups
        .iter()
        .map(|range| {
            if range.len() == 1 {
                x[range.start]
            } else {
                range
                    .clone()
                    .position(|col| x[col] > 0.5)
                    .map(|p| p as f64)
                    .unwrap_or(0.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encoder::CURRENT_SCHEMA;
    use crate::testing::tiny_artifact;

    fn groups() -> Vec<Range<usize>> {
        CURRENT_SCHEMA.field_groups().into_iter().map(|(_, r)| r).collect()
    }

    #[test]
    fn every_family_is_additive_in_probability_space() {
        let artifact = tiny_artifact();
        let config = ExplainConfig {
            permutations: 2,
            ..ExplainConfig::default()
        };
        let groups = groups();

        for entry in &artifact.models {
            let explainer =
                Explainer::for_model(&entry.model, artifact.background.view(), &config).unwrap();
            for row in artifact.summary_rows.rows().into_iter().take(3) {
                let e = explainer.explain(entry.id, &entry.model, row, &groups, None).unwrap();
                assert_eq!(e.values.len(), 20);
                assert!(e.additivity_gap() < 1e-6, "{} gap {}", entry.id, e.additivity_gap());
                let p = entry.model.predict_proba(row).unwrap();
                assert!((e.output - p).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn explainer_choice_follows_the_estimator() {
        let artifact = tiny_artifact();
        let names: Vec<&str> = artifact
            .models
            .iter()
            .map(|m| {
                let config = ExplainConfig::default();
                Explainer::for_model(&m.model, artifact.background.view(), &config)
                    .unwrap()
                    .name()
            })
            .collect();
        assert_eq!(names, ["linear", "tree", "tree", "kernel"]);
    }

    #[test]
    fn one_hot_fields_report_the_active_category() {
        let x = ndarray::array![1.0, 0.0, 0.0, 1.0, 7.0];
        let values = field_values(x.view(), &[0..1, 1..4, 4..5]);
        assert_eq!(values, vec![1.0, 2.0, 7.0]);
    }
}
