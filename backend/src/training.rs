use crate::data::{Dataset, DatasetError};
use crate::models::{GradientBoosting, LogisticRegression, Mlp, RandomForest};
use crate::pipeline::config::ServiceConfig;
use crate::pipeline::encoder::CURRENT_SCHEMA;
use crate::pipeline::evaluation::evaluate;
use crate::pipeline::model::{Estimator, InferenceError, Scaler, TrainedModel};
use crate::storage::artifact::{ArtifactError, ModelArtifact, ModelEntry};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use shared::{ModelId, ModelMetrics};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Model {model} failed on the held-out split: {source}")]
    Inference {
        model: ModelId,
        source: InferenceError,
    },
    #[error("Need at least 10 labelled rows to train, got {0}")]
    TooSmall(usize),
    #[error("No artifact at {0} and training at startup is disabled")]
    MissingArtifact(PathBuf),
}

fn fit_estimator(
    id: ModelId,
    x_train: ArrayView2<f64>,
    y_train: &Array1<f64>,
    config: &ServiceConfig,
) -> TrainedModel {
    let params = &config.training;
    let seed = config.dataset.seed;
    let n_features = x_train.ncols();

    match id {
        ModelId::LogisticRegression | ModelId::Mlp => {
            let scaler = Scaler::fit(x_train);
            let z = scaler.transform_matrix(x_train);
            let estimator = if id == ModelId::Mlp {
                let seed = seed.wrapping_add(2);
                Estimator::Mlp(Mlp::fit(z.view(), y_train.view(), &params.mlp, seed))
            } else {
                let logistic = LogisticRegression::fit(z.view(), y_train.view(), &params.logistic);
                Estimator::Logistic(logistic)
            };
            TrainedModel {
                n_features,
                scaler: Some(scaler),
                estimator,
            }
        }
        ModelId::RandomForest => TrainedModel {
            n_features,
            scaler: None,
            estimator: Estimator::Forest(RandomForest::fit(
                x_train,
                y_train.view(),
                &params.forest,
                seed,
            )),
        },
        ModelId::XgBoost => TrainedModel {
            n_features,
            scaler: None,
            estimator: Estimator::Boosted(GradientBoosting::fit(
                x_train,
                y_train.view(),
                &params.boosting,
                seed.wrapping_add(1),
            )),
        },
    }
}

/// Splits the sample, fits all four models and evaluates them on the
/// held-out rows.
pub fn train_models(
    dataset: &Dataset,
    config: &ServiceConfig,
) -> Result<ModelArtifact, TrainingError> {
    if dataset.len() < 10 {
        return Err(TrainingError::TooSmall(dataset.len()));
    }
    let (train_rows, test_rows) = dataset.split(config.dataset.test_fraction, config.dataset.seed);
    let (x_train, y_train) = dataset.encode(&CURRENT_SCHEMA, &train_rows)?;
    let (x_test, y_test) = dataset.encode(&CURRENT_SCHEMA, &test_rows)?;
    let y_train: Array1<f64> = y_train.iter().map(|&v| f64::from(v)).collect();
    log::info!(
        "Training on {} rows, evaluating on {} rows, {} features",
        train_rows.len(),
        test_rows.len(),
        CURRENT_SCHEMA.width()
    );

    let mut models = Vec::with_capacity(ModelId::ALL.len());
    for id in ModelId::ALL {
        let started = Instant::now();
        let model = fit_estimator(id, x_train.view(), &y_train, config);
        let training_time = started.elapsed().as_secs_f64();

        let threshold = config.training.threshold(id);
        let y_pred = x_test
            .axis_iter(Axis(0))
            .map(|row| model.predict_label(row, threshold).map(|label| label.class()))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|source| TrainingError::Inference { model: id, source })?;
        let (classification_report, confusion_matrix) = evaluate(&y_test, &y_pred);
        log::info!(
            "Trained {} in {:.2}s, held-out accuracy {:.3}",
            id,
            training_time,
            classification_report.accuracy
        );

        models.push(ModelEntry {
            id,
            threshold,
            model,
            metrics: ModelMetrics {
                classification_report,
                confusion_matrix,
                training_time,
                threshold,
            },
        });
    }

    let background = head(&x_train, config.explain.background_size);
    let summary_rows = head(&x_test, config.explain.summary_rows);
    Ok(ModelArtifact::new(CURRENT_SCHEMA.clone(), background, summary_rows, models)?)
}

fn head(x: &Array2<f64>, n: usize) -> Array2<f64> {
    x.slice(s![..n.min(x.nrows()), ..]).to_owned()
}

/// Loads the configured artifact, training and saving a fresh one when it is
/// missing and `artifact.train_if_missing` is set.
pub fn load_or_train(
    config: &ServiceConfig,
    dataset: &Dataset,
) -> Result<ModelArtifact, TrainingError> {
    let path = &config.artifact.path;
    if path.exists() {
        let artifact = ModelArtifact::load(path)?;
        log::info!("Loaded model artifact {} from {}", artifact.version, path.display());
        return Ok(artifact);
    }
    if !config.artifact.train_if_missing {
        return Err(TrainingError::MissingArtifact(path.clone()));
    }
    log::warn!("No model artifact at {}, training a new one", path.display());
    let artifact = train_models(dataset, config)?;
    artifact.save(path)?;
    Ok(artifact)
}
