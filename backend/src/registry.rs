use crate::cache::SummaryCache;
use crate::explain::Explainer;
use crate::pipeline::config::ExplainConfig;
use crate::pipeline::encoder::{EncodeError, FeatureSchema};
use crate::pipeline::model::{InferenceError, TrainedModel};
use crate::storage::artifact::ModelArtifact;
use ndarray::{Array1, Array2};
use shared::{ApplicantRecord, ModelId, ModelMetrics};
use std::collections::BTreeMap;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),
    #[error("Artifact has no entry for {0}")]
    MissingModel(ModelId),
    #[error("Failed to prepare the {model} explainer: {source}")]
    Explainer {
        model: ModelId,
        source: InferenceError,
    },
}

#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub id: ModelId,
    pub model: TrainedModel,
    pub explainer: Explainer,
    pub metrics: ModelMetrics,
    pub threshold: f64,
}

/// The four served models, built once from an artifact and shared read-only.
#[derive(Debug)]
pub struct ModelRegistry {
    version: String,
    schema: FeatureSchema,
    groups: Vec<Range<usize>>,
    field_names: Vec<String>,
    models: BTreeMap<ModelId, RegisteredModel>,
    summary_rows: Array2<f64>,
    explain: ExplainConfig,
    summary_cache: SummaryCache,
}

impl ModelRegistry {
    pub fn from_artifact(
        artifact: ModelArtifact,
        explain: ExplainConfig,
    ) -> Result<Self, RegistryError> {
        let mut models = BTreeMap::new();
        for id in ModelId::ALL {
            let entry = artifact
                .model(id)
                .ok_or(RegistryError::MissingModel(id))?
                .clone();
            let explainer = Explainer::for_model(&entry.model, artifact.background.view(), &explain)
                .map_err(|source| RegistryError::Explainer { model: id, source })?;
            log::info!("Registered {} with the {} explainer", id, explainer.name());
            models.insert(
                id,
                RegisteredModel {
                    id,
                    model: entry.model,
                    explainer,
                    metrics: entry.metrics,
                    threshold: entry.threshold,
                },
            );
        }

        let (field_names, groups): (Vec<String>, Vec<Range<usize>>) =
            artifact.schema.field_groups().into_iter().unzip();
        Ok(Self {
            summary_cache: SummaryCache::new(artifact.version.clone()),
            version: artifact.version,
            schema: artifact.schema,
            groups,
            field_names,
            models,
            summary_rows: artifact.summary_rows,
            explain,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolves a model name from a request path.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredModel, RegistryError> {
        ModelId::from_str(name)
            .ok()
            .and_then(|id| self.models.get(&id))
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    pub fn get(&self, id: ModelId) -> Option<&RegisteredModel> {
        self.models.get(&id)
    }

    pub fn models(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.values()
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.models.keys().copied().collect()
    }

    pub fn encode(&self, record: &ApplicantRecord) -> Result<Array1<f64>, EncodeError> {
        self.schema.encode(record)
    }

    /// Encoded column range of each applicant field.
    pub fn groups(&self) -> &[Range<usize>] {
        &self.groups
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn summary_rows(&self) -> &Array2<f64> {
        &self.summary_rows
    }

    pub fn explain_config(&self) -> &ExplainConfig {
        &self.explain
    }

    pub fn explain_timeout(&self) -> Duration {
        Duration::from_millis(self.explain.timeout_ms)
    }

    pub fn summary_cache(&self) -> &SummaryCache {
        &self.summary_cache
    }
}
