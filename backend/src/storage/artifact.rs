use crate::pipeline::encoder::{CURRENT_SCHEMA, FeatureSchema};
use crate::pipeline::model::TrainedModel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{ModelId, ModelMetrics};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to access artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Artifact fingerprint mismatch: recorded {recorded}, computed {computed}")]
    FingerprintMismatch { recorded: String, computed: String },
    #[error("Artifact schema {found} does not match the encoder schema {expected}")]
    SchemaMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub threshold: f64,
    pub model: TrainedModel,
    pub metrics: ModelMetrics,
}

/// Everything the server needs at startup, produced by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// SHA-256 of every other field.
    pub version: String,
    pub created_at: String,
    pub schema: FeatureSchema,
    /// Encoded training rows used as the SHAP background.
    pub background: Array2<f64>,
    /// Encoded held-out rows explained for the summary plots.
    pub summary_rows: Array2<f64>,
    pub models: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct Content<'a> {
    created_at: &'a str,
    schema: &'a FeatureSchema,
    background: &'a Array2<f64>,
    summary_rows: &'a Array2<f64>,
    models: &'a [ModelEntry],
}

impl ModelArtifact {
    pub fn new(
        schema: FeatureSchema,
        background: Array2<f64>,
        summary_rows: Array2<f64>,
        models: Vec<ModelEntry>,
    ) -> Result<Self, ArtifactError> {
        let mut artifact = Self {
            version: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            schema,
            background,
            summary_rows,
            models,
        };
        artifact.version = artifact.fingerprint()?;
        Ok(artifact)
    }

    pub fn fingerprint(&self) -> Result<String, ArtifactError> {
        let content = Content {
            created_at: &self.created_at,
            schema: &self.schema,
            background: &self.background,
            summary_rows: &self.summary_rows,
            models: &self.models,
        };
        let bytes = serde_json::to_vec(&content)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn model(&self, id: ModelId) -> Option<&ModelEntry> {
        self.models.iter().find(|entry| entry.id == id)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let io_err = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(path, bytes).map_err(io_err)?;
        log::info!("Saved model artifact {} to {}", self.version, path.display());
        Ok(())
    }

    /// Reads an artifact and checks it was neither altered nor built for a
    /// different feature schema.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        artifact.verify()?;
        Ok(artifact)
    }

    pub fn verify(&self) -> Result<(), ArtifactError> {
        let computed = self.fingerprint()?;
        if computed != self.version {
            return Err(ArtifactError::FingerprintMismatch {
                recorded: self.version.clone(),
                computed,
            });
        }
        let expected = CURRENT_SCHEMA.fingerprint();
        let found = self.schema.fingerprint();
        if expected != found {
            return Err(ArtifactError::SchemaMismatch { expected, found });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_artifact;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("credit-artifact-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn save_then_load_verifies_fingerprint() {
        let artifact = tiny_artifact().clone();
        let path = temp_path();
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.version, artifact.version);
        assert_eq!(loaded.models.len(), 4);
        assert!(loaded.model(ModelId::Mlp).is_some());
    }

    #[test]
    fn tampered_artifact_is_rejected() {
        let mut artifact = tiny_artifact().clone();
        artifact.models[0].threshold = 0.9;
        assert!(matches!(
            artifact.verify(),
            Err(ArtifactError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let artifact = tiny_artifact();
        let mut fields = artifact.schema.fields.clone();
        fields.pop();
        let rebuilt = ModelArtifact::new(
            FeatureSchema::from_fields(fields),
            artifact.background.clone(),
            artifact.summary_rows.clone(),
            artifact.models.clone(),
        )
        .unwrap();
        assert!(matches!(rebuilt.verify(), Err(ArtifactError::SchemaMismatch { .. })));
    }
}
