use crate::pipeline::encoder::EncodeError;
use crate::registry::ModelRegistry;
use shared::{ApplicantRecord, ModelPrediction, PredictionResponse};

/// Encodes the record once and asks every registered model for a label.
/// A model that fails contributes an error entry instead of a label.
pub fn predict_record(
    registry: &ModelRegistry,
    record: &ApplicantRecord,
) -> Result<PredictionResponse, EncodeError> {
    let x = registry.encode(record)?;
    Ok(registry
        .models()
        .map(|entry| {
            let prediction = match entry.model.predict_label(x.view(), entry.threshold) {
                Ok(label) => ModelPrediction::Label(label),
                Err(e) => {
                    log::warn!("Model {} failed to predict: {}", entry.id, e);
                    ModelPrediction::Failed { error: e.to_string() }
                }
            };
            (entry.id, prediction)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encoder::tests::sample_record;
    use crate::testing::{registry_with_broken_logistic, tiny_registry};
    use shared::ModelId;

    #[test]
    fn every_model_labels_a_valid_record() {
        let registry = tiny_registry();
        let response = predict_record(&registry, &sample_record()).unwrap();
        assert_eq!(response.len(), 4);
        assert!(response.values().all(|p| matches!(p, ModelPrediction::Label(_))));
    }

    #[test]
    fn failing_model_becomes_an_error_entry() {
        let registry = registry_with_broken_logistic();
        let response = predict_record(&registry, &sample_record()).unwrap();
        match &response[&ModelId::LogisticRegression] {
            ModelPrediction::Failed { error } => assert!(error.contains("non-finite")),
            other => panic!("expected an error entry, got {:?}", other),
        }
        assert!(matches!(response[&ModelId::Mlp], ModelPrediction::Label(_)));
    }
}
