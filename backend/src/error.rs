//! JSON error responses shared by every endpoint.

use crate::explain::ExplainError;
use crate::pipeline::encoder::EncodeError;
use crate::registry::RegistryError;
use crate::validation::ValidationErrors;
use actix_web::{HttpRequest, HttpResponse, ResponseError, error::BlockingError, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Stable error category
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Method {0} is not allowed on this resource")]
    MethodNotAllowed(String),
    #[error("Model inference failed: {0}")]
    ModelInference(String),
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::NotFound(_) => "not_found",
            ApiError::MethodNotAllowed(_) => "method_not_allowed",
            ApiError::ModelInference(_) => "model_inference_error",
            ApiError::UpstreamTimeout(_) => "upstream_timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ModelInference(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let request_id = Uuid::new_v4().to_string();
        if status.is_server_error() {
            log::error!("[{}] {} {}: {}", request_id, status.as_u16(), self.kind(), self);
        } else {
            log::warn!("[{}] {} {}: {}", request_id, status.as_u16(), self.kind(), self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
            fields: match self {
                ApiError::Validation(e) => Some(e.fields.clone()),
                _ => None,
            },
            request_id,
        })
    }
}

impl From<EncodeError> for ApiError {
    fn from(err: EncodeError) -> Self {
        ApiError::InvalidInput(err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownModel(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ExplainError> for ApiError {
    fn from(err: ExplainError) -> Self {
        match err {
            ExplainError::Timeout(_) => ApiError::UpstreamTimeout(err.to_string()),
            ExplainError::Inference(_) => ApiError::ModelInference(err.to_string()),
            ExplainError::MissingModel(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Turns body and query extraction failures into the JSON error shape.
pub fn extractor_error<E: std::fmt::Display>(err: E, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn validation_errors_carry_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("age".to_string(), "must be in [18, 100], got 17".to_string());
        let err = ApiError::from(ValidationErrors { fields });

        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "validation_error");
        assert_eq!(json["fields"]["age"], "must be in [18, 100], got 17");
        assert!(Uuid::parse_str(json["request_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn explain_errors_map_to_status_codes() {
        use shared::ModelId;
        let timeout = ApiError::from(ExplainError::Timeout(ModelId::Mlp));
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        let inference = ApiError::from(ExplainError::Inference(
            crate::pipeline::model::InferenceError::NonFinite(f64::NAN),
        ));
        assert_eq!(inference.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let unknown = ApiError::from(RegistryError::UnknownModel("svm".into()));
        assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
    }
}
