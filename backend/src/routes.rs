use crate::data::Dataset;
use crate::data::analysis::{AnalysisQuery, analyze};
use crate::error::{ApiError, extractor_error};
use crate::explain::service;
use crate::prediction::predict_record;
use crate::registry::ModelRegistry;
use crate::validation::validate_applicant;
use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, Resource, web};
use serde_json::{Value, json};
use shared::{ModelMetrics, WaterfallAllResponse, WaterfallResponse};
use std::collections::BTreeMap;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let json = web::JsonConfig::default().error_handler(extractor_error::<JsonPayloadError>);
    let query = web::QueryConfig::default().error_handler(extractor_error::<QueryPayloadError>);
    cfg.app_data(json)
        .app_data(query)
        .service(resource("/").route(web::get().to(index)))
        .service(resource("/health").route(web::get().to(health)))
        .service(resource("/analyze").route(web::get().to(analyze_dataset)))
        .service(resource("/metrics").route(web::get().to(all_metrics)))
        .service(resource("/metrics/{model}").route(web::get().to(model_metrics)))
        .service(resource("/predict").route(web::post().to(predict)))
        .service(resource("/shap/plots/{model}").route(web::get().to(summary_plots)))
        .service(resource("/shap/waterfall/{model}").route(web::post().to(waterfall)))
        .service(resource("/shap/waterfall").route(web::post().to(waterfall_all)));
}

fn resource(path: &str) -> Resource {
    web::resource(path).default_service(web::to(method_not_allowed))
}

async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed(req.method().to_string()))
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Credit risk scoring service")
}

async fn health(registry: web::Data<ModelRegistry>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "artifact_version": registry.version(),
    }))
}

async fn analyze_dataset(
    dataset: web::Data<Dataset>,
    query: web::Query<AnalysisQuery>,
) -> HttpResponse {
    HttpResponse::Ok().json(analyze(&dataset, &query))
}

async fn all_metrics(registry: web::Data<ModelRegistry>) -> HttpResponse {
    let metrics: BTreeMap<_, &ModelMetrics> =
        registry.models().map(|m| (m.id, &m.metrics)).collect();
    HttpResponse::Ok().json(metrics)
}

async fn model_metrics(
    registry: web::Data<ModelRegistry>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let entry = registry.lookup(&path)?;
    Ok(HttpResponse::Ok().json(&entry.metrics))
}

async fn predict(
    registry: web::Data<ModelRegistry>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let record = validate_applicant(&body)?;
    let registry = registry.into_inner();
    let response = web::block(move || predict_record(&registry, &record)).await??;
    Ok(HttpResponse::Ok().json(response))
}

async fn summary_plots(
    registry: web::Data<ModelRegistry>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = registry.lookup(&path)?.id;
    let plots = service::summary(registry.into_inner(), id).await?;
    Ok(HttpResponse::Ok().json(plots))
}

async fn waterfall(
    registry: web::Data<ModelRegistry>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let id = registry.lookup(&path)?.id;
    let record = validate_applicant(&body)?;
    let x = registry.encode(&record)?;
    let waterfall_plot = service::waterfall(registry.into_inner(), id, x).await?;
    Ok(HttpResponse::Ok().json(WaterfallResponse { waterfall_plot }))
}

async fn waterfall_all(
    registry: web::Data<ModelRegistry>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let record = validate_applicant(&body)?;
    let x = registry.encode(&record)?;
    let waterfall_plots = service::waterfall_all(registry.into_inner(), x).await;
    Ok(HttpResponse::Ok().json(WaterfallAllResponse { waterfall_plots }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{registry_with_broken_logistic, tiny_registry};
    use crate::validation::tests::sample_body;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use std::sync::Arc;

    macro_rules! app {
        ($registry:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($registry))
                    .app_data(web::Data::new(crate::data::synthetic::synthesize(120, 7)))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn predict_returns_one_label_per_model() {
        let app = app!(tiny_registry());
        let req = test::TestRequest::post().uri("/predict").set_json(sample_body()).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let labels = body.as_object().unwrap();
        assert_eq!(labels.len(), 4);
        for key in ["logistic-regression", "random-forest", "xg-boost", "mlp"] {
            let label = labels[key].as_str().unwrap();
            assert!(label == "Bom Pagador" || label == "Mau Pagador", "{} -> {}", key, label);
        }
    }

    #[actix_web::test]
    async fn out_of_range_age_is_a_field_error() {
        let app = app!(tiny_registry());
        for age in [17, 101] {
            let mut body = sample_body();
            body["age"] = json!(age);
            let req = test::TestRequest::post().uri("/predict").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let json: Value = test::read_body_json(resp).await;
            assert!(json["fields"]["age"].is_string());
            assert!(json["request_id"].is_string());
        }
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = app!(tiny_registry());
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["kind"], "bad_request");
    }

    #[actix_web::test]
    async fn wrong_method_is_a_json_405() {
        let app = app!(tiny_registry());
        for req in [
            test::TestRequest::get().uri("/predict").to_request(),
            test::TestRequest::post().uri("/metrics").to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
            let json: Value = test::read_body_json(resp).await;
            assert_eq!(json["kind"], "method_not_allowed");
            assert!(json["error"].is_string());
        }
    }

    #[actix_web::test]
    async fn metrics_are_stable_and_unknown_models_404() {
        let app = app!(tiny_registry());
        let get = |uri: &str| test::TestRequest::get().uri(uri).to_request();
        let first: Value = test::call_and_read_body_json(&app, get("/metrics/mlp")).await;
        let second: Value = test::call_and_read_body_json(&app, get("/metrics/mlp")).await;
        assert_eq!(first, second);
        assert_eq!(first["threshold"], 0.5);
        assert!(first["confusion_matrix"].is_array());

        let all: Value = test::call_and_read_body_json(&app, get("/metrics")).await;
        assert_eq!(all.as_object().unwrap().len(), 4);

        let resp = test::call_service(&app, get("/metrics/svm")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["kind"], "not_found");
    }

    #[actix_web::test]
    async fn waterfall_all_reports_null_for_a_failing_model() {
        let app = app!(registry_with_broken_logistic());
        let req = test::TestRequest::post()
            .uri("/shap/waterfall")
            .set_json(sample_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = test::read_body_json(resp).await;
        let plots = &json["waterfall_plots"];
        assert!(plots["logistic-regression"].is_null());
        assert!(plots["random-forest"].is_string());
        assert!(plots["xg-boost"].is_string());
        assert!(plots["mlp"].is_string());
    }

    #[actix_web::test]
    async fn single_waterfall_failures_map_to_status_codes() {
        let app = app!(registry_with_broken_logistic());
        let req = test::TestRequest::post()
            .uri("/shap/waterfall/logistic-regression")
            .set_json(sample_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let req = test::TestRequest::post()
            .uri("/shap/waterfall/svm")
            .set_json(sample_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let timed_out = crate::testing::registry_with_config(|explain| explain.timeout_ms = 0);
        let app = app!(timed_out);
        let req = test::TestRequest::post()
            .uri("/shap/waterfall/mlp")
            .set_json(sample_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[actix_web::test]
    async fn summary_plots_and_analysis() {
        let registry = tiny_registry();
        let app = app!(Arc::clone(&registry));
        let plots: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/shap/plots/random-forest").to_request(),
        )
        .await;
        assert!(plots["summary_plot"].is_string());
        assert!(plots["shap_importance"].is_string());

        let report: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/analyze?top_n=2&include_bins=true").to_request(),
        )
        .await;
        assert_eq!(report["meta"]["total_rows"], 120);
        assert!(report["categorical_distributions"]["purpose"].as_object().unwrap().len() <= 2);
        assert!(report["numerical_distributions"]["age"].is_object());

        let health: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/health").to_request(),
        )
        .await;
        assert_eq!(health["artifact_version"], registry.version());
    }
}
