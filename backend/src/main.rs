use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use backend::data::Dataset;
use backend::pipeline::config::ServiceConfig;
use backend::registry::ModelRegistry;
use backend::routes::configure_routes;
use backend::training::load_or_train;
use std::env;
use std::io::{Error, ErrorKind};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServiceConfig::load()
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;
    let dataset = Dataset::load_or_synthesize(&config.dataset)
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;

    let artifact = match load_or_train(&config, &dataset) {
        Ok(artifact) => artifact,
        Err(e) => {
            log::error!("Failed to load models at startup: {}", e);
            return Err(Error::other(format!("Model loading failed: {}", e)));
        }
    };
    let registry = ModelRegistry::from_artifact(artifact, config.explain.clone())
        .map_err(|e| Error::other(format!("Model registry failed: {}", e)))?;
    log::info!(
        "Serving {} models from artifact {}",
        registry.ids().len(),
        registry.version()
    );

    let registry = web::Data::new(registry);
    let dataset = web::Data::new(dataset);
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(registry.clone())
            .app_data(dataset.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
