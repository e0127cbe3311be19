//! Offline training run: fits the four models on the sample dataset and
//! writes the artifact the server loads at startup.
//!
//! Usage: `train [artifact-path]`; the path defaults to `artifact.path`.

use backend::data::Dataset;
use backend::pipeline::config::ServiceConfig;
use backend::training::train_models;
use std::path::PathBuf;
use std::process::ExitCode;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::load()?;
    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.artifact.path.clone());

    let dataset = Dataset::load_or_synthesize(&config.dataset)?;
    if !config.dataset.path.exists() {
        dataset.save_jsonl(&config.dataset.path)?;
        log::info!("Wrote sample dataset to {}", config.dataset.path.display());
    }

    let artifact = train_models(&dataset, &config)?;
    for entry in &artifact.models {
        log::info!(
            "{:<20} accuracy {:.3}  macro f1 {:.3}  trained in {:.2}s",
            entry.id.to_string(),
            entry.metrics.classification_report.accuracy,
            entry.metrics.classification_report.macro_avg.f1_score,
            entry.metrics.training_time
        );
    }
    artifact.save(&output)?;
    log::info!("Saved artifact {} to {}", artifact.version, output.display());
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Training failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
