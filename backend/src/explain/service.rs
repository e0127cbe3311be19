//! Async entry points used by the HTTP layer. CPU work runs on actix's
//! blocking pool; each model's work has its own time budget.

use super::{ExplainError, field_values};
use crate::cache::CachedSummary;
use crate::registry::ModelRegistry;
use crate::render;
use actix_web::web;
use futures::future::join_all;
use ndarray::Array1;
use shared::{ModelId, SummaryPlotResponse};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

async fn run_blocking<T, F>(
    registry: &ModelRegistry,
    id: ModelId,
    work: F,
) -> Result<T, ExplainError>
where
    F: FnOnce(Instant) -> Result<T, ExplainError> + Send + 'static,
    T: Send + 'static,
{
    let budget = registry.explain_timeout();
    let deadline = Instant::now() + budget;
    match tokio::time::timeout(budget, web::block(move || work(deadline))).await {
        Err(_) => Err(ExplainError::Timeout(id)),
        Ok(Err(blocking)) => Err(ExplainError::Worker(blocking.to_string())),
        Ok(Ok(result)) => result,
    }
}

/// Waterfall PNG (base64) for one encoded applicant.
pub async fn waterfall(
    registry: Arc<ModelRegistry>,
    id: ModelId,
    x: Array1<f64>,
) -> Result<String, ExplainError> {
    let handle = Arc::clone(&registry);
    run_blocking(&registry, id, move |deadline| {
        let entry = handle.get(id).ok_or(ExplainError::MissingModel(id))?;
        let explanation = entry
            .explainer
            .explain(id, &entry.model, x.view(), handle.groups(), Some(deadline))?;
        log::debug!(
            "{} waterfall: base {:.4}, output {:.4}",
            id,
            explanation.base_value,
            explanation.output
        );
        Ok(render::waterfall(
            explanation.base_value,
            &explanation.values,
            handle.explain_config().max_display,
        )?)
    })
    .await
}

/// Waterfalls for every model, computed concurrently. A model that fails or
/// runs out of time maps to `None`.
pub async fn waterfall_all(
    registry: Arc<ModelRegistry>,
    x: Array1<f64>,
) -> BTreeMap<ModelId, Option<String>> {
    let ids = registry.ids();
    let tasks = ids
        .iter()
        .map(|&id| waterfall(Arc::clone(&registry), id, x.clone()));
    let results = join_all(tasks).await;

    ids.into_iter()
        .zip(results)
        .map(|(id, result)| match result {
            Ok(png) => (id, Some(png)),
            Err(e) => {
                log::warn!("Waterfall for {} unavailable: {}", id, e);
                (id, None)
            }
        })
        .collect()
}

async fn compute_summary(
    registry: Arc<ModelRegistry>,
    id: ModelId,
) -> Result<CachedSummary, ExplainError> {
    let handle = Arc::clone(&registry);
    run_blocking(&registry, id, move |deadline| {
        let entry = handle.get(id).ok_or(ExplainError::MissingModel(id))?;
        let rows = handle.summary_rows();
        let mut values = Vec::with_capacity(rows.nrows());
        let mut features = Vec::with_capacity(rows.nrows());
        for row in rows.rows() {
            let explanation = entry
                .explainer
                .explain(id, &entry.model, row, handle.groups(), Some(deadline))?;
            values.push(explanation.values);
            features.push(field_values(row, handle.groups()));
        }
        let (summary_plot, shap_importance) =
            render::summary(&values, &features, handle.explain_config().max_display)?;
        Ok(CachedSummary::new(
            SummaryPlotResponse {
                summary_plot,
                shap_importance,
            },
            values.len(),
        ))
    })
    .await
}

/// Summary plots for one model, computed on first request and then served
/// from the registry's cache.
pub async fn summary(
    registry: Arc<ModelRegistry>,
    id: ModelId,
) -> Result<SummaryPlotResponse, ExplainError> {
    let started = Instant::now();
    let worker = Arc::clone(&registry);
    let cached = registry
        .summary_cache()
        .get_or_try_init(id, || compute_summary(worker, id))
        .await?;
    log::info!(
        "Summary plots for {} ready in {:?} ({} rows, computed at {})",
        id,
        started.elapsed(),
        cached.rows,
        cached.computed_at
    );
    Ok(cached.plots)
}
