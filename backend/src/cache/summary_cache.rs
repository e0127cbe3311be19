use chrono::{DateTime, Utc};
use shared::{ModelId, SummaryPlotResponse};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::OnceCell;

#[derive(Debug, Clone)]
pub struct CachedSummary {
    pub plots: SummaryPlotResponse,
    pub computed_at: DateTime<Utc>,
    /// Rows explained to build the plots.
    pub rows: usize,
}

impl CachedSummary {
    pub fn new(plots: SummaryPlotResponse, rows: usize) -> Self {
        Self {
            plots,
            computed_at: Utc::now(),
            rows,
        }
    }
}

/// Write-once summary plots per model, valid for one artifact version.
/// A failed computation leaves the slot empty so the next request retries.
#[derive(Debug)]
pub struct SummaryCache {
    artifact_version: String,
    cells: BTreeMap<ModelId, OnceCell<CachedSummary>>,
}

impl SummaryCache {
    pub fn new(artifact_version: impl Into<String>) -> Self {
        Self {
            artifact_version: artifact_version.into(),
            cells: ModelId::ALL.iter().map(|id| (*id, OnceCell::new())).collect(),
        }
    }

    pub fn artifact_version(&self) -> &str {
        &self.artifact_version
    }

    pub fn get(&self, id: ModelId) -> Option<&CachedSummary> {
        self.cells.get(&id).and_then(OnceCell::get)
    }

    /// Returns the cached plots for `id`, running `init` at most once
    /// successfully. Concurrent callers wait for the first computation.
    pub async fn get_or_try_init<F, Fut, E>(&self, id: ModelId, init: F) -> Result<CachedSummary, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedSummary, E>>,
    {
        match self.cells.get(&id) {
            Some(cell) => cell.get_or_try_init(init).await.cloned(),
            None => init().await,
        }
    }
}
