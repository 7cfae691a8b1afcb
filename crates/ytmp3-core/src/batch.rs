//! Batch orchestration: ordered, bounded, continue-on-error

use crate::error::{Result, Ytmp3Error};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug)]
pub struct UrlOutcome {
    pub url: String,
    pub result: Result<PathBuf>,
}

/// Per-URL outcomes, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<UrlOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Failures other than cancellation
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(ref e) if e.is_cancelled()))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Ytmp3Error)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(e) if !e.is_cancelled() => Some((o.url.as_str(), e)),
            _ => None,
        })
    }
}

/// Run `process` for every URL with at most `max_concurrent` in flight.
///
/// A failing URL never aborts the batch. Once `cancel` fires, URLs that have
/// not started are reported as cancelled. Only an empty list is an error.
pub async fn run_batch<F, Fut>(
    urls: &[String],
    max_concurrent: usize,
    cancel: &CancellationToken,
    process: F,
) -> Result<BatchReport>
where
    F: Fn(usize, String) -> Fut,
    Fut: Future<Output = Result<PathBuf>>,
{
    if urls.is_empty() {
        return Err(Ytmp3Error::EmptyBatch);
    }

    let total = urls.len();
    let limit = max_concurrent.max(1);
    info!("Processing {} URLs, {} at a time", total, limit);

    let process = &process;
    let outcomes = stream::iter(urls.iter().cloned().enumerate())
        .map(|(idx, url)| async move {
            let result = if cancel.is_cancelled() {
                Err(Ytmp3Error::Cancelled)
            } else {
                process(idx, url.clone()).await
            };
            log_outcome(idx, total, &url, &result);
            UrlOutcome { url, result }
        })
        .buffered(limit)
        .collect::<Vec<_>>()
        .await;

    Ok(BatchReport { outcomes })
}

fn log_outcome(idx: usize, total: usize, url: &str, result: &Result<PathBuf>) {
    match result {
        Ok(path) => info!("[{}/{}] Done: {} -> {}", idx + 1, total, url, path.display()),
        Err(e) if e.is_cancelled() => warn!("[{}/{}] Cancelled: {}", idx + 1, total, url),
        Err(e) => warn!("[{}/{}] Failed: {} - {}", idx + 1, total, url, e),
    }
}
