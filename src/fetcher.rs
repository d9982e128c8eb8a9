use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{LmsError, SyncError};

/// Runs `fetch` over every item with at most `max_concurrency` calls in flight.
///
/// Results are collected in completion order. Item-level failures are logged
/// and dropped. A fatal failure cancels the batch token, drops every
/// outstanding call along with any results already gathered, and returns
/// [`SyncError::AuthExpired`]. Cancelling `cancel` from outside yields
/// [`SyncError::Cancelled`].
pub async fn fetch_all<I, T, F, Fut>(
    items: Vec<I>,
    max_concurrency: usize,
    cancel: &CancellationToken,
    fetch: F,
) -> Result<Vec<T>, SyncError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, LmsError>>,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let workers = max_concurrency.clamp(1, total);
    let batch = cancel.child_token();

    tracing::info!(total, workers, "Starting batch fetch");

    let mut outcomes = stream::iter(items)
        .map(|item| {
            let batch = batch.clone();
            let call = fetch(item);
            async move {
                tokio::select! {
                    biased;
                    _ = batch.cancelled() => None,
                    result = call => Some(result),
                }
            }
        })
        .buffer_unordered(workers);

    let mut found = Vec::with_capacity(total);
    let mut completed = 0usize;
    let mut skipped = 0usize;

    while let Some(outcome) = outcomes.next().await {
        completed += 1;
        match outcome {
            None => return Err(SyncError::Cancelled),
            Some(Ok(value)) => found.push(value),
            Some(Err(e)) if e.is_fatal() => {
                batch.cancel();
                tracing::warn!(
                    completed,
                    total,
                    error = %e,
                    "Fatal error, cancelling batch"
                );
                return Err(SyncError::AuthExpired);
            }
            Some(Err(LmsError::NotFound(what))) => {
                skipped += 1;
                tracing::debug!(what = %what, "Item not found, skipping");
            }
            Some(Err(e)) => {
                skipped += 1;
                tracing::warn!(error = %e, "Item failed, skipping");
            }
        }

        if completed % 10 == 0 || completed == total {
            tracing::info!(progress = format!("{completed}/{total}"), "Batch progress");
        }
    }

    tracing::info!(total, found = found.len(), skipped, "Batch fetch complete");
    Ok(found)
}
