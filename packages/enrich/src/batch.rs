//! Batch orchestration over a whole table.
//!
//! Each row runs on its own tokio task, with at most `workers` tasks in
//! flight. Tasks return their row index with the result, so results land in
//! the right slot no matter what order rows finish in. A task that panics
//! degrades its own row and nothing else.
//!
//! Network calls still go one at a time through the fetch client's
//! throttle; workers only overlap cache hits and rows without coordinates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt as _};
use resale_map_enrich_models::{FeatureRecord, InputRow};

use crate::EnrichError;
use crate::classify::CategoryBuckets;
use crate::client::FetchStats;
use crate::config::DEFAULT_WORKERS;
use crate::details::write_details;
use crate::progress::ProgressCallback;
use crate::row::RowProcessor;
use crate::table::InputTable;

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum rows in flight.
    pub workers: usize,
    /// Where to write per-row amenity details, if anywhere.
    pub details_path: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            details_path: None,
        }
    }
}

/// What a batch run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Input rows.
    pub rows: usize,
    /// Rows with features.
    pub enriched: usize,
    /// Rows written with every feature column empty.
    pub degraded: usize,
    /// Degraded rows whose task panicked.
    pub panicked: usize,
    /// Fetch client counters at the end of the run.
    pub fetch: FetchStats,
    /// Wall-clock time for the run.
    pub elapsed: Duration,
}

/// Results of [`enrich_rows`], indexed like the input.
#[derive(Debug)]
pub struct BatchOutput {
    /// One record per input row.
    pub features: Vec<FeatureRecord>,
    /// Full buckets per row, when requested.
    pub details: Option<Vec<Option<CategoryBuckets>>>,
    /// Run summary.
    pub summary: BatchSummary,
}

/// Enriches `rows` with at most `workers` rows in flight.
///
/// Always returns one record per row, in input order.
pub async fn enrich_rows(
    processor: Arc<RowProcessor>,
    rows: Vec<InputRow>,
    workers: usize,
    keep_details: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> BatchOutput {
    let started = Instant::now();
    let total = rows.len();
    let workers = workers.max(1);

    let mut features = vec![FeatureRecord::Degraded; total];
    let mut details: Option<Vec<Option<CategoryBuckets>>> =
        keep_details.then(|| vec![None; total]);
    let mut panicked = 0;

    progress.set_total(total as u64);
    progress.set_message("Processing rows".to_string());
    log::info!("Enriching {total} rows with {workers} workers");

    let mut results = stream::iter(rows.into_iter().enumerate().map(|(index, row)| {
        let processor = processor.clone();
        async move {
            let handle = tokio::spawn(async move { processor.process_detailed(&row).await });
            (index, handle.await)
        }
    }))
    .buffer_unordered(workers);

    while let Some((index, result)) = results.next().await {
        match result {
            Ok(buckets) => {
                if let Some(b) = &buckets {
                    features[index] = FeatureRecord::Enriched(b.features());
                }
                if let Some(details) = details.as_mut() {
                    details[index] = buckets;
                }
            }
            Err(e) => {
                log::error!("Error processing row {index}: {e}");
                panicked += 1;
            }
        }
        progress.inc(1);
        progress.set_message(row_message(&processor.client().stats()));
    }

    let degraded = features.iter().filter(|f| f.is_degraded()).count();
    let summary = BatchSummary {
        rows: total,
        enriched: total - degraded,
        degraded,
        panicked,
        fetch: processor.client().stats(),
        elapsed: started.elapsed(),
    };

    progress.finish(format!(
        "{} of {total} rows enriched ({degraded} degraded, {:.1} rows/s)",
        summary.enriched,
        rows_per_sec(total, summary.elapsed)
    ));

    BatchOutput {
        features,
        details,
        summary,
    }
}

fn row_message(stats: &FetchStats) -> String {
    format!(
        "Processing rows ({} cached, {} fetched, {} unavailable)",
        stats.cache_hits, stats.network_calls, stats.unavailable
    )
}

#[allow(clippy::cast_precision_loss)]
fn rows_per_sec(rows: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { rows as f64 / secs } else { 0.0 }
}

/// Reads `input`, enriches every row, and writes the merged table to
/// `output` (plus the details file, if configured).
///
/// # Errors
///
/// Returns [`EnrichError`] if the input cannot be read or an output cannot
/// be written. Per-row failures never cause an error.
pub async fn enrich_file(
    processor: Arc<RowProcessor>,
    input: &Path,
    output: &Path,
    options: &BatchOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<BatchSummary, EnrichError> {
    let table = InputTable::read(input)?;

    let result = enrich_rows(
        processor,
        table.rows(),
        options.workers,
        options.details_path.is_some(),
        progress,
    )
    .await;

    table.write(output, &result.features)?;

    if let (Some(path), Some(details)) = (&options.details_path, &result.details) {
        write_details(path, details)?;
    }

    let summary = result.summary;
    log::info!(
        "Enriched {}/{} rows ({} degraded, {} panicked) in {:.1?} ({:.2} rows/s): {} cache hits, {} network calls, {} failed attempts",
        summary.enriched,
        summary.rows,
        summary.degraded,
        summary.panicked,
        summary.elapsed,
        rows_per_sec(summary.rows, summary.elapsed),
        summary.fetch.cache_hits,
        summary.fetch.network_calls,
        summary.fetch.failed_attempts,
    );
    log::info!("Results saved to {}", output.display());

    Ok(summary)
}
