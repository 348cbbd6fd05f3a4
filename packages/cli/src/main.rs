#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for resale flat amenity enrichment.
//!
//! Uses `indicatif-log-bridge` (via [`resale_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the row progress bar never fight for the terminal.

mod interactive;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use resale_map_cli_utils::{IndicatifProgress, MultiProgress};
use resale_map_enrich::batch::{BatchOptions, BatchSummary, enrich_file};
use resale_map_enrich::cache::ResponseCache;
use resale_map_enrich::config::OverpassService;
use resale_map_enrich::details::describe_nearest;
use resale_map_enrich::query::{SnapshotDate, build_query};
use resale_map_enrich::row::RowProcessor;
use resale_map_enrich_models::{Coordinate, InputRow};

#[derive(Parser)]
#[command(
    name = "resale_map",
    about = "Enrich resale flat transactions with nearby amenity features"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for the embedded Overpass service settings.
#[derive(Args, Debug, Default)]
struct ServiceArgs {
    /// Overpass interpreter URL (overrides `RESALE_MAP_OVERPASS_URL`)
    #[arg(long)]
    endpoint: Option<String>,
    /// Search radius in meters (default: 500)
    #[arg(long)]
    radius: Option<u32>,
    /// Gap held after each successful request, in milliseconds (default: 2000)
    #[arg(long)]
    delay_ms: Option<u64>,
}

impl ServiceArgs {
    fn apply(&self, service: &mut OverpassService) {
        if let Some(endpoint) = &self.endpoint {
            service.base_url.clone_from(endpoint);
        }
        if let Some(radius) = self.radius {
            service.query.radius_meters = radius;
        }
        if let Some(delay_ms) = self.delay_ms {
            service.request_delay_ms = delay_ms;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every row of a CSV table and write the result
    Enrich {
        /// Input CSV with `Latitude`, `Longitude`, and optionally `month`
        #[arg(long)]
        input: PathBuf,
        /// Output CSV path (parent directories are created)
        #[arg(long)]
        output: PathBuf,
        /// Concurrent row workers (default: 3)
        #[arg(long)]
        workers: Option<usize>,
        /// Also write every amenity found per row to this JSON Lines file
        #[arg(long)]
        details: Option<PathBuf>,
        /// Preload the response cache from this JSON file
        #[arg(long)]
        cache_seed: Option<PathBuf>,
        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Print the Overpass query for a coordinate without sending it
    Query {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Transaction month (YYYY-MM) to query historical data as of
        #[arg(long)]
        month: Option<String>,
        /// Search radius in meters (default: 500)
        #[arg(long)]
        radius: Option<u32>,
    },
    /// Look up the amenities around a single coordinate
    Lookup {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Transaction month (YYYY-MM) to query historical data as of
        #[arg(long)]
        month: Option<String>,
        #[command(flatten)]
        service: ServiceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = resale_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    match command {
        Commands::Enrich {
            input,
            output,
            workers,
            details,
            cache_seed,
            service: overrides,
        } => {
            let mut service = OverpassService::load();
            overrides.apply(&mut service);
            let options = BatchOptions {
                workers: workers.unwrap_or(service.batch.workers),
                details_path: details,
            };
            run_enrich(
                &multi,
                &service,
                &input,
                &output,
                &options,
                cache_seed.as_deref(),
            )
            .await?;
        }
        Commands::Query {
            lat,
            lon,
            month,
            radius,
        } => {
            let center = Coordinate::new(lat, lon)?;
            let snapshot = month.as_deref().map(SnapshotDate::parse).transpose()?;
            let radius = radius.unwrap_or(OverpassService::load().query.radius_meters);
            println!("{}", build_query(center, radius, snapshot.as_ref()));
        }
        Commands::Lookup {
            lat,
            lon,
            month,
            service: overrides,
        } => {
            Coordinate::new(lat, lon)?;
            if let Some(month) = month.as_deref() {
                SnapshotDate::parse(month)?;
            }

            let mut service = OverpassService::load();
            overrides.apply(&mut service);
            let processor = service.row_processor(Arc::new(ResponseCache::new()))?;

            let row = InputRow {
                latitude: Some(lat),
                longitude: Some(lon),
                period: month,
            };
            let Some(buckets) = processor.process_detailed(&row).await else {
                return Err(format!("Overpass lookup failed for ({lat}, {lon})").into());
            };
            for bucket in buckets.all() {
                println!("{}", describe_nearest(bucket));
            }
        }
    }

    Ok(())
}

/// Runs one enrichment of `input` into `output` with a progress bar.
///
/// # Errors
///
/// Returns an error if the cache seed, input, or outputs cannot be read or
/// written.
async fn run_enrich(
    multi: &MultiProgress,
    service: &OverpassService,
    input: &Path,
    output: &Path,
    options: &BatchOptions,
    cache_seed: Option<&Path>,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let cache = Arc::new(ResponseCache::new());
    if let Some(seed) = cache_seed {
        cache.seed_from_file(seed)?;
    }

    log::info!(
        "Using {} at {} (radius {} m, {} ms between requests)",
        service.name,
        service.base_url,
        service.query.radius_meters,
        service.request_delay_ms,
    );

    let processor: Arc<RowProcessor> = Arc::new(service.row_processor(cache)?);
    let progress = IndicatifProgress::rows_bar(multi, "Reading input");

    Ok(enrich_file(processor, input, output, options, &progress).await?)
}
