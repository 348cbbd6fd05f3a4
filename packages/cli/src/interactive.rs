//! Interactive mode, used when no subcommand is given.
//!
//! Prompts for the input and output tables and a few run settings, then
//! runs the same enrichment as the `enrich` subcommand.

use resale_map_cli_utils::{
    MultiProgress, confirm, prompt_number, prompt_optional_path, prompt_path,
};
use resale_map_enrich::batch::BatchOptions;
use resale_map_enrich::config::OverpassService;

const DEFAULT_INPUT: &str = "data/resale_prices.csv";
const DEFAULT_OUTPUT: &str = "data/resale_prices_with_amenities.csv";

/// Prompts for run settings and enriches the chosen table.
///
/// # Errors
///
/// Returns an error if a prompt fails or the enrichment run fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Resale Map Amenity Enrichment");
    println!();

    let mut service = OverpassService::load();

    let input = prompt_path("Input CSV", Some(DEFAULT_INPUT))?;
    let output = prompt_path("Output CSV", Some(DEFAULT_OUTPUT))?;
    let workers = prompt_number("Concurrent workers", service.batch.workers)?;
    service.query.radius_meters = prompt_number("Search radius (m)", service.query.radius_meters)?;
    let details_path = prompt_optional_path("Details JSONL (leave empty to skip)")?;
    let cache_seed = prompt_optional_path("Cache seed JSON (leave empty to skip)")?;

    let proceed = confirm(
        &format!(
            "Enrich {} into {} with {workers} workers?",
            input.display(),
            output.display()
        ),
        true,
    )?;
    if !proceed {
        log::info!("Cancelled");
        return Ok(());
    }

    let options = BatchOptions {
        workers,
        details_path,
    };
    crate::run_enrich(
        multi,
        &service,
        &input,
        &output,
        &options,
        cache_seed.as_deref(),
    )
    .await?;

    Ok(())
}
