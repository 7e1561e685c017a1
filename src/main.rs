//! # disaster_news_geo
//!
//! A batch pipeline that crawls disaster news from Indonesian outlets and
//! attaches a best-effort coordinate to every article.
//!
//! ## Features
//!
//! - Crawls CNN Indonesia (search API) and Mongabay Indonesia (GraphQL and
//!   HTML search) for a list of keywords, with per-source rate limiting,
//!   retries, redirect handling and request dedup
//! - Filters articles by publication date
//! - Extracts place names from article text (administrative patterns plus a
//!   gazetteer) and geocodes them through a fallback chain with a shared cache
//! - Flags coordinates implausibly far from the article's regency
//! - Writes CSV and GeoJSON
//!
//! ## Usage
//!
//! ```sh
//! disaster_news_geo run -k "banjir Gianyar,longsor Bangli" -o ./out
//! ```
//!
//! ## Architecture
//!
//! 1. **Crawl**: [`scheduler::CrawlScheduler`] drives the [`sources`] adapters
//! 2. **Filter**: [`filters::DateFilter`] drops out-of-window articles
//! 3. **Resolve**: [`pipeline::LocationPipeline`] runs extraction, geocoding
//!    and the sanity check, a few articles at a time
//! 4. **Output**: [`outputs`] writes `articles.csv`, `resolved.csv` and
//!    `resolved.geojson`

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod client;
mod config;
mod dates;
mod error;
mod extract;
mod fetch;
mod filters;
mod geo;
mod geocode;
mod models;
mod outputs;
mod pipeline;
mod scheduler;
mod sources;
mod utils;

use cli::{Cli, Command};
use config::{PipelineConfig, load_config};
use geocode::GeocodeCache;
use models::ArticleRecord;
use outputs::geojson::write_geojson;
use outputs::input::read_articles;
use outputs::tabular::{write_articles_csv, write_resolved_csv};
use pipeline::{ResolveJob, build_location_pipeline, build_scheduler};
use scheduler::StopSignal;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "disaster_news_geo starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    match &args.command {
        Command::Crawl(cmd) => cmd.crawl.apply(&mut config),
        Command::Resolve(cmd) => cmd.geocode.apply(&mut config),
        Command::Run(cmd) => {
            cmd.crawl.apply(&mut config);
            cmd.geocode.apply(&mut config);
        }
    }
    config.validate()?;

    let stop = StopSignal::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight requests");
                stop.stop();
            }
        }
    });

    let output_dir = match &args.command {
        Command::Crawl(cmd) => &cmd.output_dir,
        Command::Resolve(cmd) => &cmd.output_dir,
        Command::Run(cmd) => &cmd.output_dir,
    };
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    match &args.command {
        Command::Crawl(_) => {
            let records = crawl(&config, stop).await?;
            write_articles_csv(&records, output_dir).await?;
        }
        Command::Resolve(cmd) => {
            let batch = read_articles(&cmd.input).await?;
            resolve(&config, batch.jobs, batch.errored, output_dir).await?;
        }
        Command::Run(_) => {
            let records = crawl(&config, stop).await?;
            write_articles_csv(&records, output_dir).await?;
            let jobs = records.into_iter().map(|r| ResolveJob::new(r, None)).collect();
            resolve(&config, jobs, 0, output_dir).await?;
        }
    }

    info!(elapsed_ms = start_time.elapsed().as_millis() as u64, "Done");
    Ok(())
}

async fn crawl(config: &PipelineConfig, stop: StopSignal) -> Result<Vec<ArticleRecord>, Box<dyn Error>> {
    if config.crawl.keywords.is_empty() {
        return Err(error::Error::Config("no keyword given (use --keywords or crawl.keywords)".into()).into());
    }
    let scheduler = build_scheduler(config, stop)?;
    let outcome = scheduler.run(&config.crawl.keywords).await;
    let s = &outcome.stats;
    info!(
        records = s.records,
        dispatched = s.dispatched,
        duplicates_skipped = s.duplicates_skipped,
        fetch_failures = s.fetch_failures,
        parse_failures = s.parse_failures,
        rejected_by_date = s.rejected_by_date,
        aborted_adapters = s.aborted_adapters,
        "Crawl summary"
    );
    Ok(outcome.records)
}

async fn resolve(
    config: &PipelineConfig,
    jobs: Vec<ResolveJob>,
    errored: usize,
    output_dir: &str,
) -> Result<(), Box<dyn Error>> {
    let cache = match &config.geocoder.cache_path {
        Some(path) => GeocodeCache::load(path).await?,
        None => GeocodeCache::new(),
    };
    let location_pipeline = build_location_pipeline(config, cache.clone())?;
    let (resolved, mut stats) = location_pipeline.resolve_all(jobs).await;
    stats.errored += errored;

    write_resolved_csv(&resolved, output_dir).await?;
    write_geojson(&resolved, output_dir).await?;

    if let Some(path) = &config.geocoder.cache_path {
        if cache.is_empty() {
            debug!(%path, "Geocode cache is empty; not persisting");
        } else if let Err(e) = cache.save(path).await {
            warn!(%path, error = %e, "Could not persist geocode cache");
        }
    }

    info!(
        updated = stats.updated,
        skipped = stats.skipped,
        errored = stats.errored,
        implausible = stats.implausible,
        dropped_irrelevant = stats.dropped_irrelevant,
        "Resolution summary"
    );
    Ok(())
}
