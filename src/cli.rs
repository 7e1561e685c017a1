//! Command-line interface definitions.
//!
//! Three subcommands share one optional YAML config file; every flag given
//! here overrides the corresponding config value. Geocoder endpoint and
//! user agent can also come from the environment.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::utils::split_list;

/// Crawl Indonesian disaster news and geolocate each article.
///
/// # Examples
///
/// ```sh
/// # Crawl only
/// disaster_news_geo crawl -k "banjir Gianyar,longsor Bangli" -s cnn,mongabay -o ./out
///
/// # Resolve locations for an earlier crawl
/// disaster_news_geo resolve -i ./out/articles.csv -o ./out --cache ./geocode-cache.json
///
/// # Both, with a config file
/// disaster_news_geo -c config.yaml run -k "gempa Karangasem" -o ./out
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl sources and write articles.csv
    Crawl(CrawlCommand),
    /// Resolve locations for a CSV or GeoJSON file of articles
    Resolve(ResolveCommand),
    /// Crawl, then resolve
    Run(RunCommand),
}

#[derive(Args, Debug, Clone)]
pub struct CrawlCommand {
    #[command(flatten)]
    pub crawl: CrawlArgs,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveCommand {
    /// Input file (.csv, .geojson or .json)
    #[arg(short, long)]
    pub input: String,

    #[command(flatten)]
    pub geocode: GeocodeArgs,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub crawl: CrawlArgs,

    #[command(flatten)]
    pub geocode: GeocodeArgs,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// Comma-separated search keywords, e.g. "banjir Gianyar,longsor Bangli"
    #[arg(short, long)]
    pub keywords: Option<String>,

    /// Comma-separated sources: cnn, mongabay, mongabay-graphql, mongabay-search
    #[arg(short, long)]
    pub sources: Option<String>,

    /// Oldest publication date to keep (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Newest publication date to keep (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Keep articles published in the last N days
    #[arg(long)]
    pub max_age_days: Option<u64>,

    /// Maximum fetches in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Minimum delay between two requests to the same source, in milliseconds
    #[arg(long)]
    pub min_delay_ms: Option<u64>,
}

impl CrawlArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(keywords) = &self.keywords {
            config.crawl.keywords = split_list(keywords);
        }
        if let Some(sources) = &self.sources {
            config.crawl.sources = split_list(sources);
        }
        if self.since.is_some() {
            config.window.since = self.since;
        }
        if self.until.is_some() {
            config.window.until = self.until;
        }
        if self.max_age_days.is_some() {
            config.window.max_age_days = self.max_age_days;
        }
        if let Some(n) = self.concurrency {
            config.crawl.concurrency = n;
        }
        if let Some(ms) = self.min_delay_ms {
            config.crawl.min_delay_ms = ms;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct GeocodeArgs {
    /// Nominatim-compatible search endpoint
    #[arg(long, env = "GEOCODER_ENDPOINT")]
    pub geocoder_endpoint: Option<String>,

    /// User-Agent sent to the geocoder
    #[arg(long, env = "GEOCODER_USER_AGENT")]
    pub geocoder_user_agent: Option<String>,

    /// Context appended to every geocoding query, e.g. "Bali, Indonesia"
    #[arg(long)]
    pub country_context: Option<String>,

    /// Minimum delay between geocoder calls, in milliseconds
    #[arg(long)]
    pub geocode_delay_ms: Option<u64>,

    /// JSON file used to persist the geocode cache across runs
    #[arg(long)]
    pub cache: Option<String>,

    /// Drop articles that do not mention a disaster term and their region
    #[arg(long)]
    pub drop_irrelevant: bool,
}

impl GeocodeArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(endpoint) = &self.geocoder_endpoint {
            config.geocoder.endpoint = endpoint.clone();
        }
        if let Some(ua) = &self.geocoder_user_agent {
            config.geocoder.user_agent = ua.clone();
        }
        if let Some(ctx) = &self.country_context {
            config.geocoder.country_context = ctx.clone();
        }
        if let Some(ms) = self.geocode_delay_ms {
            config.geocoder.min_delay_ms = ms;
        }
        if self.cache.is_some() {
            config.geocoder.cache_path = self.cache.clone();
        }
        if self.drop_irrelevant {
            config.relevance.drop_irrelevant = true;
        }
    }
}
