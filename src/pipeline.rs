//! Stage wiring: crawl and location resolution built from a [`PipelineConfig`].

use chrono::Local;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

use crate::client::RateLimitedClient;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extract::{CandidateExtractor, EntityRecognizer, GazetteerRecognizer};
use crate::fetch::HttpFetcher;
use crate::filters::{DateFilter, RelevanceFilter};
use crate::geo::SanityCheck;
use crate::geocode::{GeocodeCache, GeocodeResolver, Geocoder, NominatimGeocoder};
use crate::models::{ArticleRecord, ResolvedArticle, Sanity};
use crate::scheduler::{CrawlScheduler, StopSignal};
use crate::sources::adapters_for;
use crate::utils::{normalize_whitespace, region_hint_from_keyword};

/// The production location pipeline.
pub type DefaultLocationPipeline = LocationPipeline<GazetteerRecognizer, RateLimitedClient<NominatimGeocoder>>;

/// One article waiting for resolution, with its weak location hint.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveJob {
    pub record: ArticleRecord,
    pub region_hint: Option<String>,
}

impl ResolveJob {
    /// Uses `explicit_hint` when non-empty, else the keyword's second word.
    pub fn new(record: ArticleRecord, explicit_hint: Option<String>) -> Self {
        let region_hint = explicit_hint
            .map(|h| h.replace(',', "").trim().to_string())
            .filter(|h| !h.is_empty())
            .or_else(|| region_hint_from_keyword(&record.keyword));
        Self { record, region_hint }
    }

    /// Fill the hint from `hint` only when neither the explicit hint nor the
    /// keyword gave one.
    pub fn with_fallback_hint(mut self, hint: Option<&str>) -> Self {
        if self.region_hint.is_none() {
            self.region_hint = hint
                .map(|h| h.replace(',', "").trim().to_string())
                .filter(|h| !h.is_empty());
        }
        self
    }
}

/// Counters for one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Records that received coordinates.
    pub updated: usize,
    /// Records no query could resolve.
    pub skipped: usize,
    /// Input rows that could not be turned into a record.
    pub errored: usize,
    /// Resolved points flagged by the sanity check.
    pub implausible: usize,
    /// Records dropped by the relevance filter.
    pub dropped_irrelevant: usize,
}

/// Extraction, resolution and sanity check for a batch of articles.
pub struct LocationPipeline<R, G> {
    extractor: CandidateExtractor<R>,
    resolver: GeocodeResolver<G>,
    sanity: SanityCheck,
    relevance: RelevanceFilter,
    drop_irrelevant: bool,
    concurrency: usize,
}

impl<R: EntityRecognizer, G: Geocoder> LocationPipeline<R, G> {
    pub fn new(
        extractor: CandidateExtractor<R>,
        resolver: GeocodeResolver<G>,
        sanity: SanityCheck,
        relevance: RelevanceFilter,
    ) -> Self {
        Self {
            extractor,
            resolver,
            sanity,
            relevance,
            drop_irrelevant: false,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_drop_irrelevant(mut self, drop: bool) -> Self {
        self.drop_irrelevant = drop;
        self
    }

    pub fn cache(&self) -> &GeocodeCache {
        self.resolver.cache()
    }

    #[instrument(level = "debug", skip_all, fields(url = %job.record.url))]
    pub async fn resolve_one(&self, job: ResolveJob) -> ResolvedArticle {
        let ResolveJob { record, region_hint } = job;
        let text = normalize_whitespace(&format!("{} {}", record.title, record.content));
        let candidates = self.extractor.extract(&text);
        debug!(candidates = ?candidates.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(), "Candidates");

        let location = self.resolver.resolve(&candidates, region_hint.as_deref()).await;
        let sanity = location
            .point
            .as_ref()
            .map(|p| self.sanity.evaluate(p, region_hint.as_deref()))
            .unwrap_or(Sanity::Unchecked);
        let relevant = self.relevance.is_relevant(&record, region_hint.as_deref());

        ResolvedArticle {
            record,
            location,
            sanity,
            relevant: Some(relevant),
        }
    }

    /// Resolve every job, `concurrency` at a time, preserving input order.
    #[instrument(level = "info", skip_all, fields(jobs = jobs.len()))]
    pub async fn resolve_all(&self, jobs: Vec<ResolveJob>) -> (Vec<ResolvedArticle>, ResolveStats) {
        let resolved: Vec<ResolvedArticle> = stream::iter(jobs)
            .map(|job| self.resolve_one(job))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut stats = ResolveStats::default();
        let mut kept = Vec::with_capacity(resolved.len());
        for article in resolved {
            if self.drop_irrelevant && article.relevant == Some(false) {
                debug!(url = %article.record.url, "Dropping irrelevant article");
                stats.dropped_irrelevant += 1;
                continue;
            }
            if article.location.is_resolved() {
                stats.updated += 1;
            } else {
                stats.skipped += 1;
            }
            if matches!(article.sanity, Sanity::Implausible { .. }) {
                stats.implausible += 1;
            }
            kept.push(article);
        }

        info!(
            updated = stats.updated,
            skipped = stats.skipped,
            implausible = stats.implausible,
            dropped_irrelevant = stats.dropped_irrelevant,
            cache_entries = self.cache().len(),
            "Location resolution finished"
        );
        (kept, stats)
    }
}

/// Crawl scheduler for the configured sources, date window and pacing.
pub fn build_scheduler(config: &PipelineConfig, stop: StopSignal) -> Result<CrawlScheduler<HttpFetcher>> {
    let adapters = adapters_for(&config.crawl.sources)?;
    let mut fetcher = HttpFetcher::new(config.crawl.timeout())?;
    if let Some(ua) = config.crawl.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
        fetcher = fetcher.with_user_agent(ua);
    }
    let window = config.window.to_window(Local::now().date_naive())?;
    if let Some(w) = &window {
        info!(start = %w.start, end = ?w.end, "Date window active");
    }

    Ok(CrawlScheduler::new(
        adapters,
        fetcher,
        config.crawl.concurrency,
        config.crawl.min_delay(),
        config.crawl.retry_policy(),
    )
    .with_date_filter(DateFilter::new(window))
    .with_stop_signal(stop))
}

/// Location pipeline backed by Nominatim, sharing `cache`.
pub fn build_location_pipeline(config: &PipelineConfig, cache: GeocodeCache) -> Result<DefaultLocationPipeline> {
    let geo = &config.geocoder;
    let nominatim = NominatimGeocoder::new(geo.endpoint.clone(), geo.user_agent.clone(), geo.timeout())?
        .with_country_codes(geo.country_codes.clone());
    let geocoder = RateLimitedClient::new("geocoder", nominatim, geo.min_delay(), geo.retry_policy());

    Ok(LocationPipeline::new(
        CandidateExtractor::new(GazetteerRecognizer::with_defaults(&geo.extra_places)),
        GeocodeResolver::new(geocoder, cache, geo.country_context.clone()),
        SanityCheck::new(config.sanity.max_distance_m),
        RelevanceFilter::new(config.relevance.terms.clone()),
    )
    .with_concurrency(geo.concurrency)
    .with_drop_irrelevant(config.relevance.drop_irrelevant))
}
