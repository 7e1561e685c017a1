//! Crawl scheduler.
//!
//! Owns the frontier of pending requests and drives every adapter to
//! completion:
//!
//! 1. Seed the frontier from each adapter's `start`.
//! 2. Keep up to `concurrency` fetches in flight, each through the issuing
//!    [`RateLimitedClient`] of the issuing adapter's source. Adapters that
//!    crawl the same outlet share one client and so one politeness gap.
//! 3. Hand each response back to the adapter that issued the request and
//!    route its output: follow-up requests to the back of the frontier,
//!    records through the date filter and URL dedup into the result.
//!
//! A request is dispatched at most once per `(url, fingerprint)`. Setting the
//! [`StopSignal`] stops dispatch; fetches already in flight complete and their
//! records are kept, their follow-ups are discarded.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{RateLimitedClient, RetryPolicy};
use crate::fetch::Fetcher;
use crate::filters::DateFilter;
use crate::models::ArticleRecord;
use crate::sources::{AdapterOutput, SourceAdapter};
use crate::utils::truncate_for_log;

/// Cooperative cancellation flag shared between the scheduler and whoever
/// wants to stop it (Ctrl-C handler, tests).
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub dispatched: usize,
    pub duplicates_skipped: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub records: usize,
    pub rejected_by_date: usize,
    pub duplicate_records: usize,
    pub aborted_adapters: usize,
    /// Follow-up requests dropped because the run was stopping.
    pub discarded_after_stop: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub records: Vec<ArticleRecord>,
    pub stats: CrawlStats,
}

pub struct CrawlScheduler<F> {
    adapters: Vec<Box<dyn SourceAdapter>>,
    clients: Vec<RateLimitedClient<F>>,
    /// Index into `clients` for each adapter.
    client_of: Vec<usize>,
    concurrency: usize,
    date_filter: DateFilter,
    stop: StopSignal,
}

impl<F: Fetcher + Clone> CrawlScheduler<F> {
    /// One rate-limited client per source id, all sharing `fetcher`'s
    /// connection pool.
    pub fn new(
        adapters: Vec<Box<dyn SourceAdapter>>,
        fetcher: F,
        concurrency: usize,
        min_delay: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let mut clients = Vec::new();
        let mut by_source: HashMap<&str, usize> = HashMap::new();
        let client_of = adapters
            .iter()
            .map(|a| {
                *by_source.entry(a.source_id()).or_insert_with(|| {
                    clients.push(RateLimitedClient::new(a.source_id(), fetcher.clone(), min_delay, retry));
                    clients.len() - 1
                })
            })
            .collect();
        Self {
            adapters,
            clients,
            client_of,
            concurrency: concurrency.max(1),
            date_filter: DateFilter::default(),
            stop: StopSignal::new(),
        }
    }

    pub fn with_date_filter(mut self, filter: DateFilter) -> Self {
        self.date_filter = filter;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Crawl every adapter for `keywords` until all chains terminate or the
    /// run is stopped.
    #[instrument(level = "info", skip_all, fields(adapters = self.adapters.len(), keywords = keywords.len()))]
    pub async fn run(&self, keywords: &[String]) -> CrawlOutcome {
        let mut stats = CrawlStats::default();
        let mut records = Vec::new();
        let mut aborted = vec![false; self.adapters.len()];
        let mut frontier = VecDeque::new();
        let mut seen: HashSet<(String, u64)> = HashSet::new();
        let mut emitted: HashSet<String> = HashSet::new();

        for (idx, adapter) in self.adapters.iter().enumerate() {
            match adapter.start(keywords) {
                Ok(requests) => {
                    info!(adapter = adapter.id(), source = adapter.source_id(), count = requests.len(), "Seeded crawl");
                    frontier.extend(requests.into_iter().map(|r| (idx, r)));
                }
                Err(e) => {
                    error!(adapter = adapter.id(), error = %e, "Adapter failed to start; skipping it");
                    aborted[idx] = true;
                    stats.aborted_adapters += 1;
                }
            }
        }

        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < self.concurrency && !self.stop.is_stopped() {
                let Some((idx, request)) = frontier.pop_front() else {
                    break;
                };
                if aborted[idx] {
                    continue;
                }
                if !seen.insert((request.url.clone(), request.fingerprint())) {
                    debug!(url = %request.url, "Already dispatched; skipping");
                    stats.duplicates_skipped += 1;
                    continue;
                }
                stats.dispatched += 1;
                let client = &self.clients[self.client_of[idx]];
                in_flight.push(async move {
                    let result = client.fetch(&request.url).await;
                    (idx, request, result)
                });
            }

            let Some((idx, request, result)) = in_flight.next().await else {
                break;
            };
            let adapter = &self.adapters[idx];
            if aborted[idx] {
                debug!(adapter = adapter.id(), url = %request.url, "Ignoring response for aborted adapter");
                continue;
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(adapter = adapter.id(), url = %request.url, error = %e, "Fetch failed");
                    stats.fetch_failures += 1;
                    continue;
                }
            };

            let url = request.url.clone();
            match adapter.handle(&response, request) {
                Ok(outputs) => {
                    for output in outputs {
                        match output {
                            AdapterOutput::Request(next) if self.stop.is_stopped() => {
                                debug!(url = %next.url, "Stopping; discarding follow-up");
                                stats.discarded_after_stop += 1;
                            }
                            AdapterOutput::Request(next) => frontier.push_back((idx, next)),
                            AdapterOutput::Article(record) => {
                                self.collect(record, &mut emitted, &mut records, &mut stats)
                            }
                        }
                    }
                }
                Err(e) if e.is_parse() => {
                    warn!(
                        adapter = adapter.id(),
                        %url,
                        error = %e,
                        body = %truncate_for_log(&response.body, 200),
                        "Could not parse response"
                    );
                    stats.parse_failures += 1;
                }
                Err(e) => {
                    error!(adapter = adapter.id(), %url, error = %e, "Adapter failed; aborting it");
                    aborted[idx] = true;
                    stats.aborted_adapters += 1;
                }
            }
        }

        if self.stop.is_stopped() {
            info!(pending = frontier.len(), "Crawl stopped early");
        }
        info!(
            dispatched = stats.dispatched,
            records = stats.records,
            fetch_failures = stats.fetch_failures,
            parse_failures = stats.parse_failures,
            rejected_by_date = stats.rejected_by_date,
            "Crawl finished"
        );
        CrawlOutcome { records, stats }
    }

    fn collect(
        &self,
        record: ArticleRecord,
        emitted: &mut HashSet<String>,
        records: &mut Vec<ArticleRecord>,
        stats: &mut CrawlStats,
    ) {
        if !self.date_filter.accept(&record) {
            debug!(url = %record.url, date = ?record.publish_date, "Outside date window");
            stats.rejected_by_date += 1;
            return;
        }
        if !emitted.insert(record.url.clone()) {
            stats.duplicate_records += 1;
            return;
        }
        debug!(url = %record.url, title = %record.title, "Collected article");
        stats.records += 1;
        records.push(record);
    }
}
