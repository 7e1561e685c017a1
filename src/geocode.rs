//! Location resolution against an external geocoder.
//!
//! # Query building
//!
//! Queries are produced by an ordered list of [`QueryStrategy`] values, each
//! contributing only when its inputs are non-empty:
//!
//! | Order | Strategy | Query | Provenance |
//! |-------|----------|-------|------------|
//! | 1 | `CandidateWithRegion` | `"{candidate}, {region}, {country}"` | `article_place` |
//! | 2 | `CandidateOnly` | `"{candidate}, {country}"` | `article_place` |
//! | 3 | `RegionOnly` | `"{region}, {country}"` | `kabupaten_fallback` |
//! | 4 | `CountryOnly` | `"{country}"` | `region_fallback` |
//!
//! Provenance is attached when a query is built, never inferred afterwards.
//!
//! # Caching
//!
//! Every query string is looked up in a shared [`GeocodeCache`] before the
//! geocoder is called. Misses (empty results and errors alike) are cached
//! too, so a failing string costs one external call per run.

use dashmap::DashMap;
use itertools::Itertools;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::models::{GeoPoint, GeocodeQuery, LocationCandidate, Provenance, ResolvedLocation};

/// Opaque query → coordinate capability.
pub trait Geocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>>;
}

/// Geocoder backed by a Nominatim `/search` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
    user_agent: String,
    country_codes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            country_codes: None,
        })
    }

    /// Restrict results to ISO 3166-1 alpha-2 codes, e.g. `"id"`.
    pub fn with_country_codes(mut self, codes: Option<String>) -> Self {
        self.country_codes = codes.filter(|c| !c.trim().is_empty());
        self
    }
}

impl Geocoder for NominatimGeocoder {
    #[instrument(level = "debug", skip(self))]
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        let mut params = vec![("q", query), ("format", "jsonv2"), ("limit", "1")];
        if let Some(codes) = &self.country_codes {
            params.push(("countrycodes", codes.as_str()));
        }

        let resp = self
            .client
            .get(&self.endpoint)
            .header(USER_AGENT, &self.user_agent)
            .query(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body = resp.text().await?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("geocoder response: {e}")))?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let lat = place.lat.parse::<f64>().map_err(|e| Error::Parse(format!("lat: {e}")))?;
        let lon = place.lon.parse::<f64>().map_err(|e| Error::Parse(format!("lon: {e}")))?;
        Ok(Some(GeoPoint {
            lat,
            lon,
            display_name: place.display_name,
        }))
    }
}

/// Process-wide `query → point | miss` cache.
///
/// Cloning shares the underlying map. Concurrent inserts for the same key are
/// last-writer-wins; both writers hold the answer for the same query string.
#[derive(Debug, Clone, Default)]
pub struct GeocodeCache {
    entries: Arc<DashMap<String, Option<GeoPoint>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the query was never tried; `Some(None)` for a cached miss.
    pub fn get(&self, query: &str) -> Option<Option<GeoPoint>> {
        self.entries.get(query).map(|e| e.value().clone())
    }

    pub fn insert(&self, query: &str, result: Option<GeoPoint>) {
        self.entries.insert(query.to_string(), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a cache written by [`GeocodeCache::save`]; a missing file yields
    /// an empty cache.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            info!("No geocode cache file yet; starting empty");
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path).await?;
        let map: BTreeMap<String, Option<GeoPoint>> = serde_json::from_str(&raw)?;
        let cache = Self::new();
        for (query, result) in map {
            cache.entries.insert(query, result);
        }
        info!(entries = cache.len(), "Loaded geocode cache");
        Ok(cache)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let map: BTreeMap<String, Option<GeoPoint>> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&map)?;
        fs::write(path.as_ref(), json).await?;
        info!(entries = map.len(), "Saved geocode cache");
        Ok(())
    }
}

/// One tier of the query-building chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    CandidateWithRegion,
    CandidateOnly,
    RegionOnly,
    CountryOnly,
}

impl QueryStrategy {
    /// The chain, highest priority first.
    pub const CHAIN: [QueryStrategy; 4] = [
        QueryStrategy::CandidateWithRegion,
        QueryStrategy::CandidateOnly,
        QueryStrategy::RegionOnly,
        QueryStrategy::CountryOnly,
    ];

    pub fn provenance(self) -> Provenance {
        match self {
            QueryStrategy::CandidateWithRegion | QueryStrategy::CandidateOnly => Provenance::ArticlePlace,
            QueryStrategy::RegionOnly => Provenance::KabupatenFallback,
            QueryStrategy::CountryOnly => Provenance::RegionFallback,
        }
    }

    /// Queries contributed by this tier; empty when its inputs are missing.
    pub fn queries(self, candidates: &[LocationCandidate], region: &str, country: &str) -> Vec<String> {
        match self {
            QueryStrategy::CandidateWithRegion if !region.is_empty() => candidates
                .iter()
                .map(|c| join_parts(&[&c.text, region, country]))
                .collect(),
            QueryStrategy::CandidateWithRegion => Vec::new(),
            QueryStrategy::CandidateOnly => candidates
                .iter()
                .map(|c| join_parts(&[&c.text, country]))
                .collect(),
            QueryStrategy::RegionOnly if !region.is_empty() => vec![join_parts(&[region, country])],
            QueryStrategy::RegionOnly => Vec::new(),
            QueryStrategy::CountryOnly if !country.is_empty() => vec![country.to_string()],
            QueryStrategy::CountryOnly => Vec::new(),
        }
    }
}

fn join_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Priority-ordered queries for one article. Duplicates keep their first
/// (highest-priority) position.
pub fn build_queries(
    candidates: &[LocationCandidate],
    region_hint: Option<&str>,
    country_context: &str,
) -> Vec<GeocodeQuery> {
    let region = region_hint.map(str::trim).unwrap_or("");
    let country = country_context.trim();
    let candidates: Vec<LocationCandidate> = candidates
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .cloned()
        .collect();

    QueryStrategy::CHAIN
        .into_iter()
        .flat_map(|strategy| {
            strategy
                .queries(&candidates, region, country)
                .into_iter()
                .map(move |text| GeocodeQuery {
                    text,
                    provenance: strategy.provenance(),
                })
        })
        .filter(|q| !q.text.is_empty())
        .unique_by(|q| q.text.clone())
        .collect()
}

/// Resolves candidates to a coordinate through the fallback chain.
#[derive(Debug)]
pub struct GeocodeResolver<G> {
    geocoder: G,
    cache: GeocodeCache,
    country_context: String,
}

impl<G: Geocoder> GeocodeResolver<G> {
    pub fn new(geocoder: G, cache: GeocodeCache, country_context: impl Into<String>) -> Self {
        Self {
            geocoder,
            cache,
            country_context: country_context.into(),
        }
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// First query in priority order that yields a coordinate, or an
    /// unresolved location when all of them fail.
    pub async fn resolve(&self, candidates: &[LocationCandidate], region_hint: Option<&str>) -> ResolvedLocation {
        let queries = build_queries(candidates, region_hint, &self.country_context);
        for query in &queries {
            if let Some(point) = self.lookup(&query.text).await {
                debug!(query = %query.text, provenance = %query.provenance, "Resolved location");
                return ResolvedLocation::found(point, query);
            }
        }
        debug!(attempted = queries.len(), "No query produced a coordinate");
        ResolvedLocation::unresolved()
    }

    async fn lookup(&self, query: &str) -> Option<GeoPoint> {
        if let Some(cached) = self.cache.get(query) {
            return cached;
        }
        let result = match self.geocoder.geocode(query).await {
            Ok(result) => result,
            Err(e) => {
                warn!(%query, error = %e, "Geocode lookup failed; caching as miss");
                None
            }
        };
        self.cache.insert(query, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers from a fixed table and records every query it receives.
    #[derive(Default)]
    struct FakeGeocoder {
        hits: HashMap<String, GeoPoint>,
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn with_hit(mut self, query: &str, lat: f64, lon: f64) -> Self {
            self.hits.insert(
                query.to_string(),
                GeoPoint { lat, lon, display_name: query.to_string() },
            );
            self
        }

        fn with_error(mut self, query: &str) -> Self {
            self.failing.insert(query.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
            self.calls.lock().unwrap().push(query.to_string());
            if self.failing.contains(query) {
                return Err(Error::Status { status: 503, url: "fake".into() });
            }
            Ok(self.hits.get(query).cloned())
        }
    }

    fn candidates(names: &[&str]) -> Vec<LocationCandidate> {
        names
            .iter()
            .map(|n| LocationCandidate { text: n.to_string(), rank: 1 })
            .collect()
    }

    #[tokio::test]
    async fn test_query_priority_order() {
        let resolver = GeocodeResolver::new(FakeGeocoder::default(), GeocodeCache::new(), "Indonesia");
        let loc = resolver.resolve(&candidates(&["Ubud", "Kuta"]), Some("Gianyar")).await;
        assert!(!loc.is_resolved());
        assert_eq!(
            resolver.geocoder.calls(),
            vec![
                "Ubud, Gianyar, Indonesia",
                "Kuta, Gianyar, Indonesia",
                "Ubud, Indonesia",
                "Kuta, Indonesia",
                "Gianyar, Indonesia",
                "Indonesia",
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let geocoder = FakeGeocoder::default().with_hit("Kuta, Indonesia", -8.72, 115.17);
        let resolver = GeocodeResolver::new(geocoder, GeocodeCache::new(), "Indonesia");
        let loc = resolver.resolve(&candidates(&["Ubud", "Kuta"]), Some("Gianyar")).await;
        assert_eq!(loc.lat(), Some(-8.72));
        assert_eq!(loc.lon(), Some(115.17));
        assert_eq!(loc.provenance, Some(Provenance::ArticlePlace));
        assert_eq!(loc.query.as_deref(), Some("Kuta, Indonesia"));
        assert_eq!(resolver.geocoder.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_region_fallback_provenance() {
        let geocoder = FakeGeocoder::default().with_hit("Gianyar, Indonesia", -8.54, 115.32);
        let resolver = GeocodeResolver::new(geocoder, GeocodeCache::new(), "Indonesia");
        let loc = resolver.resolve(&candidates(&["Gianyar Barat"]), Some("Gianyar")).await;
        assert_eq!(loc.provenance, Some(Provenance::KabupatenFallback));
    }

    #[tokio::test]
    async fn test_empty_candidates_start_with_region() {
        let resolver = GeocodeResolver::new(FakeGeocoder::default(), GeocodeCache::new(), "Indonesia");
        resolver.resolve(&[], Some("Badung")).await;
        let calls = resolver.geocoder.calls();
        assert_eq!(calls.first().map(String::as_str), Some("Badung, Indonesia"));
        assert_eq!(calls, vec!["Badung, Indonesia", "Indonesia"]);
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let geocoder = FakeGeocoder::default().with_hit("Indonesia", -2.5, 118.0);
        let resolver = GeocodeResolver::new(geocoder, GeocodeCache::new(), "Indonesia");
        let list = candidates(&["Ubud", "Kuta"]);

        let first = resolver.resolve(&list, Some("Gianyar")).await;
        let second = resolver.resolve(&list, Some("Gianyar")).await;
        assert_eq!(first, second);
        assert_eq!(first.provenance, Some(Provenance::RegionFallback));

        let calls = resolver.geocoder.calls();
        let distinct: HashSet<&String> = calls.iter().collect();
        assert_eq!(calls.len(), distinct.len());
        assert_eq!(calls.len(), 6);
    }

    #[tokio::test]
    async fn test_errors_are_cached_as_misses() {
        let geocoder = FakeGeocoder::default().with_error("Badung, Indonesia");
        let resolver = GeocodeResolver::new(geocoder, GeocodeCache::new(), "Indonesia");
        resolver.resolve(&[], Some("Badung")).await;
        resolver.resolve(&[], Some("Badung")).await;
        assert_eq!(resolver.cache().get("Badung, Indonesia"), Some(None));
        assert_eq!(resolver.geocoder.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_all_queries_fail_is_unresolved() {
        let geocoder = FakeGeocoder::default().with_error("Indonesia");
        let resolver = GeocodeResolver::new(geocoder, GeocodeCache::new(), "Indonesia");
        let loc = resolver.resolve(&candidates(&["Ubud"]), None).await;
        assert_eq!(loc, ResolvedLocation::unresolved());
        assert_eq!(resolver.geocoder.calls(), vec!["Ubud, Indonesia", "Indonesia"]);
    }

    #[test]
    fn test_build_queries_skips_empty_parts_and_duplicates() {
        let queries = build_queries(&candidates(&["Gianyar", " "]), Some("Gianyar"), "");
        let texts: Vec<&str> = queries.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["Gianyar, Gianyar", "Gianyar"]);
        assert_eq!(queries[1].provenance, Provenance::ArticlePlace);
        assert!(build_queries(&[], None, "").is_empty());
    }

    #[tokio::test]
    async fn test_cache_roundtrips_through_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("cache.json");
        let cache = GeocodeCache::new();
        cache.insert("Ubud, Indonesia", Some(GeoPoint { lat: -8.5, lon: 115.26, display_name: "Ubud".into() }));
        cache.insert("Nowhere, Indonesia", None);
        cache.save(&file).await.unwrap();

        let loaded = GeocodeCache::load(&file).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("Nowhere, Indonesia"), Some(None));
        assert!(GeocodeCache::load(tmp.path().join("missing.json")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nominatim_parses_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Ubud, Indonesia"))
            .and(query_param("format", "jsonv2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"lat":"-8.5069","lon":"115.2625","display_name":"Ubud, Gianyar, Bali, Indonesia"}]"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Atlantis"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::new(
            format!("{}/search", server.uri()),
            "disaster-news-test",
            Duration::from_secs(5),
        )
        .unwrap();
        let point = geocoder.geocode("Ubud, Indonesia").await.unwrap().unwrap();
        assert!((point.lat + 8.5069).abs() < 1e-9);
        assert_eq!(point.display_name, "Ubud, Gianyar, Bali, Indonesia");
        assert_eq!(geocoder.geocode("Atlantis").await.unwrap(), None);
    }
}
