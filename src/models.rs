//! Data models shared by the crawl and location-resolution stages.
//!
//! - [`ArticleRecord`]: one crawled article, identified by its URL
//! - [`CrawlRequest`]: one pending fetch together with the context it carries
//! - [`LocationCandidate`], [`GeocodeQuery`]: ephemeral resolution inputs
//! - [`ResolvedLocation`], [`ResolvedArticle`]: resolution output

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A crawled article in the shape shared by every source.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub title: String,
    /// Full body text, whitespace-normalized.
    pub content: String,
    pub author: Option<String>,
    pub publish_date: Option<NaiveDateTime>,
    /// Which outlet produced the record (e.g. `cnnindonesia.com`).
    pub source_id: String,
    /// The search term that found the article.
    pub keyword: String,
    /// Identity key: two records with the same URL are the same article.
    pub url: String,
}

impl ArticleRecord {
    /// Build a record, or `None` when there is nothing worth keeping
    /// (empty URL, or both title and content empty).
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        url: impl Into<String>,
        context: &CrawlContext,
    ) -> Option<Self> {
        let title = title.into().trim().to_string();
        let content = content.into().trim().to_string();
        let url = url.into();
        if url.trim().is_empty() || (title.is_empty() && content.is_empty()) {
            return None;
        }
        Some(Self {
            title,
            content,
            author: None,
            publish_date: None,
            source_id: context.source_id.clone(),
            keyword: context.keyword.clone(),
            url,
        })
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        self
    }

    pub fn with_publish_date(mut self, date: Option<NaiveDateTime>) -> Self {
        self.publish_date = date;
        self
    }
}

/// What a pending request is for. Adapters dispatch on this in `handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Search,
    Pagination,
    Article,
    Redirect,
}

impl RequestKind {
    /// Listing pages (search results and their follow-up pages).
    pub fn is_listing(self) -> bool {
        matches!(self, RequestKind::Search | RequestKind::Pagination)
    }
}

/// Position inside a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Item offset for search APIs (`start=`).
    Offset(u32),
    /// 1-based page number for HTML listings.
    Page(u32),
    /// Opaque GraphQL `endCursor`.
    After(String),
}

/// Metadata carried from one request to the follow-ups it spawns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CrawlContext {
    pub keyword: String,
    pub source_id: String,
    pub cursor: Option<Cursor>,
    /// Publication date already known from a listing (GraphQL `date`).
    pub publish_date_override: Option<String>,
    /// Author already known from a listing (GraphQL byline).
    pub author_override: Option<String>,
}

impl CrawlContext {
    pub fn new(keyword: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// One pending fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub url: String,
    pub kind: RequestKind,
    pub context: CrawlContext,
    /// Set on the single follow-up issued for a redirect. A listing keeps its
    /// kind across the hop; an article hop becomes [`RequestKind::Redirect`].
    pub redirected: bool,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>, kind: RequestKind, context: CrawlContext) -> Self {
        Self {
            url: url.into(),
            kind,
            context,
            redirected: false,
        }
    }

    /// The follow-up for a redirect of `self` to `url`.
    pub fn redirect_to(self, url: impl Into<String>) -> Self {
        let kind = if self.kind.is_listing() { self.kind } else { RequestKind::Redirect };
        Self {
            url: url.into(),
            kind,
            context: self.context,
            redirected: true,
        }
    }

    /// Fingerprint used by the scheduler for at-most-once dispatch.
    ///
    /// Article and redirect fetches share a class so a page reached both
    /// directly and through a redirect is fetched once. The cursor only
    /// matters for listings.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.is_listing().hash(&mut hasher);
        self.context.keyword.hash(&mut hasher);
        self.context.source_id.hash(&mut hasher);
        if self.kind.is_listing() {
            self.context.cursor.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// A place name proposed by the candidate extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationCandidate {
    pub text: String,
    /// Occurrence count in the source text; higher ranks first.
    pub rank: u32,
}

/// Which fallback tier produced a geocoding query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    ArticlePlace,
    KabupatenFallback,
    RegionFallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::ArticlePlace => "article_place",
            Provenance::KabupatenFallback => "kabupaten_fallback",
            Provenance::RegionFallback => "region_fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-qualified geocoder query tagged with its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery {
    pub text: String,
    pub provenance: Provenance,
}

/// A coordinate returned by the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

/// Outcome of resolving one article. `point` carries latitude and longitude
/// together, so one is never set without the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedLocation {
    pub point: Option<GeoPoint>,
    pub provenance: Option<Provenance>,
    pub query: Option<String>,
}

impl ResolvedLocation {
    pub fn found(point: GeoPoint, query: &GeocodeQuery) -> Self {
        Self {
            point: Some(point),
            provenance: Some(query.provenance),
            query: Some(query.text.clone()),
        }
    }

    /// Every query failed; a normal outcome, not an error.
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn lat(&self) -> Option<f64> {
        self.point.as_ref().map(|p| p.lat)
    }

    pub fn lon(&self) -> Option<f64> {
        self.point.as_ref().map(|p| p.lon)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.point.as_ref().map(|p| p.display_name.as_str())
    }

    pub fn is_resolved(&self) -> bool {
        self.point.is_some()
    }
}

/// Result of comparing a resolved point against its regional anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sanity {
    Plausible { distance_m: f64 },
    Implausible { distance_m: f64 },
    /// No coordinate, or no anchor known for the region.
    Unchecked,
}

impl Sanity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sanity::Plausible { .. } => "plausible",
            Sanity::Implausible { .. } => "implausible",
            Sanity::Unchecked => "unchecked",
        }
    }

    pub fn distance_m(&self) -> Option<f64> {
        match self {
            Sanity::Plausible { distance_m } | Sanity::Implausible { distance_m } => {
                Some(*distance_m)
            }
            Sanity::Unchecked => None,
        }
    }
}

/// An article enriched with its resolved location.
#[derive(Debug, Clone)]
pub struct ResolvedArticle {
    pub record: ArticleRecord,
    pub location: ResolvedLocation,
    pub sanity: Sanity,
    pub relevant: Option<bool>,
}
