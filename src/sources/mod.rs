//! News source adapters.
//!
//! Each adapter knows one outlet's protocol and nothing else: it turns
//! keywords into initial requests and each fetched response into a bounded
//! batch of follow-up requests and article records. Fetching, dedup and
//! pacing belong to [`crate::scheduler`].
//!
//! # Supported Sources
//!
//! | Adapter id | Module | Method | Source id |
//! |------------|--------|--------|-----------|
//! | `cnn` | [`cnn`] | JSON search API, offset paging | `cnnindonesia.com` |
//! | `mongabay-graphql` | [`mongabay`] | GraphQL `contentNodes`, cursor paging | `mongabay.co.id` |
//! | `mongabay-search` | [`mongabay`] | HTML search pages, numbered paging | `mongabay.co.id` |
//!
//! # Common Contract
//!
//! - Every pagination chain ends: an empty page, or a page without a next
//!   link, produces no further listing request.
//! - A 3xx response is followed once through [`follow_redirect`]; a moved
//!   listing is parsed as the same listing, a moved article as an article.
//! - Records are only emitted when a title or body was found.

pub mod cnn;
pub mod mongabay;

use chrono::NaiveDateTime;
use scraper::ElementRef;
use tracing::{debug, warn};
use url::Url;

use crate::dates::parse_timestamp;
use crate::error::{Error, Result};
use crate::fetch::FetchResponse;
use crate::models::{ArticleRecord, CrawlContext, CrawlRequest, RequestKind};
use crate::utils::normalize_whitespace;

pub use cnn::CnnAdapter;
pub use mongabay::{MongabayGraphqlAdapter, MongabaySearchAdapter};

/// One item produced while handling a response.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutput {
    Article(ArticleRecord),
    Request(CrawlRequest),
}

/// Crawl contract implemented by every source.
pub trait SourceAdapter: Send + Sync {
    /// Adapter id as accepted on the command line.
    fn id(&self) -> &'static str;

    /// Outlet id stamped on every record.
    fn source_id(&self) -> &'static str;

    /// Initial requests, one chain per non-empty keyword.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when no usable keyword is given.
    fn start(&self, keywords: &[String]) -> Result<Vec<CrawlRequest>>;

    /// Follow-ups and records for one fetched response.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] for malformed bodies or missing required elements.
    fn handle(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>>;
}

/// Trimmed, non-empty keywords, or a configuration error naming the adapter.
pub(crate) fn usable_keywords<'a>(adapter: &str, keywords: &'a [String]) -> Result<Vec<&'a str>> {
    let usable: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if usable.is_empty() {
        return Err(Error::Config(format!("{adapter}: no keyword provided")));
    }
    Ok(usable)
}

/// Turn a redirect response into a single follow-up request for the resolved
/// `Location`, carrying the original context.
///
/// A listing stays a listing, so the redirected page continues the same
/// pagination chain; an article becomes a [`RequestKind::Redirect`]. Redirects
/// of redirects and unusable targets are dropped.
pub(crate) fn follow_redirect(response: &FetchResponse, request: CrawlRequest) -> Vec<AdapterOutput> {
    if request.redirected || request.kind == RequestKind::Redirect {
        warn!(url = %request.url, "Redirect chain longer than one hop; dropping");
        return Vec::new();
    }
    let Some(location) = response.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
        warn!(url = %request.url, status = response.status, "Redirect without Location; dropping");
        return Vec::new();
    };

    let target = Url::parse(&response.url)
        .and_then(|base| base.join(location))
        .or_else(|_| Url::parse(location));
    match target {
        Ok(target) => {
            debug!(from = %request.url, to = %target, "Following redirect");
            vec![AdapterOutput::Request(request.redirect_to(target.to_string()))]
        }
        Err(e) => {
            warn!(url = %request.url, %location, error = %e, "Malformed redirect target; dropping");
            Vec::new()
        }
    }
}

/// Attach author and date, letting listing metadata fill the gaps.
///
/// A listing author replaces the parsed one; a listing date is used only
/// when the page itself had none.
pub(crate) fn with_page_metadata(
    record: ArticleRecord,
    context: &CrawlContext,
    parsed_author: Option<String>,
    parsed_date: Option<NaiveDateTime>,
) -> ArticleRecord {
    let author = context
        .author_override
        .clone()
        .filter(|a| !a.trim().is_empty())
        .or(parsed_author);
    let date = parsed_date.or_else(|| context.publish_date_override.as_deref().and_then(parse_timestamp));
    record.with_author(author).with_publish_date(date)
}

/// Whitespace-normalized text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Resolve the adapters named on the command line.
///
/// `mongabay` expands to both Mongabay adapters; repeated names are ignored.
pub fn adapters_for(names: &[String]) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let mut ids: Vec<&'static str> = Vec::new();
    for name in names {
        let expanded: &[&'static str] = match name.trim().to_lowercase().as_str() {
            "cnn" | "cnnindonesia" | "cnnindonesia.com" => &["cnn"],
            "mongabay" | "mongabay.co.id" => &["mongabay-graphql", "mongabay-search"],
            "mongabay-graphql" => &["mongabay-graphql"],
            "mongabay-search" => &["mongabay-search"],
            "" => &[],
            other => return Err(Error::Config(format!("unknown source: {other}"))),
        };
        for id in expanded {
            if !ids.contains(id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Err(Error::Config("no source selected".into()));
    }

    Ok(ids
        .into_iter()
        .map(|id| -> Box<dyn SourceAdapter> {
            match id {
                "cnn" => Box::new(CnnAdapter::new()),
                "mongabay-graphql" => Box::new(MongabayGraphqlAdapter::new()),
                _ => Box::new(MongabaySearchAdapter::new()),
            }
        })
        .collect())
}
