//! Mongabay Indonesia adapters.
//!
//! Two independent ways into the same site, both landing on the same article
//! page parser:
//!
//! - [`MongabayGraphqlAdapter`]: WPGraphQL `contentNodes` search, 24 nodes
//!   per page, paged with `pageInfo.endCursor`. Listing metadata (date, byline)
//!   rides along to the article request.
//! - [`MongabaySearchAdapter`]: the rendered `/page/<n>?s=<keyword>` search
//!   pages, paged through the numbered pagination links.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, instrument};
use url::Url;

use super::{
    AdapterOutput, SourceAdapter, element_text, follow_redirect, usable_keywords, with_page_metadata,
};
use crate::dates::parse_indonesian_date;
use crate::error::{Error, Result};
use crate::fetch::FetchResponse;
use crate::models::{ArticleRecord, CrawlContext, CrawlRequest, Cursor, RequestKind};
use crate::utils::normalize_whitespace;

pub const SOURCE_ID: &str = "mongabay.co.id";
const DEFAULT_BASE_URL: &str = "https://www.mongabay.co.id";
const GRAPHQL_PAGE_SIZE: u32 = 24;

static HEADLINE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#headline .article-headline h1").unwrap());
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("#main").unwrap());
static META: Lazy<Selector> = Lazy::new(|| Selector::parse(".single-article-meta").unwrap());
static META_AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".single-article-meta a").unwrap());

static POST_NEWS: Lazy<Selector> = Lazy::new(|| Selector::parse("article.post-news").unwrap());
static ANY_ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static POST: Lazy<Selector> = Lazy::new(|| Selector::parse(".post").unwrap());
static POST_TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".post-title-news a[href]").unwrap());
static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static NEXT_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.next[href]").unwrap());
static REL_NEXT: Lazy<Selector> = Lazy::new(|| Selector::parse("link[rel=next][href]").unwrap());
static PAGE_NUMBERS: Lazy<Selector> = Lazy::new(|| Selector::parse("a.page-numbers[href]").unwrap());

static DATED_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d{4}(?:-\d{2}-\d{2})?/").unwrap());

/// Parse an article page into at most one record.
///
/// Nothing on a Mongabay page is strictly required; a page with neither a
/// headline nor a `#main` body yields no record.
fn parse_article(response: &FetchResponse, request: CrawlRequest) -> Vec<AdapterOutput> {
    let document = Html::parse_document(&response.body);

    let title = document.select(&HEADLINE).next().map(element_text).unwrap_or_default();
    let content = document.select(&MAIN).next().map(element_text).unwrap_or_default();
    let author = document.select(&META_AUTHOR).next().map(element_text);
    let date = document.select(&META).next().and_then(meta_date);

    let Some(record) = ArticleRecord::new(title, content, request.url.clone(), &request.context) else {
        debug!(url = %request.url, "Empty Mongabay article page; skipping");
        return Vec::new();
    };
    vec![AdapterOutput::Article(with_page_metadata(
        record,
        &request.context,
        author,
        date,
    ))]
}

/// The meta line reads `"<author link> <d> <Month> <yyyy>"`; only the
/// element's own text nodes carry the date, as its last three words.
fn meta_date(meta: ElementRef<'_>) -> Option<chrono::NaiveDateTime> {
    let own_text: String = meta
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.text.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    let words: Vec<&str> = own_text.split_whitespace().collect();
    if words.len() < 3 {
        return None;
    }
    parse_indonesian_date(&words[words.len() - 3..].join(" "))
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlData {
    content_nodes: Option<ContentNodes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentNodes {
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Option<ContentNode>,
}

#[derive(Debug, Deserialize)]
struct ContentNode {
    link: Option<String>,
    date: Option<String>,
    byline: Option<Byline>,
}

#[derive(Debug, Deserialize)]
struct Byline {
    #[serde(default)]
    nodes: Vec<BylineNode>,
}

#[derive(Debug, Deserialize)]
struct BylineNode {
    name: Option<String>,
}

/// Adapter for the WPGraphQL endpoint.
#[derive(Debug, Clone)]
pub struct MongabayGraphqlAdapter {
    base_url: String,
}

impl Default for MongabayGraphqlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MongabayGraphqlAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn query_url(&self, keyword: &str, after: Option<&str>) -> String {
        let fields = "__typename,title,link,date,byline{nodes{name}}";
        let after = after
            .map(|c| format!(",after:\"{}\"", escape_graphql(c)))
            .unwrap_or_default();
        let query = format!(
            "query{{contentNodes(where:{{status:PUBLISH,search:\"{kw}\",\
             contentTypes:[POST,SHORT_ARTICLE,VIDEOS,PODCASTS,SPECIALS]}}\
             first:{GRAPHQL_PAGE_SIZE}{after}){{pageInfo{{hasNextPage,endCursor}}\
             edges{{node{{...on Post{{{fields}}}...on ShortArticle{{{fields}}}\
             ...on Video{{{fields}}}...on Podcast{{{fields}}}}}}}}}}}",
            kw = escape_graphql(keyword),
        );
        format!("{}/graphql?query={}", self.base_url, urlencoding::encode(&query))
    }

    #[instrument(level = "debug", skip_all, fields(keyword = %request.context.keyword))]
    fn handle_listing(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        let parsed: GraphqlResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("Mongabay GraphQL JSON from {}: {e}", response.url)))?;
        let nodes = parsed
            .data
            .and_then(|d| d.content_nodes)
            .ok_or_else(|| Error::Parse(format!("no contentNodes in {}", response.url)))?;
        debug!(edges = nodes.edges.len(), "Mongabay GraphQL page");

        if nodes.edges.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        if let Some(PageInfo { has_next_page: true, end_cursor: Some(cursor) }) = nodes.page_info {
            out.push(AdapterOutput::Request(CrawlRequest::new(
                self.query_url(&request.context.keyword, Some(&cursor)),
                RequestKind::Pagination,
                request.context.clone().with_cursor(Cursor::After(cursor)),
            )));
        }

        for node in nodes.edges.into_iter().filter_map(|e| e.node) {
            let Some(link) = node.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            let author = node
                .byline
                .and_then(|b| b.nodes.into_iter().next())
                .and_then(|n| n.name);
            let context = CrawlContext {
                cursor: None,
                publish_date_override: node.date,
                author_override: author,
                ..request.context.clone()
            };
            out.push(AdapterOutput::Request(CrawlRequest::new(link, RequestKind::Article, context)));
        }
        Ok(out)
    }
}

fn escape_graphql(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl SourceAdapter for MongabayGraphqlAdapter {
    fn id(&self) -> &'static str {
        "mongabay-graphql"
    }

    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn start(&self, keywords: &[String]) -> Result<Vec<CrawlRequest>> {
        let keywords = usable_keywords(self.id(), keywords)?;
        Ok(keywords
            .into_iter()
            .map(|keyword| {
                CrawlRequest::new(
                    self.query_url(keyword, None),
                    RequestKind::Search,
                    CrawlContext::new(keyword, SOURCE_ID),
                )
            })
            .collect())
    }

    fn handle(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        if response.is_redirect() {
            return Ok(follow_redirect(response, request));
        }
        if request.kind.is_listing() {
            self.handle_listing(response, request)
        } else {
            Ok(parse_article(response, request))
        }
    }
}

// ---------------------------------------------------------------------------
// HTML search
// ---------------------------------------------------------------------------

/// Adapter for the rendered search result pages.
#[derive(Debug, Clone)]
pub struct MongabaySearchAdapter {
    base_url: String,
}

impl Default for MongabaySearchAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MongabaySearchAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn page_url(&self, keyword: &str, page: u32) -> String {
        format!("{}/page/{}?s={}", self.base_url, page, urlencoding::encode(keyword))
    }

    #[instrument(level = "debug", skip_all, fields(keyword = %request.context.keyword))]
    fn handle_listing(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        let base = Url::parse(&response.url)
            .map_err(|e| Error::Parse(format!("bad listing URL {}: {e}", response.url)))?;
        let document = Html::parse_document(&response.body);
        let page = match request.context.cursor {
            Some(Cursor::Page(n)) => n,
            _ => 1,
        };

        let mut articles: Vec<ElementRef<'_>> = document.select(&POST_NEWS).collect();
        if articles.is_empty() {
            articles = document.select(&ANY_ARTICLE).collect();
        }
        if articles.is_empty() {
            articles = document.select(&POST).collect();
        }

        let mut seen = HashSet::new();
        let mut links: Vec<String> = articles
            .iter()
            .filter_map(|article| {
                article
                    .select(&POST_TITLE_LINK)
                    .next()
                    .or_else(|| article.select(&ANY_LINK).next())
            })
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .map(|u| u.to_string())
            .filter(|u| seen.insert(u.clone()))
            .collect();

        if articles.is_empty() {
            links = dated_links(&document, &base);
            debug!(count = links.len(), "No article elements; following dated links");
        }
        debug!(page, articles = articles.len(), links = links.len(), "Mongabay search page");

        let mut out = Vec::new();
        if let Some(next_url) = next_page_link(&document, &base, page) {
            out.push(AdapterOutput::Request(CrawlRequest::new(
                next_url,
                RequestKind::Pagination,
                request.context.clone().with_cursor(Cursor::Page(page + 1)),
            )));
        }
        let article_context = CrawlContext {
            cursor: None,
            ..request.context
        };
        out.extend(links.into_iter().map(|link| {
            AdapterOutput::Request(CrawlRequest::new(link, RequestKind::Article, article_context.clone()))
        }));
        Ok(out)
    }
}

/// Same-host links whose path carries a year (`/2024/`) or a date.
fn dated_links(document: &Html, base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .select(&ANY_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|u| u.host_str() == base.host_str())
        .filter(|u| DATED_PATH.is_match(u.path()))
        .map(|u| u.to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Link to page `current + 1`, if the page offers one.
fn next_page_link(document: &Html, base: &Url, current: u32) -> Option<String> {
    let wanted = (current + 1).to_string();
    document
        .select(&NEXT_LINK)
        .chain(document.select(&REL_NEXT))
        .chain(
            document
                .select(&PAGE_NUMBERS)
                .filter(|a| normalize_whitespace(&a.text().collect::<String>()) == wanted),
        )
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
}

impl SourceAdapter for MongabaySearchAdapter {
    fn id(&self) -> &'static str {
        "mongabay-search"
    }

    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn start(&self, keywords: &[String]) -> Result<Vec<CrawlRequest>> {
        let keywords = usable_keywords(self.id(), keywords)?;
        Ok(keywords
            .into_iter()
            .map(|keyword| {
                CrawlRequest::new(
                    self.page_url(keyword, 1),
                    RequestKind::Search,
                    CrawlContext::new(keyword, SOURCE_ID).with_cursor(Cursor::Page(1)),
                )
            })
            .collect())
    }

    fn handle(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        if response.is_redirect() {
            return Ok(follow_redirect(response, request));
        }
        if request.kind.is_listing() {
            self.handle_listing(response, request)
        } else {
            Ok(parse_article(response, request))
        }
    }
}
