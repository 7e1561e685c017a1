//! CNN Indonesia adapter.
//!
//! Search goes through the site's JSON API, ten results per page:
//!
//! ```text
//! GET /api/v2/search?query=<keyword>&start=<offset>&limit=10
//! { "data": [ { "url": "https://www.cnnindonesia.com/..." }, ... ], "message": "..." }
//! ```
//!
//! An empty `data` array ends the chain. Article pages are plain HTML with the
//! body in `div.detail-text`; some article URLs answer with a redirect first.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    AdapterOutput, SourceAdapter, element_text, follow_redirect, usable_keywords, with_page_metadata,
};
use crate::dates::parse_indonesian_date;
use crate::error::{Error, Result};
use crate::fetch::FetchResponse;
use crate::models::{ArticleRecord, CrawlContext, CrawlRequest, Cursor, RequestKind};

pub const SOURCE_ID: &str = "cnnindonesia.com";
const DEFAULT_BASE_URL: &str = "https://www.cnnindonesia.com";
const PAGE_SIZE: u32 = 10;

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("div.detail-text").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1 + div + div").unwrap());
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div.author").unwrap());

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<SearchItem>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CnnAdapter {
    base_url: String,
}

impl Default for CnnAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CnnAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, keyword: &str, offset: u32) -> String {
        format!(
            "{}/api/v2/search?query={}&start={}&limit={}",
            self.base_url,
            urlencoding::encode(keyword),
            offset,
            PAGE_SIZE
        )
    }

    #[instrument(level = "debug", skip_all, fields(keyword = %request.context.keyword))]
    fn handle_search(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        let parsed: SearchResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::Parse(format!("CNN search JSON from {}: {e}", response.url)))?;
        let items = parsed.data.unwrap_or_default();
        let offset = match request.context.cursor {
            Some(Cursor::Offset(n)) => n,
            _ => 0,
        };
        debug!(offset, items = items.len(), message = ?parsed.message, "CNN search page");

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let next_offset = offset + PAGE_SIZE;
        let mut out = Vec::with_capacity(items.len() + 1);
        out.push(AdapterOutput::Request(CrawlRequest::new(
            self.search_url(&request.context.keyword, next_offset),
            RequestKind::Pagination,
            request.context.clone().with_cursor(Cursor::Offset(next_offset)),
        )));

        let article_context = CrawlContext {
            cursor: None,
            ..request.context
        };
        out.extend(
            items
                .into_iter()
                .filter_map(|item| item.url)
                .filter(|url| !url.trim().is_empty())
                .map(|url| {
                    AdapterOutput::Request(CrawlRequest::new(url, RequestKind::Article, article_context.clone()))
                }),
        );
        Ok(out)
    }

    fn parse_article(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        let document = Html::parse_document(&response.body);
        let body = document
            .select(&BODY)
            .next()
            .ok_or_else(|| Error::Parse(format!("no div.detail-text in {}", request.url)))?;

        let title = document.select(&TITLE).next().map(element_text).unwrap_or_default();
        let date = document
            .select(&DATE)
            .next()
            .map(element_text)
            .and_then(|raw| parse_indonesian_date(&raw));
        let author = document.select(&AUTHOR).next().map(element_text);
        let content = element_text(body);

        let Some(record) = ArticleRecord::new(title, content, request.url.clone(), &request.context) else {
            debug!(url = %request.url, "Empty CNN article; skipping");
            return Ok(Vec::new());
        };
        let record = with_page_metadata(record, &request.context, author, date);
        Ok(vec![AdapterOutput::Article(record)])
    }
}

impl SourceAdapter for CnnAdapter {
    fn id(&self) -> &'static str {
        "cnn"
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
                    self.search_url(keyword, 0),
                    RequestKind::Search,
                    CrawlContext::new(keyword, SOURCE_ID).with_cursor(Cursor::Offset(0)),
                )
            })
            .collect())
    }

    fn handle(&self, response: &FetchResponse, request: CrawlRequest) -> Result<Vec<AdapterOutput>> {
        if response.is_redirect() {
            return Ok(follow_redirect(response, request));
        }
        match request.kind {
            RequestKind::Search | RequestKind::Pagination => self.handle_search(response, request),
            RequestKind::Article | RequestKind::Redirect => self.parse_article(response, request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const ARTICLE_HTML: &str = r#"
        <html><body>
          <h1>Banjir Rendam Ratusan Rumah di Gianyar</h1>
          <div class="share">Bagikan</div>
          <div class="date">Selasa, 12 Mar 2024 14:35 WIB</div>
          <div class="author">Ni Made Sari</div>
          <div class="detail-text">
            <p>Banjir melanda Desa Sukawati,   Kabupaten Gianyar.</p>
            <p>Warga mengungsi.</p>
          </div>
        </body></html>"#;

    fn adapter() -> CnnAdapter {
        CnnAdapter::with_base_url("https://cnn.test/")
    }

    fn search_request(offset: u32) -> CrawlRequest {
        CrawlRequest::new(
            adapter().search_url("banjir Gianyar", offset),
            if offset == 0 { RequestKind::Search } else { RequestKind::Pagination },
            CrawlContext::new("banjir Gianyar", SOURCE_ID).with_cursor(Cursor::Offset(offset)),
        )
    }

    fn requests(out: &[AdapterOutput]) -> Vec<&CrawlRequest> {
        out.iter()
            .filter_map(|o| match o {
                AdapterOutput::Request(r) => Some(r),
                AdapterOutput::Article(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_start_encodes_keywords() {
        let reqs = adapter()
            .start(&["banjir Gianyar".to_string(), "".to_string()])
            .unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].url, "https://cnn.test/api/v2/search?query=banjir%20Gianyar&start=0&limit=10");
        assert_eq!(reqs[0].kind, RequestKind::Search);
        assert!(matches!(adapter().start(&[]), Err(Error::Config(_))));
    }

    #[test]
    fn test_search_page_yields_next_page_and_articles() {
        let body = r#"{"data":[{"url":"https://cnn.test/a1"},{"url":""},{"title":"no url"},{"url":"https://cnn.test/a2"}],"message":"ok"}"#;
        let req = search_request(10);
        let out = adapter().handle(&FetchResponse::ok(&req.url, body), req).unwrap();
        let reqs = requests(&out);
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].kind, RequestKind::Pagination);
        assert_eq!(reqs[0].context.cursor, Some(Cursor::Offset(20)));
        assert!(reqs[0].url.ends_with("start=20&limit=10"));
        assert_eq!(reqs[1].url, "https://cnn.test/a1");
        assert_eq!(reqs[1].kind, RequestKind::Article);
        assert_eq!(reqs[1].context.cursor, None);
        assert_eq!(reqs[2].url, "https://cnn.test/a2");
    }

    #[test]
    fn test_empty_page_terminates() {
        let req = search_request(30);
        let out = adapter()
            .handle(&FetchResponse::ok(&req.url, r#"{"data":[],"message":"not found"}"#), req)
            .unwrap();
        assert!(out.is_empty());

        let req = search_request(40);
        let out = adapter()
            .handle(&FetchResponse::ok(&req.url, r#"{"data":null}"#), req)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let req = search_request(0);
        let err = adapter()
            .handle(&FetchResponse::ok(&req.url, "<html>blocked</html>"), req)
            .unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_article_page_is_parsed() {
        let req = CrawlRequest::new(
            "https://cnn.test/a1",
            RequestKind::Article,
            CrawlContext::new("banjir Gianyar", SOURCE_ID),
        );
        let out = adapter()
            .handle(&FetchResponse::ok("https://cnn.test/a1", ARTICLE_HTML), req)
            .unwrap();
        let [AdapterOutput::Article(record)] = out.as_slice() else {
            panic!("expected exactly one article, got {out:?}");
        };
        assert_eq!(record.title, "Banjir Rendam Ratusan Rumah di Gianyar");
        assert_eq!(record.content, "Banjir melanda Desa Sukawati, Kabupaten Gianyar. Warga mengungsi.");
        assert_eq!(record.author.as_deref(), Some("Ni Made Sari"));
        assert_eq!(
            record.publish_date,
            NaiveDate::from_ymd_opt(2024, 3, 12).unwrap().and_hms_opt(14, 35, 0)
        );
        assert_eq!(record.source_id, SOURCE_ID);
        assert_eq!(record.url, "https://cnn.test/a1");
    }

    #[test]
    fn test_missing_body_is_parse_error() {
        let req = CrawlRequest::new(
            "https://cnn.test/a1",
            RequestKind::Article,
            CrawlContext::new("banjir Gianyar", SOURCE_ID),
        );
        let err = adapter()
            .handle(&FetchResponse::ok("https://cnn.test/a1", "<h1>Only a title</h1>"), req)
            .unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_redirect_then_article() {
        let req = CrawlRequest::new(
            "https://cnn.test/old",
            RequestKind::Article,
            CrawlContext::new("banjir Gianyar", SOURCE_ID),
        );
        let out = adapter()
            .handle(&FetchResponse::redirect("https://cnn.test/old", "/new"), req)
            .unwrap();
        let [AdapterOutput::Request(next)] = out.as_slice() else {
            panic!("expected one redirect request");
        };
        assert_eq!(next.kind, RequestKind::Redirect);

        let out = adapter()
            .handle(&FetchResponse::ok(&next.url, ARTICLE_HTML), next.clone())
            .unwrap();
        assert!(matches!(out.as_slice(), [AdapterOutput::Article(r)] if r.url == "https://cnn.test/new"));
    }
}
