//! HTTP fetching for the crawl stage.
//!
//! Redirects are *not* followed by the client: a 3xx answer is returned as a
//! [`FetchResponse`] carrying its `Location`, and the source adapter decides
//! whether to follow it (at most once per original request).

use crate::error::{Error, Result};
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Browser-like user agents rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 12; Pixel 6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.5060.129 Mobile Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// A fetched page, or a redirect notice.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// The URL that was requested.
    pub url: String,
    pub status: u16,
    /// `Location` header of a redirect response.
    pub location: Option<String>,
    pub body: String,
}

impl FetchResponse {
    /// A `200 OK` response with the given body.
    #[cfg(test)]
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            location: None,
            body: body.into(),
        }
    }

    /// A `301 Moved Permanently` response pointing at `location`.
    #[cfg(test)]
    pub fn redirect(url: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 301,
            location: Some(location.into()),
            body: String::new(),
        }
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Capability to fetch a URL.
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// `reqwest`-backed fetcher with rotating user agents.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agents: Arc<Vec<String>>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            user_agents: Arc::new(USER_AGENTS.iter().map(|s| s.to_string()).collect()),
        })
    }

    /// Use a fixed user agent instead of the rotating set.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agents = Arc::new(vec![user_agent.into()]);
        self
    }

    fn pick_user_agent(&self) -> &str {
        let idx = rng().random_range(0..self.user_agents.len());
        &self.user_agents[idx]
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "id-ID,id;q=0.9,en;q=0.8")
            .send()
            .await?;

        let status = resp.status();
        if status.is_redirection() {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            debug!(status = status.as_u16(), ?location, "Redirect response");
            return Ok(FetchResponse {
                url: url.to_string(),
                status: status.as_u16(),
                location,
                body: String::new(),
            });
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(FetchResponse {
            url: url.to_string(),
            status: status.as_u16(),
            location: None,
            body,
        })
    }
}
