//! Error type shared by the crawl and resolution stages.
//!
//! Errors are classified so that callers can decide how far a failure
//! propagates: [`Error::Parse`] ends a single crawl branch, [`Error::Config`]
//! aborts one adapter, and transient transport failures are retried by
//! [`crate::client::RateLimitedClient`].

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status we cannot use.
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    /// Malformed page or JSON body.
    #[error("parse error: {0}")]
    Parse(String),

    /// Missing or invalid configuration (no keyword, unknown source, ...).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this failure is local to one crawl branch.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}
