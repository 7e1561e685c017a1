//! Run configuration.
//!
//! Everything has a default, so an absent or partial YAML file is fine:
//!
//! ```yaml
//! crawl:
//!   sources: [cnn, mongabay]
//!   keywords: ["banjir Gianyar", "longsor Bangli"]
//!   concurrency: 8
//!   min_delay_ms: 500
//! geocoder:
//!   country_context: "Bali, Indonesia"
//!   cache_path: ./geocode-cache.json
//! window:
//!   max_age_days: 30
//! sanity:
//!   max_distance_m: 60000
//! relevance:
//!   drop_irrelevant: false
//! ```
//!
//! Command-line flags are applied on top of the file in `main`.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

use crate::client::RetryPolicy;
use crate::error::{Error, Result};
use crate::filters::{DEFAULT_DISASTER_TERMS, DateWindow};

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_COUNTRY_CONTEXT: &str = "Bali, Indonesia";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub crawl: CrawlConfig,
    pub geocoder: GeocoderConfig,
    pub window: WindowConfig,
    pub sanity: SanityConfig,
    pub relevance: RelevanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub sources: Vec<String>,
    pub keywords: Vec<String>,
    /// Global cap on fetches in flight.
    pub concurrency: usize,
    /// Floor between two fetches to the same source.
    pub min_delay_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub timeout_secs: u64,
    /// Fixed user agent; the built-in rotating set is used when unset.
    pub user_agent: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            sources: vec!["cnn".into(), "mongabay".into()],
            keywords: Vec::new(),
            concurrency: 8,
            min_delay_ms: 500,
            max_retries: 3,
            retry_base_ms: 1000,
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl CrawlConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Sent with every geocoder request; public Nominatim requires one.
    pub user_agent: String,
    pub min_delay_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub timeout_secs: u64,
    /// Appended to every query, e.g. `"Bali, Indonesia"`.
    pub country_context: String,
    pub country_codes: Option<String>,
    /// Articles resolved at the same time.
    pub concurrency: usize,
    pub cache_path: Option<String>,
    /// Extra place names for the gazetteer recognizer.
    pub extra_places: Vec<String>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODER_ENDPOINT.into(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
            min_delay_ms: 1000,
            max_retries: 2,
            retry_base_ms: 1000,
            timeout_secs: 20,
            country_context: DEFAULT_COUNTRY_CONTEXT.into(),
            country_codes: Some("id".into()),
            concurrency: 4,
            cache_path: None,
            extra_places: Vec::new(),
        }
    }
}

impl GeocoderConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Publication-date acceptance window. Explicit dates win over `max_age_days`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub max_age_days: Option<u64>,
}

impl WindowConfig {
    /// The window to apply, relative to `today`; `None` accepts everything.
    pub fn to_window(&self, today: NaiveDate) -> Result<Option<DateWindow>> {
        let since = match (self.since, self.max_age_days) {
            (Some(since), _) => Some(since),
            (None, Some(days)) => Some(
                today
                    .checked_sub_days(Days::new(days))
                    .ok_or_else(|| Error::Config(format!("max_age_days out of range: {days}")))?,
            ),
            (None, None) => None,
        };

        match (since, self.until) {
            (Some(since), Some(until)) if until < since => Err(Error::Config(format!(
                "window ends ({until}) before it starts ({since})"
            ))),
            (Some(since), until) => Ok(Some(DateWindow::from_dates(since, until))),
            (None, Some(until)) => Ok(Some(DateWindow {
                start: NaiveDateTime::MIN,
                end: until.and_hms_opt(23, 59, 59),
            })),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    /// Resolved points farther than this from their regency anchor are
    /// flagged implausible.
    pub max_distance_m: f64,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self { max_distance_m: 60_000.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub terms: Vec<String>,
    pub drop_irrelevant: bool,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            terms: DEFAULT_DISASTER_TERMS.iter().map(|s| s.to_string()).collect(),
            drop_irrelevant: false,
        }
    }
}

impl PipelineConfig {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.crawl.concurrency == 0 {
            return Err(Error::Config("crawl.concurrency must be at least 1".into()));
        }
        if self.geocoder.concurrency == 0 {
            return Err(Error::Config("geocoder.concurrency must be at least 1".into()));
        }
        if self.geocoder.user_agent.trim().is_empty() {
            return Err(Error::Config("geocoder.user_agent must not be empty".into()));
        }
        let radius = self.sanity.max_distance_m;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::Config("sanity.max_distance_m must be positive".into()));
        }
        Ok(())
    }
}

/// Load a YAML configuration file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let config: PipelineConfig = serde_yaml::from_str(&raw)?;
    config.validate()?;
    info!("Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "crawl:\n  keywords: [\"banjir Gianyar\"]\n  concurrency: 2\nwindow:\n  since: 2024-01-10\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.crawl.keywords, vec!["banjir Gianyar".to_string()]);
        assert_eq!(config.crawl.concurrency, 2);
        assert_eq!(config.crawl.min_delay_ms, 500);
        assert_eq!(config.crawl.sources, vec!["cnn".to_string(), "mongabay".to_string()]);
        assert_eq!(config.geocoder.country_context, "Bali, Indonesia");
        assert_eq!(config.window.since, Some(day(2024, 1, 10)));
        assert!(!config.relevance.drop_irrelevant);
    }

    #[test]
    fn test_window_from_explicit_dates() {
        let window = WindowConfig { since: Some(day(2024, 1, 1)), until: Some(day(2024, 1, 31)), max_age_days: Some(3) };
        let w = window.to_window(day(2024, 6, 1)).unwrap().unwrap();
        assert_eq!(w.start, day(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(w.end, day(2024, 1, 31).and_hms_opt(23, 59, 59));
    }

    #[test]
    fn test_window_from_max_age() {
        let window = WindowConfig { max_age_days: Some(7), ..WindowConfig::default() };
        let w = window.to_window(day(2024, 3, 10)).unwrap().unwrap();
        assert_eq!(w.start, day(2024, 3, 3).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(w.end, None);
        assert_eq!(WindowConfig::default().to_window(day(2024, 3, 10)).unwrap(), None);
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let window = WindowConfig { since: Some(day(2024, 2, 1)), until: Some(day(2024, 1, 1)), max_age_days: None };
        assert!(matches!(window.to_window(day(2024, 3, 1)), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
        let mut config = PipelineConfig::default();
        config.crawl.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sanity:\n  max_distance_m: 25000").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sanity.max_distance_m, 25_000.0);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "geocoder:\n  concurrency: 0").unwrap();
        assert!(matches!(load_config(bad.path()), Err(Error::Config(_))));
    }
}
