//! Record filters applied between crawling and location resolution.
//!
//! - [`DateFilter`]: drops records published outside the acceptance window
//! - [`RelevanceFilter`]: checks that an article actually talks about a
//!   disaster in the region it was searched for

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::ArticleRecord;
use crate::utils::clean_content;

/// Inclusive acceptance window for publication dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl DateWindow {
    /// Window starting at midnight of `since`, optionally ending at the last
    /// second of `until`.
    pub fn from_dates(since: NaiveDate, until: Option<NaiveDate>) -> Self {
        Self {
            start: since.and_time(NaiveTime::MIN),
            end: until.and_then(|d| d.and_hms_opt(23, 59, 59)),
        }
    }

    pub fn contains(&self, dt: &NaiveDateTime) -> bool {
        *dt >= self.start && self.end.is_none_or(|end| *dt <= end)
    }
}

/// Keeps records inside the window; records without a date are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    window: Option<DateWindow>,
}

impl DateFilter {
    pub fn new(window: Option<DateWindow>) -> Self {
        Self { window }
    }

    pub fn accept(&self, record: &ArticleRecord) -> bool {
        match (&self.window, &record.publish_date) {
            (Some(window), Some(date)) => window.contains(date),
            _ => true,
        }
    }
}

/// Disaster terms searched for by default.
pub const DEFAULT_DISASTER_TERMS: &[&str] =
    &["banjir", "gempa", "tanah longsor", "longsor", "erupsi", "badai"];

/// Flags whether an article mentions a disaster term and its region.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    terms: Vec<String>,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DISASTER_TERMS.iter().map(|s| s.to_string()).collect())
    }
}

impl RelevanceFilter {
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// `true` when the cleaned text mentions one of the disaster terms and,
    /// if a region is known, the region too.
    pub fn is_relevant(&self, record: &ArticleRecord, region_hint: Option<&str>) -> bool {
        let text = clean_content(&format!("{} {}", record.title, record.content));
        let disaster_mentioned = self.terms.iter().any(|t| text.contains(t.as_str()));
        let region_mentioned = region_hint
            .map(|r| text.contains(&clean_content(r)))
            .unwrap_or(true);
        disaster_mentioned && region_mentioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CrawlContext;

    fn record_on(date: Option<NaiveDateTime>) -> ArticleRecord {
        let ctx = CrawlContext::new("banjir Gianyar", "cnnindonesia.com");
        ArticleRecord::new("Banjir di Gianyar", "Air setinggi lutut.", "https://example.com/a", &ctx)
            .unwrap()
            .with_publish_date(date)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_lower_bound_is_inclusive() {
        let filter = DateFilter::new(Some(DateWindow::from_dates(day(2024, 1, 10), None)));
        let at_bound = day(2024, 1, 10).and_time(NaiveTime::MIN);
        let day_before = day(2024, 1, 9).and_time(NaiveTime::MIN);
        assert!(filter.accept(&record_on(Some(at_bound))));
        assert!(!filter.accept(&record_on(Some(day_before))));
    }

    #[test]
    fn test_upper_bound_covers_whole_day() {
        let window = DateWindow::from_dates(day(2024, 1, 1), Some(day(2024, 1, 31)));
        let filter = DateFilter::new(Some(window));
        assert!(filter.accept(&record_on(Some(day(2024, 1, 31).and_hms_opt(23, 0, 0).unwrap()))));
        assert!(!filter.accept(&record_on(Some(day(2024, 2, 1).and_time(NaiveTime::MIN)))));
    }

    #[test]
    fn test_missing_date_is_kept() {
        let filter = DateFilter::new(Some(DateWindow::from_dates(day(2024, 1, 10), None)));
        assert!(filter.accept(&record_on(None)));
    }

    #[test]
    fn test_no_window_accepts_everything() {
        let filter = DateFilter::default();
        assert!(filter.accept(&record_on(Some(day(1999, 1, 1).and_time(NaiveTime::MIN)))));
    }

    #[test]
    fn test_relevance_requires_term_and_region() {
        let filter = RelevanceFilter::default();
        let record = record_on(None);
        assert!(filter.is_relevant(&record, Some("Gianyar")));
        assert!(!filter.is_relevant(&record, Some("Buleleng")));
        assert!(filter.is_relevant(&record, None));

        let ctx = CrawlContext::new("banjir Gianyar", "cnnindonesia.com");
        let off_topic =
            ArticleRecord::new("Festival budaya", "Gianyar meriah.", "https://example.com/b", &ctx).unwrap();
        assert!(!filter.is_relevant(&off_topic, Some("Gianyar")));
    }
}
