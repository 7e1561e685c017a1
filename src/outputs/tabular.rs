//! CSV output.
//!
//! Headers are written explicitly so an empty run still produces a file with
//! the full column set.

use serde::Serialize;
use std::path::PathBuf;
use tracing::instrument;

use super::{ARTICLES_CSV, RESOLVED_CSV, write_output};
use crate::dates::format_timestamp;
use crate::error::{Error, Result};
use crate::models::{ArticleRecord, ResolvedArticle};

pub const ARTICLE_COLUMNS: &[&str] = &["title", "content", "author", "publish_date", "source", "keyword", "url"];

pub const RESOLVED_COLUMNS: &[&str] = &[
    "title",
    "content",
    "author",
    "publish_date",
    "source",
    "keyword",
    "url",
    "latitude",
    "longitude",
    "refined_location",
    "refine_source",
    "refined_location_query",
    "sanity",
    "distance_from_anchor_m",
    "is_relevant",
];

/// One crawled article as written to `articles.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRow {
    pub title: String,
    pub content: String,
    pub author: String,
    pub publish_date: String,
    pub source: String,
    pub keyword: String,
    pub url: String,
}

impl From<&ArticleRecord> for ArticleRow {
    fn from(r: &ArticleRecord) -> Self {
        Self {
            title: r.title.clone(),
            content: r.content.clone(),
            author: r.author.clone().unwrap_or_default(),
            publish_date: r.publish_date.as_ref().map(format_timestamp).unwrap_or_default(),
            source: r.source_id.clone(),
            keyword: r.keyword.clone(),
            url: r.url.clone(),
        }
    }
}

/// One resolved article; also used as GeoJSON feature properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRow {
    pub title: String,
    pub content: String,
    pub author: String,
    pub publish_date: String,
    pub source: String,
    pub keyword: String,
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub refined_location: String,
    pub refine_source: String,
    pub refined_location_query: String,
    pub sanity: String,
    pub distance_from_anchor_m: Option<f64>,
    pub is_relevant: Option<bool>,
}

impl From<&ResolvedArticle> for ResolvedRow {
    fn from(a: &ResolvedArticle) -> Self {
        let base = ArticleRow::from(&a.record);
        Self {
            title: base.title,
            content: base.content,
            author: base.author,
            publish_date: base.publish_date,
            source: base.source,
            keyword: base.keyword,
            url: base.url,
            latitude: a.location.lat(),
            longitude: a.location.lon(),
            refined_location: a.location.display_name().unwrap_or_default().to_string(),
            refine_source: a.location.provenance.map(|p| p.as_str().to_string()).unwrap_or_default(),
            refined_location_query: a.location.query.clone().unwrap_or_default(),
            sanity: a.sanity.as_str().to_string(),
            distance_from_anchor_m: a.sanity.distance_m().map(|d| d.round()),
            is_relevant: a.relevant,
        }
    }
}

fn to_csv<T: Serialize>(columns: &[&str], rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

pub fn articles_to_csv(records: &[ArticleRecord]) -> Result<Vec<u8>> {
    to_csv(ARTICLE_COLUMNS, records.iter().map(ArticleRow::from))
}

pub fn resolved_to_csv(articles: &[ResolvedArticle]) -> Result<Vec<u8>> {
    to_csv(RESOLVED_COLUMNS, articles.iter().map(ResolvedRow::from))
}

#[instrument(level = "info", skip_all, fields(%output_dir, count = records.len()))]
pub async fn write_articles_csv(records: &[ArticleRecord], output_dir: &str) -> Result<PathBuf> {
    write_output(output_dir, ARTICLES_CSV, articles_to_csv(records)?).await
}

#[instrument(level = "info", skip_all, fields(%output_dir, count = articles.len()))]
pub async fn write_resolved_csv(articles: &[ResolvedArticle], output_dir: &str) -> Result<PathBuf> {
    write_output(output_dir, RESOLVED_CSV, resolved_to_csv(articles)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlContext, GeoPoint, GeocodeQuery, Provenance, ResolvedLocation, Sanity};
    use chrono::NaiveDate;

    fn record() -> ArticleRecord {
        let ctx = CrawlContext::new("banjir Gianyar", "cnnindonesia.com");
        ArticleRecord::new("Banjir, lagi", "Air \"setinggi\" lutut.", "https://example.com/a", &ctx)
            .unwrap()
            .with_publish_date(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap().and_hms_opt(14, 35, 0))
    }

    fn resolved() -> ResolvedArticle {
        let query = GeocodeQuery {
            text: "Ubud, Gianyar, Indonesia".into(),
            provenance: Provenance::ArticlePlace,
        };
        ResolvedArticle {
            record: record(),
            location: ResolvedLocation::found(
                GeoPoint { lat: -8.5069, lon: 115.2625, display_name: "Ubud".into() },
                &query,
            ),
            sanity: Sanity::Plausible { distance_m: 7949.6 },
            relevant: Some(true),
        }
    }

    #[test]
    fn test_empty_articles_csv_has_header() {
        let bytes = articles_to_csv(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "title,content,author,publish_date,source,keyword,url\n");
    }

    #[test]
    fn test_article_row_quoting() {
        let text = String::from_utf8(articles_to_csv(&[record()]).unwrap()).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert_eq!(
            line,
            r#""Banjir, lagi","Air ""setinggi"" lutut.",,2024-03-12 14:35:00,cnnindonesia.com,banjir Gianyar,https://example.com/a"#
        );
    }

    #[test]
    fn test_resolved_row_columns() {
        let text = String::from_utf8(resolved_to_csv(&[resolved()]).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), RESOLVED_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.ends_with(
            "-8.5069,115.2625,Ubud,article_place,\"Ubud, Gianyar, Indonesia\",plausible,7950.0,true"
        ));
    }

    #[test]
    fn test_unresolved_row_leaves_location_empty() {
        let article = ResolvedArticle {
            location: ResolvedLocation::unresolved(),
            sanity: Sanity::Unchecked,
            relevant: None,
            ..resolved()
        };
        let row = ResolvedRow::from(&article);
        assert_eq!(row.latitude, None);
        assert_eq!(row.refine_source, "");
        assert_eq!(row.sanity, "unchecked");
        let text = String::from_utf8(resolved_to_csv(&[article]).unwrap()).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with("https://example.com/a,,,,,,unchecked,,"));
    }

    #[tokio::test]
    async fn test_write_articles_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let path = write_articles_csv(&[record()], dir).await.unwrap();
        assert!(path.ends_with(ARTICLES_CSV));
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
