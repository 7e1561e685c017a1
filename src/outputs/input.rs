//! Reading articles back for standalone resolution.
//!
//! Accepts this crate's own CSV / GeoJSON output as well as the column names
//! used by older exports:
//!
//! | Field | Accepted columns |
//! |-------|------------------|
//! | url | `url`, `link` |
//! | content | `content`, `cleaned_content` |
//! | source id | `source`, `source_id` |
//! | region hint | `location_name`, `region_hint`, then the keyword, then `location` |
//!
//! Column names are matched case-insensitively.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::dates::parse_timestamp;
use crate::error::{Error, Result};
use crate::models::{ArticleRecord, CrawlContext};
use crate::pipeline::ResolveJob;

const URL_COLUMNS: &[&str] = &["url", "link"];
const CONTENT_COLUMNS: &[&str] = &["content", "cleaned_content"];
const SOURCE_COLUMNS: &[&str] = &["source", "source_id"];
const REGION_COLUMNS: &[&str] = &["location_name", "region_hint"];
/// Consulted only when the keyword carries no region.
const FALLBACK_REGION_COLUMNS: &[&str] = &["location"];

/// Jobs read from a file, plus the rows that could not be used.
#[derive(Debug, Clone, Default)]
pub struct InputBatch {
    pub jobs: Vec<ResolveJob>,
    pub errored: usize,
}

type Row = HashMap<String, String>;

fn field<'a>(row: &'a Row, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| row.get(*n))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn row_to_job(row: &Row) -> Option<ResolveJob> {
    let url = field(row, URL_COLUMNS)?;
    let context = CrawlContext::new(
        field(row, &["keyword"]).unwrap_or_default(),
        field(row, SOURCE_COLUMNS).unwrap_or_default(),
    );
    let record = ArticleRecord::new(
        field(row, &["title"]).unwrap_or_default(),
        field(row, CONTENT_COLUMNS).unwrap_or_default(),
        url,
        &context,
    )?
    .with_author(field(row, &["author"]).map(str::to_string))
    .with_publish_date(field(row, &["publish_date"]).and_then(parse_timestamp));

    Some(
        ResolveJob::new(record, field(row, REGION_COLUMNS).map(str::to_string))
            .with_fallback_hint(field(row, FALLBACK_REGION_COLUMNS)),
    )
}

fn collect_jobs(rows: Vec<Row>) -> InputBatch {
    let mut batch = InputBatch::default();
    for (i, row) in rows.iter().enumerate() {
        match row_to_job(row) {
            Some(job) => batch.jobs.push(job),
            None => {
                warn!(row = i + 1, "Row has no url or no text; skipping");
                batch.errored += 1;
            }
        }
    }
    batch
}

pub fn parse_csv(raw: &str) -> Result<InputBatch> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(raw.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect::<Row>(),
        );
    }
    Ok(collect_jobs(rows))
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn parse_geojson(raw: &str) -> Result<InputBatch> {
    let value: Value = serde_json::from_str(raw)?;
    let features = value
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("GeoJSON input has no features array".into()))?;

    let rows = features
        .iter()
        .map(|f| {
            f.get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .filter_map(|(k, v)| value_to_string(v).map(|s| (k.to_lowercase(), s)))
                        .collect::<Row>()
                })
                .unwrap_or_default()
        })
        .collect();
    Ok(collect_jobs(rows))
}

/// Read a `.csv`, `.geojson` or `.json` file of articles.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn read_articles(path: impl AsRef<Path>) -> Result<InputBatch> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let raw = fs::read_to_string(path).await?;
    let batch = match ext.as_str() {
        "csv" => parse_csv(&raw)?,
        "geojson" | "json" => parse_geojson(&raw)?,
        other => return Err(Error::Config(format!("unsupported input format: .{other}"))),
    };
    info!(jobs = batch.jobs.len(), errored = batch.errored, "Read input articles");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, GeocodeQuery, Provenance, ResolvedArticle, ResolvedLocation, Sanity};
    use crate::outputs::geojson::to_feature_collection;
    use crate::outputs::tabular::articles_to_csv;

    #[test]
    fn test_csv_aliases() {
        let raw = "Title,cleaned_content,Link,Source,keyword,Location,publish_date\n\
                   Banjir,air naik,https://example.com/a,detik.com,banjir Gianyar,\"Badung,\",2024-01-02 03:04:05\n\
                   Tanpa tautan,isi,,detik.com,banjir Gianyar,,\n";
        let batch = parse_csv(raw).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.errored, 1);
        let job = &batch.jobs[0];
        assert_eq!(job.record.url, "https://example.com/a");
        assert_eq!(job.record.content, "air naik");
        assert_eq!(job.record.source_id, "detik.com");
        assert_eq!(job.region_hint.as_deref(), Some("Gianyar"));
        assert!(job.record.publish_date.is_some());
    }

    #[test]
    fn test_region_hint_precedence() {
        let raw = "title,content,url,keyword,location_name,location
                   A,isi,https://example.com/1,banjir Gianyar,Klungkung,Badung
                   B,isi,https://example.com/2,banjir Gianyar,,Badung
                   C,isi,https://example.com/3,banjir,,\"Badung,\"
                   D,isi,https://example.com/4,banjir,,
";
        let hints: Vec<Option<String>> = parse_csv(raw).unwrap().jobs.into_iter().map(|j| j.region_hint).collect();
        assert_eq!(
            hints,
            vec![Some("Klungkung".into()), Some("Gianyar".into()), Some("Badung".into()), None]
        );
    }

    #[test]
    fn test_reads_own_csv_output() {
        let ctx = CrawlContext::new("longsor Bangli", "mongabay.co.id");
        let record = ArticleRecord::new("Longsor", "Tebing runtuh, jalan tertutup.", "https://example.com/b", &ctx)
            .unwrap()
            .with_author(Some("Ayu".into()));
        let csv = String::from_utf8(articles_to_csv(std::slice::from_ref(&record)).unwrap()).unwrap();
        let batch = parse_csv(&csv).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.jobs[0].record, record);
        assert_eq!(batch.jobs[0].region_hint.as_deref(), Some("Bangli"));
    }

    #[test]
    fn test_reads_own_geojson_output() {
        let ctx = CrawlContext::new("banjir Gianyar", "cnnindonesia.com");
        let query = GeocodeQuery { text: "Gianyar, Indonesia".into(), provenance: Provenance::KabupatenFallback };
        let article = ResolvedArticle {
            record: ArticleRecord::new("Banjir", "Air naik.", "https://example.com/c", &ctx).unwrap(),
            location: ResolvedLocation::found(GeoPoint { lat: -8.5, lon: 115.3, display_name: "G".into() }, &query),
            sanity: Sanity::Unchecked,
            relevant: Some(true),
        };
        let json = serde_json::to_string(&to_feature_collection(&[article])).unwrap();
        let batch = parse_geojson(&json).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.jobs[0].record.url, "https://example.com/c");
        assert_eq!(batch.jobs[0].record.keyword, "banjir Gianyar");
    }

    #[test]
    fn test_geojson_without_features_is_parse_error() {
        assert!(matches!(parse_geojson(r#"{"type":"Point"}"#), Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn test_unknown_extension_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("articles.xlsx");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(read_articles(&path).await, Err(Error::Config(_))));
    }
}
