//! GeoJSON output: one `Point` feature per article with coordinates.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::tabular::ResolvedRow;
use super::{RESOLVED_GEOJSON, write_output};
use crate::error::Result;
use crate::models::ResolvedArticle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `[longitude, latitude]`, GeoJSON axis order.
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: Geometry,
    pub properties: ResolvedRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

/// Unresolved articles have no geometry and are left out.
pub fn to_feature_collection(articles: &[ResolvedArticle]) -> FeatureCollection {
    let features: Vec<Feature> = articles
        .iter()
        .filter_map(|a| {
            let point = a.location.point.as_ref()?;
            Some(Feature {
                kind: "Feature",
                geometry: Geometry {
                    kind: "Point",
                    coordinates: [point.lon, point.lat],
                },
                properties: ResolvedRow::from(a),
            })
        })
        .collect();
    debug!(features = features.len(), skipped = articles.len() - features.len(), "Built feature collection");
    FeatureCollection {
        kind: "FeatureCollection",
        features,
    }
}

#[instrument(level = "info", skip_all, fields(%output_dir, count = articles.len()))]
pub async fn write_geojson(articles: &[ResolvedArticle], output_dir: &str) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(&to_feature_collection(articles))?;
    write_output(output_dir, RESOLVED_GEOJSON, json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArticleRecord, CrawlContext, GeoPoint, GeocodeQuery, Provenance, ResolvedLocation, Sanity,
    };
    use serde_json::Value;

    fn article(url: &str, point: Option<(f64, f64)>) -> ResolvedArticle {
        let ctx = CrawlContext::new("banjir Gianyar", "cnnindonesia.com");
        let query = GeocodeQuery {
            text: "Gianyar, Indonesia".into(),
            provenance: Provenance::KabupatenFallback,
        };
        ResolvedArticle {
            record: ArticleRecord::new("Banjir", "Air naik.", url, &ctx).unwrap(),
            location: match point {
                Some((lat, lon)) => ResolvedLocation::found(
                    GeoPoint { lat, lon, display_name: "Gianyar".into() },
                    &query,
                ),
                None => ResolvedLocation::unresolved(),
            },
            sanity: Sanity::Unchecked,
            relevant: Some(true),
        }
    }

    #[test]
    fn test_only_located_articles_become_features() {
        let fc = to_feature_collection(&[
            article("https://example.com/1", Some((-8.5445, 115.325))),
            article("https://example.com/2", None),
        ]);
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.features[0].geometry.coordinates, [115.325, -8.5445]);
    }

    #[test]
    fn test_serialized_shape() {
        let fc = to_feature_collection(&[article("https://example.com/1", Some((-8.5445, 115.325)))]);
        let value: Value = serde_json::to_value(&fc).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["features"][0]["properties"]["refine_source"], "kabupaten_fallback");
        assert_eq!(value["features"][0]["properties"]["url"], "https://example.com/1");
    }

    #[test]
    fn test_geometry_is_lon_lat_point() {
        let fc = to_feature_collection(&[article("https://example.com/1", Some((-8.5445, 115.325)))]);
        let geometry = &fc.features[0].geometry;
        assert_eq!(geometry.kind, "Point");
        assert_eq!(geometry.coordinates, [115.325, -8.5445]);
        let value = serde_json::to_value(geometry).unwrap();
        assert_eq!(value.as_object().map(|o| o.len()), Some(2));
    }

    #[tokio::test]
    async fn test_write_geojson() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_geojson(&[], tmp.path().to_str().unwrap()).await.unwrap();
        let value: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["features"].as_array().map(Vec::len), Some(0));
    }
}
