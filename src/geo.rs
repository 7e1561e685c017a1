//! Great-circle distance and the regional sanity check.

use tracing::debug;

use crate::models::{GeoPoint, Sanity};

/// Mean Earth radius used for all distance computations.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate centres of Bali's regencies, keyed by lower-case name.
pub const REGION_ANCHORS: &[(&str, f64, f64)] = &[
    ("badung", -8.5819, 115.1770),
    ("bangli", -8.4543, 115.3540),
    ("buleleng", -8.1120, 115.0900),
    ("denpasar", -8.6705, 115.2126),
    ("gianyar", -8.5445, 115.3250),
    ("jembrana", -8.3589, 114.6400),
    ("karangasem", -8.4286, 115.5700),
    ("klungkung", -8.5449, 115.4040),
    ("tabanan", -8.5440, 115.1250),
];

/// Haversine distance in metres between two points given in degrees.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Anchor coordinate for a region name, matched case-insensitively.
///
/// Prefixes like `"Kabupaten "` / `"Kota "` are ignored.
pub fn anchor_for(region: &str) -> Option<(f64, f64)> {
    let lowered = region.trim().to_lowercase();
    let name = lowered
        .strip_prefix("kabupaten ")
        .or_else(|| lowered.strip_prefix("kota "))
        .unwrap_or(&lowered)
        .trim();
    REGION_ANCHORS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, lat, lon)| (*lat, *lon))
}

/// Flags resolved points implausibly far from their region's anchor.
#[derive(Debug, Clone, Copy)]
pub struct SanityCheck {
    pub max_distance_m: f64,
}

impl Default for SanityCheck {
    fn default() -> Self {
        Self { max_distance_m: 60_000.0 }
    }
}

impl SanityCheck {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }

    pub fn evaluate(&self, point: &GeoPoint, region_hint: Option<&str>) -> Sanity {
        let Some((alat, alon)) = region_hint.and_then(anchor_for) else {
            return Sanity::Unchecked;
        };
        let distance_m = haversine(point.lat, point.lon, alat, alon);
        if distance_m <= self.max_distance_m {
            Sanity::Plausible { distance_m }
        } else {
            debug!(distance_m, region = ?region_hint, "Resolved point far from regional anchor");
            Sanity::Implausible { distance_m }
        }
    }
}
