//! Externally supplied inputs: live location samples and country boundaries.

use std::collections::BTreeMap;

use foundation::math::GeoPoint;
use serde::{Deserialize, Serialize};

/// One aggregated traffic location.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(rename = "lat")]
    pub lat_deg: f64,
    #[serde(rename = "lng")]
    pub lng_deg: f64,
    pub count: f64,
}

impl LocationSample {
    pub fn new(lat_deg: f64, lng_deg: f64, count: f64) -> Self {
        Self {
            lat_deg,
            lng_deg,
            count,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat_deg, self.lng_deg)
    }
}

/// A closed ring of `[lng, lat]` degree pairs.
pub type Ring = Vec<[f64; 2]>;

/// Outer ring followed by holes.
pub type Polygon = Vec<Ring>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code, empty when the dataset has none.
    pub code: String,
    pub polygons: Vec<Polygon>,
}

/// Visits per country code.
pub type CountryStats = BTreeMap<String, f64>;

/// Highest location count, never below 1.
pub fn highest_count(locations: &[LocationSample]) -> f64 {
    locations
        .iter()
        .map(|l| l.count)
        .filter(|c| c.is_finite())
        .fold(1.0, f64::max)
}

/// Highest per-country visit total, never below 1.
pub fn max_country_visits(stats: &CountryStats) -> f64 {
    stats
        .values()
        .copied()
        .filter(|c| c.is_finite())
        .fold(1.0, f64::max)
}
