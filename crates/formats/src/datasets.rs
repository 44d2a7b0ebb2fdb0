//! JSON datasets the globe consumes: datacenter coordinates, live location
//! samples and per-country visit totals.

use foundation::math::GeoPoint;
use scene::{CountryStats, Datacenters, LocationSample};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug)]
pub enum DatasetError {
    Json(serde_json::Error),
    /// The payload parsed but does not have the expected shape.
    UnexpectedShape(&'static str),
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Json(e) => write!(f, "JSON parse error: {e}"),
            DatasetError::UnexpectedShape(what) => write!(f, "expected {what}"),
            DatasetError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(e: serde_json::Error) -> Self {
        DatasetError::Json(e)
    }
}

#[derive(Debug, Deserialize)]
struct RawDatacenter {
    lat: f64,
    lon: f64,
}

/// Parses `{ "SJC": { "lat": .., "lon": .. }, .. }`.
pub fn parse_datacenters(json: &str) -> Result<Datacenters, DatasetError> {
    let raw: std::collections::BTreeMap<String, RawDatacenter> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .filter(|(_, dc)| dc.lat.is_finite() && dc.lon.is_finite())
        .map(|(code, dc)| (code, GeoPoint::new(dc.lat, dc.lon)))
        .collect())
}

/// Counts arrive as numbers or numeric strings depending on the backend.
fn number_like(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Accepts a bare array or the API envelope `{ "data": [...] }`.
fn rows(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(rows) => Some(rows),
        Value::Object(obj) => obj.get("data").and_then(Value::as_array),
        _ => None,
    }
}

/// Parses `[{ "latitude", "longitude", "count" }]`. Rows with missing or
/// non-finite fields are dropped.
pub fn parse_locations(json: &str) -> Result<Vec<LocationSample>, DatasetError> {
    let value: Value = serde_json::from_str(json)?;
    let rows = rows(&value).ok_or(DatasetError::UnexpectedShape("an array of locations"))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let lat = number_like(row.get("latitude").or_else(|| row.get("lat")))?;
            let lng = number_like(row.get("longitude").or_else(|| row.get("lng")))?;
            let count = number_like(row.get("count"))?;
            Some(LocationSample::new(lat, lng, count))
        })
        .collect())
}

/// Parses `[{ "name": "US", "count": 12 }]` or a plain `{ "US": 12 }` map.
pub fn parse_country_stats(json: &str) -> Result<CountryStats, DatasetError> {
    let value: Value = serde_json::from_str(json)?;

    if let Some(rows) = rows(&value) {
        return Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_str()?.to_string();
                Some((name, number_like(row.get("count"))?))
            })
            .collect());
    }

    let obj = value
        .as_object()
        .ok_or(DatasetError::UnexpectedShape("country statistics"))?;
    Ok(obj
        .iter()
        .filter_map(|(code, count)| Some((code.clone(), number_like(Some(count))?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn datacenters_map_codes_to_points() {
        let dcs = parse_datacenters(r#"{"SJC": {"lat": 37.36, "lon": -121.93}, "LHR": {"lat": 51.47, "lon": -0.45}}"#)
            .expect("parse");
        assert_eq!(dcs.len(), 2);
        assert_eq!(dcs["SJC"], GeoPoint::new(37.36, -121.93));
    }

    #[test]
    fn locations_accept_string_counts_and_drop_bad_rows() {
        let json = r#"{"data": [
            {"latitude": 10, "longitude": 20, "count": "7"},
            {"latitude": 1.5, "longitude": -3, "count": 2},
            {"latitude": null, "longitude": 0, "count": 1},
            {"latitude": 0, "longitude": 0, "count": "lots"}
        ]}"#;
        let locs = parse_locations(json).expect("parse");
        assert_eq!(
            locs,
            vec![
                LocationSample::new(10.0, 20.0, 7.0),
                LocationSample::new(1.5, -3.0, 2.0)
            ]
        );
    }

    #[test]
    fn locations_reject_non_arrays() {
        assert!(matches!(
            parse_locations(r#"{"rows": []}"#),
            Err(DatasetError::UnexpectedShape(_))
        ));
        assert!(matches!(parse_locations("not json"), Err(DatasetError::Json(_))));
    }

    #[test]
    fn country_stats_accept_rows_or_map() {
        let stats = parse_country_stats(r#"{"data": [{"name": "US", "count": 30}, {"name": "DE", "count": "4"}]}"#)
            .expect("rows");
        assert_eq!(stats["US"], 30.0);
        assert_eq!(stats["DE"], 4.0);

        let stats = parse_country_stats(r#"{"FR": 9}"#).expect("map");
        assert_eq!(stats["FR"], 9.0);
    }
}
