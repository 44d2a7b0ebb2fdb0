use scene::{Country, Polygon, Ring};
use serde_json::Value;

use crate::datasets::DatasetError;

/// Country-code property names, in lookup order.
const CODE_KEYS: [&str; 2] = ["ISO_A2", "iso_a2"];

/// Parses a GeoJSON FeatureCollection of country boundaries.
///
/// Only `Polygon` and `MultiPolygon` features contribute; features with other
/// or null geometry are kept with no polygons so indices stay aligned with
/// the source file.
pub fn parse_countries(json: &str) -> Result<Vec<Country>, DatasetError> {
    let value: Value = serde_json::from_str(json)?;
    parse_countries_value(&value)
}

pub fn parse_countries_value(value: &Value) -> Result<Vec<Country>, DatasetError> {
    let obj = value
        .as_object()
        .ok_or(DatasetError::UnexpectedShape("a FeatureCollection"))?;
    let features = obj
        .get("features")
        .and_then(|v| v.as_array())
        .ok_or(DatasetError::UnexpectedShape("a FeatureCollection"))?;

    let mut countries = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let feature = feature
            .as_object()
            .ok_or(DatasetError::InvalidFeature {
                index,
                reason: "feature must be an object".to_string(),
            })?;

        let properties = feature.get("properties").and_then(|v| v.as_object());
        let code = properties
            .and_then(|props| {
                CODE_KEYS
                    .iter()
                    .find_map(|key| props.get(*key).and_then(|v| v.as_str()))
            })
            .unwrap_or_default()
            .to_string();

        let polygons = match feature.get("geometry") {
            None | Some(Value::Null) => Vec::new(),
            Some(geometry) => parse_geometry(geometry)
                .map_err(|reason| DatasetError::InvalidFeature { index, reason })?,
        };

        countries.push(Country { code, polygons });
    }
    Ok(countries)
}

fn parse_geometry(value: &Value) -> Result<Vec<Polygon>, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;
    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Polygon" => Ok(vec![parse_polygon(coords)?]),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
            polys.iter().map(parse_polygon).collect()
        }
        _ => Ok(Vec::new()),
    }
}

fn parse_polygon(coords: &Value) -> Result<Polygon, String> {
    let rings = coords
        .as_array()
        .ok_or("Polygon coordinates must be an array of rings".to_string())?;
    rings.iter().map(parse_ring).collect()
}

fn parse_ring(coords: &Value) -> Result<Ring, String> {
    let points = coords
        .as_array()
        .ok_or("ring must be an array of positions".to_string())?;
    let mut ring = Vec::with_capacity(points.len());
    for point in points {
        let arr = point
            .as_array()
            .filter(|a| a.len() >= 2)
            .ok_or("position must have [lon, lat]".to_string())?;
        let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
        let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
        ring.push([lon, lat]);
    }
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"ISO_A2": "FR"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,40],[10,40],[10,50],[0,50],[0,40]]]}},
            {"type": "Feature", "properties": {"iso_a2": "JP"},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[130,30],[135,30],[135,35],[130,30]]],
                [[[140,35],[142,35],[142,40],[140,35]]]
             ]}},
            {"type": "Feature", "properties": {}, "geometry": null}
        ]
    }"#;

    #[test]
    fn parses_polygons_and_codes() {
        let countries = parse_countries(SAMPLE).expect("parse");
        assert_eq!(countries.len(), 3);
        assert_eq!(countries[0].code, "FR");
        assert_eq!(countries[0].polygons.len(), 1);
        assert_eq!(countries[0].polygons[0][0].len(), 5);
        assert_eq!(countries[1].code, "JP");
        assert_eq!(countries[1].polygons.len(), 2);
        assert_eq!(countries[2].code, "");
        assert!(countries[2].polygons.is_empty());
    }

    #[test]
    fn bad_positions_name_the_feature() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[1]]]}}
        ]}"#;
        let err = parse_countries(json).expect_err("invalid");
        assert!(matches!(err, DatasetError::InvalidFeature { index: 0, .. }));
    }
}
