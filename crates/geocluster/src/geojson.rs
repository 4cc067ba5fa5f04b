//! Minimal GeoJSON input and output types.
//!
//! Only point features are meaningful to the cluster index. Other geometry
//! types are skipped during parsing rather than rejected, so a mixed
//! collection still loads.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Free-form feature properties, as in GeoJSON.
pub type Properties = Map<String, Value>;

/// A single input point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// The feature's `properties` object.
    pub properties: Properties,
}

impl PointFeature {
    /// Create a point with no properties.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self {
            lng,
            lat,
            properties: Properties::new(),
        }
    }

    /// Create a point carrying a `name` property.
    pub fn named(lng: f64, lat: f64, name: impl Into<String>) -> Self {
        let mut properties = Properties::new();
        properties.insert("name".to_string(), Value::String(name.into()));
        Self {
            lng,
            lat,
            properties,
        }
    }

    /// The `name` property, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// Summary of an aggregated cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Id usable with `get_children`, `get_leaves` and
    /// `get_cluster_expansion_zoom`.
    pub id: usize,
    /// Number of input points inside the cluster.
    pub point_count: usize,
}

/// A feature returned by a cluster query: either an aggregated cluster or
/// one of the original input points.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFeature {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// `Some` for clusters, `None` for original points.
    pub cluster: Option<ClusterInfo>,
    /// Original properties for points, generated properties for clusters.
    pub properties: Properties,
}

impl ClusterFeature {
    /// Whether this feature aggregates more than one input point.
    pub fn is_cluster(&self) -> bool {
        self.cluster.is_some()
    }

    /// Number of input points represented by this feature.
    pub fn point_count(&self) -> usize {
        self.cluster.map_or(1, |c| c.point_count)
    }

    /// The `name` property, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// Abbreviate a point count the way map UIs do (`1.2k`, `15k`).
pub fn abbreviate_count(count: usize) -> String {
    if count >= 10_000 {
        format!("{}k", (count as f64 / 1000.0).round())
    } else if count >= 1000 {
        format!("{}k", (count as f64 / 100.0).round() / 10.0)
    } else {
        count.to_string()
    }
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Parse a GeoJSON `FeatureCollection` into its point features.
///
/// # Errors
///
/// Returns an error if the input is not JSON, is not a feature collection,
/// or contains a point whose coordinates are not `[lng, lat, ...]`.
pub fn parse_feature_collection(bytes: &[u8]) -> Result<Vec<PointFeature>> {
    let raw: RawCollection = serde_json::from_slice(bytes)?;
    if raw.kind != "FeatureCollection" {
        return Err(Error::InvalidData {
            context: "geojson",
            detail: format!("expected a FeatureCollection, got {}", raw.kind),
        });
    }

    let mut points = Vec::with_capacity(raw.features.len());
    let mut skipped = 0usize;

    for (i, feature) in raw.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        if geometry.kind != "Point" {
            skipped += 1;
            continue;
        }

        let (lng, lat) = point_coordinates(&geometry.coordinates).ok_or_else(|| {
            Error::InvalidData {
                context: "geojson point",
                detail: format!("feature {i}: expected [lng, lat] coordinates"),
            }
        })?;

        points.push(PointFeature {
            lng,
            lat,
            properties: feature.properties.unwrap_or_default(),
        });
    }

    if skipped > 0 {
        tracing::debug!("Skipped {skipped} non-point features");
    }

    Ok(points)
}

fn point_coordinates(value: &Value) -> Option<(f64, f64)> {
    let coords = value.as_array()?;
    let lng = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    (lng.is_finite() && lat.is_finite()).then_some((lng, lat))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_points_and_names() {
        let input = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [13.4, 52.5] },
                    "properties": { "name": "Berlin" }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-74.0, 40.7, 10.0] },
                    "properties": null
                }
            ]
        });

        let points = parse_feature_collection(input.to_string().as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name(), Some("Berlin"));
        assert!((points[0].lng - 13.4).abs() < 1e-12);
        assert!((points[0].lat - 52.5).abs() < 1e-12);
        assert_eq!(points[1].name(), None);
        assert!((points[1].lng + 74.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_point_geometries_are_skipped() {
        let input = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] },
                    "properties": {}
                },
                { "type": "Feature", "geometry": null, "properties": {} },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [1, 2] },
                    "properties": {}
                }
            ]
        });

        let points = parse_feature_collection(input.to_string().as_bytes()).unwrap();
        assert_eq!(points, vec![PointFeature::new(1.0, 2.0)]);
    }

    #[test]
    fn test_rejects_wrong_collection_type() {
        let input = json!({ "type": "Feature", "features": [] });
        let err = parse_feature_collection(input.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn test_rejects_malformed_point() {
        let input = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": ["a", 2] },
                    "properties": {}
                }
            ]
        });
        let err = parse_feature_collection(input.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("feature 0"));
    }

    #[test]
    fn test_rejects_invalid_json() {
        let err = parse_feature_collection(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_abbreviate_count() {
        assert_eq!(abbreviate_count(7), "7");
        assert_eq!(abbreviate_count(999), "999");
        assert_eq!(abbreviate_count(1234), "1.2k");
        assert_eq!(abbreviate_count(15_400), "15k");
    }
}
