//! GeoJSON ingestion (via the real `geojson` crate) and export (spec §6).
//!
//! RFC 7946 subset: `Point`, `LineString`, `Polygon` (exterior + holes),
//! wrapped in `Feature`, `FeatureCollection`, or a bare geometry.

use crate::error::{IndexError, IndexResult};
use crate::object::{Geometry as ObjGeometry, SpatialObject};
use crate::point::Point;
use geojson::{feature::Id, Feature, GeoJson, Value};
use std::str::FromStr;

fn position_to_point(pos: &[f64]) -> IndexResult<Point> {
    if pos.len() < 2 {
        return Err(IndexError::Parse("coordinate needs at least x, y".into()));
    }
    Ok(Point::new(pos[0], pos[1]))
}

fn ring_to_points(ring: &[Vec<f64>]) -> IndexResult<Vec<Point>> {
    ring.iter().map(|p| position_to_point(p)).collect()
}

fn value_to_object(value: &Value) -> IndexResult<SpatialObject> {
    match value {
        Value::Point(p) => {
            let pt = position_to_point(p)?;
            Ok(SpatialObject::point(pt.x, pt.y))
        }
        Value::LineString(coords) => {
            let pts = ring_to_points(coords)?;
            SpatialObject::polyline(pts)
        }
        Value::Polygon(rings) => {
            if rings.is_empty() {
                return Err(IndexError::Parse("polygon has no rings".into()));
            }
            let exterior = ring_to_points(&rings[0])?;
            let mut obj = SpatialObject::polygon(exterior)?;
            for hole in &rings[1..] {
                obj.add_hole(ring_to_points(hole)?)?;
            }
            obj.update_derived();
            Ok(obj)
        }
        other => Err(IndexError::Unsupported(format!(
            "unsupported GeoJSON geometry: {other:?}"
        ))),
    }
}

/// Serializes `properties` (and, if present, the feature's `id`) into the
/// object's opaque properties blob (spec §6 "`properties` may be preserved
/// as an opaque object").
fn attach_properties(obj: &mut SpatialObject, feature: &Feature) -> IndexResult<()> {
    let mut wrapper = serde_json::Map::new();
    if let Some(props) = &feature.properties {
        wrapper.insert(
            "properties".to_string(),
            serde_json::Value::Object(props.clone()),
        );
    }
    if let Some(id) = &feature.id {
        let id_value = match id {
            Id::String(s) => serde_json::Value::String(s.clone()),
            Id::Number(n) => serde_json::Value::Number(n.clone()),
        };
        wrapper.insert("id".to_string(), id_value);
    }
    if !wrapper.is_empty() {
        let bytes = serde_json::to_vec(&wrapper).map_err(|e| IndexError::Parse(e.to_string()))?;
        obj.set_properties(bytes);
    }
    Ok(())
}

fn feature_to_object(feature: &Feature) -> IndexResult<SpatialObject> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| IndexError::Parse("feature has no geometry".into()))?;
    let mut obj = value_to_object(&geometry.value)?;
    attach_properties(&mut obj, feature)?;
    Ok(obj)
}

/// Parses a GeoJSON document (bare geometry, `Feature`, or
/// `FeatureCollection`) into one or more [`SpatialObject`]s.
pub fn parse_geojson(text: &str) -> IndexResult<Vec<SpatialObject>> {
    let parsed = GeoJson::from_str(text).map_err(|e| IndexError::Parse(e.to_string()))?;
    match parsed {
        GeoJson::Geometry(geom) => Ok(vec![value_to_object(&geom.value)?]),
        GeoJson::Feature(feature) => Ok(vec![feature_to_object(&feature)?]),
        GeoJson::FeatureCollection(fc) => fc.features.iter().map(feature_to_object).collect(),
    }
}

fn fmt6(v: f64) -> String {
    format!("{v:.6}")
}

fn export_ring(ring: &[Point]) -> String {
    let coords: Vec<String> = ring
        .iter()
        .map(|p| format!("[{},{}]", fmt6(p.x), fmt6(p.y)))
        .collect();
    format!("[{}]", coords.join(","))
}

/// Exports a [`SpatialObject`] as a bare GeoJSON geometry, coordinates
/// formatted with six fractional digits (spec §6 "Export").
pub fn export_geojson(obj: &SpatialObject) -> String {
    match obj.geometry() {
        ObjGeometry::Point(p) => {
            format!(
                r#"{{"type":"Point","coordinates":[{},{}]}}"#,
                fmt6(p.x),
                fmt6(p.y)
            )
        }
        ObjGeometry::Polyline(line) => {
            format!(
                r#"{{"type":"LineString","coordinates":{}}}"#,
                export_ring(line.vertices())
            )
        }
        ObjGeometry::Polygon(poly) => {
            let mut rings = vec![export_ring(poly.exterior())];
            for hole in poly.holes() {
                rings.push(export_ring(hole));
            }
            format!(
                r#"{{"type":"Polygon","coordinates":[{}]}}"#,
                rings.join(",")
            )
        }
    }
}
