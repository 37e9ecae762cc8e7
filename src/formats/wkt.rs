//! WKT parsing/export, narrowed to `POINT`/`LINESTRING`/`POLYGON` (spec §6).
//!
//! Grounded on the teacher's substring-scanning WKT parser
//! (`geometry_extended::parse_wkt*`), narrowed to the three variants this
//! spec names; other WKT geometry types report `Unsupported`.

use crate::error::{IndexError, IndexResult};
use crate::object::SpatialObject;
use crate::point::Point;

/// Parses `POINT`/`LINESTRING`/`POLYGON` WKT into a [`SpatialObject`].
/// Any other WKT geometry type is `Unsupported`.
pub fn parse_wkt(wkt: &str) -> IndexResult<SpatialObject> {
    let wkt = wkt.trim();
    if let Some(rest) = strip_ci_prefix(wkt, "POINT") {
        let coords = parse_coordinate_list(rest)?;
        if coords.len() != 1 {
            return Err(IndexError::Parse(
                "POINT requires exactly one coordinate".into(),
            ));
        }
        Ok(SpatialObject::point(coords[0].x, coords[0].y))
    } else if let Some(rest) = strip_ci_prefix(wkt, "LINESTRING") {
        let coords = parse_coordinate_list(rest)?;
        SpatialObject::polyline(coords)
    } else if let Some(rest) = strip_ci_prefix(wkt, "POLYGON") {
        let mut rings = parse_ring_list(rest)?;
        if rings.is_empty() {
            return Err(IndexError::Parse(
                "POLYGON requires at least one ring".into(),
            ));
        }
        let exterior = rings.remove(0);
        let mut obj = SpatialObject::polygon(exterior)?;
        for hole in rings {
            obj.add_hole(hole)?;
        }
        obj.update_derived();
        Ok(obj)
    } else {
        Err(IndexError::Unsupported(format!(
            "unsupported WKT geometry: {wkt}"
        )))
    }
}

fn strip_ci_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(s[prefix.len()..].trim())
    } else {
        None
    }
}

fn parse_coordinate_list(s: &str) -> IndexResult<Vec<Point>> {
    let s = s.trim();
    let s = s.strip_prefix('(').unwrap_or(s);
    let s = s.strip_suffix(')').unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let mut coords = Vec::new();
    for pair in s.split(',') {
        let parts: Vec<&str> = pair.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(IndexError::Parse(format!(
                "invalid coordinate pair: {pair}"
            )));
        }
        let x: f64 = parts[0]
            .parse()
            .map_err(|_| IndexError::Parse(format!("invalid x coordinate: {}", parts[0])))?;
        let y: f64 = parts[1]
            .parse()
            .map_err(|_| IndexError::Parse(format!("invalid y coordinate: {}", parts[1])))?;
        coords.push(Point::new(x, y));
    }
    Ok(coords)
}

/// Splits a parenthesized, comma-separated list of rings, e.g.
/// `((0 0, 1 0, 1 1, 0 0), (0.2 0.2, ...))`.
fn parse_ring_list(s: &str) -> IndexResult<Vec<Vec<Point>>> {
    let s = s.trim();
    let s = s.strip_prefix('(').unwrap_or(s);
    let s = s.strip_suffix(')').unwrap_or(s);

    let mut rings = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for ch in s.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
                if depth == 0 {
                    let coords = parse_coordinate_list(&current)?;
                    if !coords.is_empty() {
                        rings.push(coords);
                    }
                    current.clear();
                }
            }
            ',' if depth == 0 => {}
            _ => current.push(ch),
        }
    }
    Ok(rings)
}

/// Formats a coordinate pair with six fractional digits (spec §6 export).
fn fmt_coord(p: &Point) -> String {
    format!("{:.6} {:.6}", p.x, p.y)
}

/// Exports a [`SpatialObject`] back to WKT using `%.6f`-style formatting.
pub fn export_wkt(obj: &SpatialObject) -> IndexResult<String> {
    use crate::object::Geometry;
    match obj.geometry() {
        Geometry::Point(p) => Ok(format!("POINT({})", fmt_coord(p))),
        Geometry::Polyline(line) => {
            let coords = line
                .vertices()
                .iter()
                .map(fmt_coord)
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("LINESTRING({coords})"))
        }
        Geometry::Polygon(poly) => {
            let ring_str =
                |ring: &[Point]| ring.iter().map(fmt_coord).collect::<Vec<_>>().join(", ");
            let mut rings = vec![format!("({})", ring_str(poly.exterior()))];
            for hole in poly.holes() {
                rings.push(format!("({})", ring_str(hole)));
            }
            Ok(format!("POLYGON({})", rings.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point() {
        let obj = parse_wkt("POINT(1.5 2.5)").unwrap();
        assert_eq!(obj.centroid(), Point::new(1.5, 2.5));
    }

    #[test]
    fn parses_linestring() {
        let obj = parse_wkt("LINESTRING(0 0, 10 0)").unwrap();
        assert_eq!(obj.centroid(), Point::new(5.0, 0.0));
    }

    #[test]
    fn parses_polygon_with_hole() {
        let obj =
            parse_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 4 2, 4 4, 2 4, 2 2))").unwrap();
        if let crate::object::Geometry::Polygon(p) = obj.geometry() {
            assert_eq!(p.holes().len(), 1);
        } else {
            panic!("expected polygon");
        }
    }

    #[test]
    fn unsupported_variant_reports_unsupported() {
        assert!(matches!(
            parse_wkt("MULTIPOINT(0 0, 1 1)"),
            Err(IndexError::Unsupported(_))
        ));
    }

    #[test]
    fn export_then_parse_round_trips_point() {
        let obj = SpatialObject::point(3.25, -1.5);
        let wkt = export_wkt(&obj).unwrap();
        let reparsed = parse_wkt(&wkt).unwrap();
        assert_eq!(reparsed.centroid(), obj.centroid());
    }
}
