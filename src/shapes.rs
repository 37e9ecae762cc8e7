//! Polyline and polygon geometry, with the centroid/area rules of spec §3.

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;
use crate::point::Point;
use serde::{Deserialize, Serialize};

const DEGENERATE_EPS: f64 = 1e-10;

/// An ordered sequence of vertices (spec §3: at least 1 vertex; a length-1
/// polyline is degenerate but constructible — the ≥ 2 rule only gates the
/// weighted-centroid formula, per §3's "Polyline with ≥ 2 vertices" clause).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    vertices: Vec<Point>,
}

impl Polyline {
    pub fn new(vertices: Vec<Point>) -> IndexResult<Self> {
        if vertices.is_empty() {
            return Err(IndexError::InvalidGeometry(
                "polyline requires at least 1 vertex".into(),
            ));
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn append_vertex(&mut self, p: Point) {
        self.vertices.push(p);
    }

    pub fn mbr(&self) -> Mbr {
        Mbr::from_points(self.vertices.iter())
    }

    pub fn length(&self) -> f64 {
        self.vertices.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    /// Segment-length-weighted average of segment midpoints; falls back to
    /// the first vertex when total length < 1e-10 (spec §3).
    pub fn centroid(&self) -> Point {
        if self.vertices.len() < 2 {
            return self.vertices[0];
        }
        let total_length = self.length();
        if total_length < DEGENERATE_EPS {
            return self.vertices[0];
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for w in self.vertices.windows(2) {
            let seg_len = w[0].distance(&w[1]);
            let mid_x = (w[0].x + w[1].x) / 2.0;
            let mid_y = (w[0].y + w[1].y) / 2.0;
            cx += mid_x * seg_len;
            cy += mid_y * seg_len;
        }
        Point::new(cx / total_length, cy / total_length)
    }
}

/// A polygon: an exterior ring (≥ 3 vertices, optionally closed) and zero or
/// more holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> IndexResult<Self> {
        if exterior.len() < 3 {
            return Err(IndexError::InvalidGeometry(
                "polygon exterior ring requires at least 3 vertices".into(),
            ));
        }
        Ok(Self { exterior, holes })
    }

    pub fn simple(exterior: Vec<Point>) -> IndexResult<Self> {
        Self::new(exterior, vec![])
    }

    pub fn exterior(&self) -> &[Point] {
        &self.exterior
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn add_hole(&mut self, hole: Vec<Point>) {
        self.holes.push(hole);
    }

    pub fn mbr(&self) -> Mbr {
        Mbr::from_points(self.exterior.iter())
    }

    /// The "closed" view of a ring: append the first vertex if the caller
    /// didn't already close it (spec §3: exterior ring "optionally closed").
    fn closed_ring(ring: &[Point]) -> Vec<Point> {
        let mut ring = ring.to_vec();
        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        ring
    }

    /// Signed area of a ring via the shoelace formula (positive =
    /// counter-clockwise).
    fn signed_area(ring: &[Point]) -> f64 {
        let ring = Self::closed_ring(ring);
        let mut acc = 0.0;
        for w in ring.windows(2) {
            acc += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        acc / 2.0
    }

    /// `Σ (xᵢ+xᵢ₊₁)(xᵢyᵢ₊₁−xᵢ₊₁yᵢ) / 6A` centroid of a ring; falls back to
    /// the arithmetic mean when `|signed_area| < 1e-10` (spec §3).
    fn ring_centroid(ring: &[Point]) -> Point {
        let closed = Self::closed_ring(ring);
        let area = Self::signed_area(ring);
        if area.abs() < DEGENERATE_EPS {
            let n = ring.len() as f64;
            let (sx, sy) = ring
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            return Point::new(sx / n, sy / n);
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for w in closed.windows(2) {
            let cross = w[0].x * w[1].y - w[1].x * w[0].y;
            cx += (w[0].x + w[1].x) * cross;
            cy += (w[0].y + w[1].y) * cross;
        }
        let factor = 1.0 / (6.0 * area);
        Point::new(cx * factor, cy * factor)
    }

    /// Centroid of the exterior ring only, per spec §3 (holes do not
    /// perturb the centroid, only the area).
    pub fn centroid(&self) -> Point {
        Self::ring_centroid(&self.exterior)
    }

    /// `|exterior signed area| − Σ |hole signed area|` (spec §3).
    pub fn area(&self) -> f64 {
        let mut area = Self::signed_area(&self.exterior).abs();
        for hole in &self.holes {
            area -= Self::signed_area(hole).abs();
        }
        area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyline_centroid_and_mbr() {
        let line = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]).unwrap();
        assert_eq!(line.centroid(), Point::new(5.0, 0.0));
        assert_eq!(line.mbr(), Mbr::new(0.0, 0.0, 10.0, 0.0));
    }

    #[test]
    fn coincident_polyline_has_zero_length_and_first_vertex_centroid() {
        let p = Point::new(3.0, 4.0);
        let line = Polyline::new(vec![p, p, p]).unwrap();
        assert_eq!(line.length(), 0.0);
        assert_eq!(line.centroid(), p);
    }

    #[test]
    fn square_polygon_centroid_and_area() {
        let poly = Polygon::simple(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
        let c = poly.centroid();
        assert!((c.x - 5.0).abs() < 1e-9);
        assert!((c.y - 5.0).abs() < 1e-9);
        assert!((poly.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn two_point_polygon_rejected() {
        assert!(Polygon::simple(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).is_err());
    }

    #[test]
    fn three_point_polygon_accepted() {
        assert!(Polygon::simple(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0)
        ])
        .is_ok());
    }

    #[test]
    fn polygon_with_hole_subtracts_area() {
        let exterior = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let hole = vec![
            Point::new(2.0, 2.0),
            Point::new(4.0, 2.0),
            Point::new(4.0, 4.0),
            Point::new(2.0, 4.0),
        ];
        let poly = Polygon::new(exterior, vec![hole]).unwrap();
        assert!((poly.area() - 96.0).abs() < 1e-9);
    }
}
