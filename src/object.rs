//! Tagged spatial object variant (spec §3, §4.B).

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;
use crate::point::Point;
use crate::shapes::{Polygon, Polyline};
use serde::{Deserialize, Serialize};

/// The geometry carried by a [`SpatialObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    Polyline(Polyline),
    Polygon(Polygon),
}

/// A one-byte discriminant for the compact on-disk record (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeometryType {
    Point = 0,
    Polyline = 1,
    Polygon = 2,
}

impl Geometry {
    pub fn kind(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Polyline(_) => GeometryType::Polyline,
            Geometry::Polygon(_) => GeometryType::Polygon,
        }
    }

    fn derive(&self) -> (Point, Mbr) {
        match self {
            Geometry::Point(p) => (*p, Mbr::from_point(p)),
            Geometry::Polyline(line) => (line.centroid(), line.mbr()),
            Geometry::Polygon(poly) => (poly.centroid(), poly.mbr()),
        }
    }
}

/// A uniquely-identified feature with cached derived values.
///
/// Id 0 is reserved for "unassigned"; a real object's id is always
/// non-zero once inserted. Equality and hashing are by id alone — two
/// objects with the same id are the same object regardless of geometry
/// drift, matching pool/cache/tree reference semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialObject {
    id: u64,
    geometry: Geometry,
    centroid: Point,
    mbr: Mbr,
    properties: Vec<u8>,
}

impl PartialEq for SpatialObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for SpatialObject {}

impl SpatialObject {
    /// Constructs an object with id 0 (unassigned); the coordinator
    /// assigns the real id on insertion.
    pub fn new(geometry: Geometry) -> Self {
        let (centroid, mbr) = geometry.derive();
        Self {
            id: 0,
            geometry,
            centroid,
            mbr,
            properties: Vec::new(),
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Geometry::Point(Point::new(x, y)))
    }

    pub fn polyline(points: Vec<Point>) -> IndexResult<Self> {
        Ok(Self::new(Geometry::Polyline(Polyline::new(points)?)))
    }

    pub fn polygon(ring: Vec<Point>) -> IndexResult<Self> {
        Ok(Self::new(Geometry::Polygon(Polygon::simple(ring)?)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Assigns a non-zero id; only the coordinator calls this, on first
    /// insertion.
    pub(crate) fn assign_id(&mut self, id: u64) -> IndexResult<()> {
        if id == 0 {
            return Err(IndexError::InvalidArg("object id 0 is reserved".into()));
        }
        self.id = id;
        Ok(())
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn mbr(&self) -> Mbr {
        self.mbr
    }

    pub fn properties(&self) -> &[u8] {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: Vec<u8>) {
        self.properties = properties;
    }

    /// Appends a vertex to a polyline. Errors on other variants.
    pub fn append_vertex(&mut self, p: Point) -> IndexResult<()> {
        match &mut self.geometry {
            Geometry::Polyline(line) => {
                line.append_vertex(p);
                Ok(())
            }
            _ => Err(IndexError::InvalidArg(
                "append_vertex only applies to polylines".into(),
            )),
        }
    }

    /// Adds a hole to a polygon. Errors on other variants.
    pub fn add_hole(&mut self, hole: Vec<Point>) -> IndexResult<()> {
        match &mut self.geometry {
            Geometry::Polygon(poly) => {
                poly.add_hole(hole);
                Ok(())
            }
            _ => Err(IndexError::InvalidArg(
                "add_hole only applies to polygons".into(),
            )),
        }
    }

    /// Recomputes `centroid`/`mbr` from the current geometry. Callers must
    /// invoke this after any mutation (spec §3's "update-derived" step).
    pub fn update_derived(&mut self) {
        let (centroid, mbr) = self.geometry.derive();
        self.centroid = centroid;
        self.mbr = mbr;
    }
}
