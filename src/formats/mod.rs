//! GeoJSON/WKT ingestion and export (spec §6 "Input formats"/"Export").
//!
//! These feed objects into, and read results from, the core index through
//! the `ingest(SpatialObject)` contract (spec §1); they do not participate
//! in the indexing algorithms themselves.

pub mod geojson;
pub mod wkt;
