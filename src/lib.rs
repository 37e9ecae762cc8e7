//! # Urbis — disk-aware 2-D spatial index for city-scale GIS data
//!
//! Points, polylines, and polygons are stored in fixed-capacity pages,
//! pages are grouped into tracks for seek-aware allocation, and two
//! in-memory structures accelerate queries: a block KD-tree over object
//! centroids and a page-level quadtree for adjacency lookups.
//!
//! ## Quick start
//!
//! ```rust
//! use urbis::{IndexConfig, SpatialIndex};
//!
//! let mut index = SpatialIndex::create(IndexConfig::default());
//! index.insert_point(1.0, 1.0).unwrap();
//! index.insert_point(2.0, 2.0).unwrap();
//! index.build().unwrap();
//!
//! let hits = index.query_point(1.0, 1.0);
//! assert_eq!(hits.len(), 1);
//! ```

pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod formats;
pub mod index;
pub mod kdtree;
pub mod mbr;
pub mod object;
pub mod page;
pub mod point;
pub mod pool;
pub mod quadtree;
pub mod shapes;
pub mod track;

pub use config::{AllocationStrategy, IndexConfig};
pub use disk::DiskManager;
pub use error::{IndexError, IndexResult};
pub use index::{AdjacentPages, IndexStats, SpatialBlock, SpatialIndex};
pub use mbr::Mbr;
pub use object::{Geometry, GeometryType, SpatialObject};
pub use point::Point;
pub use shapes::{Polygon, Polyline};

pub use formats::geojson::{export_geojson, parse_geojson};
pub use formats::wkt::{export_wkt, parse_wkt};
