//! The spatial index coordinator: routes insert/build/query through the
//! KD-tree, quadtree, and disk manager (spec §4.I).

use crate::config::IndexConfig;
use crate::disk::DiskManager;
use crate::error::{IndexError, IndexResult};
use crate::kdtree::KdTree;
use crate::mbr::Mbr;
use crate::object::SpatialObject;
use crate::point::Point;
use crate::quadtree::{Quadtree, DEFAULT_MAX_DEPTH, DEFAULT_NODE_CAPACITY};
use log::info;
use std::path::Path;

/// An MBR partition produced by the block KD-tree's bulk loader; a
/// materialized block owns one dedicated track (spec §4.F, §4.I, GLOSSARY).
#[derive(Debug, Clone, Copy)]
pub struct SpatialBlock {
    pub id: u64,
    pub bounds: Mbr,
    pub centroid: Point,
    pub track_id: u64,
    pub object_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub total_objects: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
    pub total_blocks: usize,
    pub cache_hit_rate: f64,
}

/// Result of `find_adjacent_pages` (spec §4.I, §6).
#[derive(Debug, Clone)]
pub struct AdjacentPages {
    pub pages: Vec<(u64, u64)>,
    pub estimated_seeks: usize,
}

/// Coordinates the KD-tree, the page quadtree, and the disk manager over
/// the lifetime of an index (spec §4.I).
pub struct SpatialIndex {
    config: IndexConfig,
    disk: DiskManager,
    /// Points are object centroids; `data` is the owning page id (spec
    /// §9's typed-carrier design note).
    block_tree: KdTree<u64>,
    quadtree: Option<Quadtree<u64>>,
    blocks: Vec<SpatialBlock>,
    next_object_id: u64,
    next_block_id: u64,
    bounds: Mbr,
    is_built: bool,
}

impl SpatialIndex {
    pub fn create(config: IndexConfig) -> Self {
        Self {
            disk: DiskManager::new(&config),
            config,
            block_tree: KdTree::new(),
            quadtree: None,
            blocks: Vec::new(),
            next_object_id: 1,
            next_block_id: 1,
            bounds: Mbr::empty(),
            is_built: false,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn bounds(&self) -> Mbr {
        self.bounds
    }

    pub fn count(&self) -> usize {
        self.disk.pool().stats().total_objects
    }

    pub fn is_built(&self) -> bool {
        self.is_built
    }

    pub fn stats(&self) -> IndexStats {
        let pool_stats = self.disk.pool().stats();
        IndexStats {
            total_objects: pool_stats.total_objects,
            total_pages: pool_stats.page_count,
            total_tracks: pool_stats.track_count,
            total_blocks: self.blocks.len(),
            cache_hit_rate: self.disk.cache_hit_rate(),
        }
    }

    fn owning_page(&self, id: u64) -> Option<u64> {
        self.disk
            .pool()
            .pages_iter()
            .find(|p| p.find(id).is_some())
            .map(|p| p.page_id())
    }

    pub fn insert_point(&mut self, x: f64, y: f64) -> IndexResult<u64> {
        self.insert(SpatialObject::point(x, y))
    }

    pub fn insert_polyline(&mut self, pts: Vec<Point>) -> IndexResult<u64> {
        self.insert(SpatialObject::polyline(pts)?)
    }

    pub fn insert_polygon(&mut self, ring: Vec<Point>) -> IndexResult<u64> {
        self.insert(SpatialObject::polygon(ring)?)
    }

    /// Assigns an id if unset, recomputes derived values, picks a target
    /// page (an existing non-full page near the centroid, or a fresh one),
    /// and folds the object's MBR into the index bounds (spec §4.I).
    pub fn insert(&mut self, mut obj: SpatialObject) -> IndexResult<u64> {
        if obj.id() == 0 {
            let id = self.next_object_id;
            self.next_object_id += 1;
            obj.assign_id(id)?;
        }
        obj.update_derived();
        let centroid = obj.centroid();
        let mbr = obj.mbr();

        let existing = self
            .disk
            .alloc_tree()
            .nearest(centroid)
            .map(|n| *n.data)
            .filter(|&page_id| {
                self.disk
                    .pool()
                    .page(page_id)
                    .map(|p| !p.is_full())
                    .unwrap_or(false)
            });

        let page_id = match existing {
            Some(id) => id,
            None => self.disk.alloc_page(centroid)?,
        };

        let add_result = self.disk.pool_mut().page_mut(page_id)?.add(obj.clone());
        match add_result {
            Ok(()) => {}
            Err(IndexError::Full(_)) => {
                let fresh = self.disk.alloc_page(centroid)?;
                self.disk.pool_mut().page_mut(fresh)?.add(obj.clone())?;
            }
            Err(e) => return Err(e),
        };

        self.disk.rebuild_allocation_tree();
        self.bounds.expand_mbr(&mbr);
        self.is_built = false;
        Ok(obj.id())
    }

    /// Linear scan of pool pages for the owning page (spec §4.I "Remove").
    pub fn remove(&mut self, id: u64) -> IndexResult<SpatialObject> {
        let page_id = self
            .owning_page(id)
            .ok_or_else(|| IndexError::NotFound(format!("object {id}")))?;
        let removed = self.disk.pool_mut().page_mut(page_id)?.remove(id)?;
        self.disk.rebuild_allocation_tree();
        self.is_built = false;
        Ok(removed)
    }

    /// Looks up an object by id, serving its page through the LRU cache
    /// (spec §4.I "Get", spec §1 "serves pages through an LRU cache").
    pub fn get(&mut self, id: u64) -> Option<SpatialObject> {
        let page_id = self.owning_page(id)?;
        self.disk.page(page_id).ok()?.find(id).cloned()
    }

    /// Rebuilds the block KD-tree and, if enabled, the page quadtree
    /// (spec §4.I "Build").
    pub fn build(&mut self) -> IndexResult<()> {
        // Reclaim the previous build's block-dedicated tracks so repeated
        // build()/optimize() calls don't leak tracks (spec §8 idempotence).
        for block in self.blocks.drain(..) {
            let _ = self.disk.pool_mut().free_track(block.track_id);
        }
        self.next_block_id = 1;

        let entries: Vec<(Point, u64, u64)> = self
            .disk
            .pool()
            .pages_iter()
            .flat_map(|p| {
                let page_id = p.page_id();
                p.objects()
                    .iter()
                    .map(move |o| (o.centroid(), o.id(), page_id))
            })
            .collect();
        self.block_tree = KdTree::new();
        self.block_tree.bulk_load(entries);

        let partitions = self.block_tree.partition(self.config.block_size);
        self.blocks = Vec::with_capacity(partitions.len());
        for mbr in partitions {
            let object_count = self.block_tree.range_query(&mbr).len();
            let track_id = self.disk.pool_mut().create_track();
            let id = self.next_block_id;
            self.next_block_id += 1;
            self.blocks.push(SpatialBlock {
                id,
                bounds: mbr,
                centroid: mbr.centroid(),
                track_id,
                object_count,
            });
        }

        if self.config.enable_quadtree {
            self.build_quadtree();
        } else {
            self.quadtree = None;
        }

        self.is_built = true;
        info!(
            "build complete: {} objects, {} blocks",
            self.count(),
            self.blocks.len()
        );
        Ok(())
    }

    fn build_quadtree(&mut self) {
        let bounds = if self.bounds.is_empty() {
            Mbr::new(0.0, 0.0, 1.0, 1.0)
        } else {
            self.bounds
        };
        let mut qt: Quadtree<u64> = Quadtree::new(bounds, DEFAULT_NODE_CAPACITY, DEFAULT_MAX_DEPTH);
        for page in self.disk.pool().pages_iter() {
            if page.object_count() > 0 {
                let _ = qt.insert(
                    page.page_id(),
                    page.extent(),
                    page.centroid(),
                    page.page_id(),
                );
            }
        }
        self.quadtree = Some(qt);
    }

    /// Builds the quadtree lazily if missing, so adjacency queries succeed
    /// even before an explicit `build()` (spec §7 "User-visible behavior").
    fn ensure_quadtree(&mut self) {
        if self.quadtree.is_none() {
            self.build_quadtree();
        }
    }

    /// Page-extent intersection via the pool scan, refined per-object
    /// (spec §4.I "Query range").
    /// Page extents are scanned via the pool (spec §4.I "Query range"),
    /// but each matching page's contents are served through the LRU cache
    /// (spec §1 "serves pages through an LRU cache"), one page at a time.
    pub fn query_range(&mut self, mbr: &Mbr) -> Vec<SpatialObject> {
        let page_ids = self.disk.pool().query_region(mbr);
        let mut out = Vec::new();
        for page_id in page_ids {
            if let Ok(page) = self.disk.page(page_id) {
                out.extend(
                    page.objects()
                        .iter()
                        .filter(|o| o.mbr().intersects(mbr))
                        .cloned(),
                );
            }
        }
        out
    }

    pub fn query_point(&mut self, x: f64, y: f64) -> Vec<SpatialObject> {
        self.query_range(&Mbr::new(x, y, x, y))
    }

    /// Block KD-tree k-nearest over object centroids, returning the
    /// referenced objects in non-decreasing distance order (spec §4.I).
    pub fn query_knn(&mut self, x: f64, y: f64, k: usize) -> Vec<SpatialObject> {
        let hits = self.block_tree.k_nearest(Point::new(x, y), k);
        let mut out = Vec::with_capacity(hits.len());
        for n in hits {
            if let Some(obj) = self
                .disk
                .page(*n.data)
                .ok()
                .and_then(|p| p.find(n.object_id))
            {
                out.push(obj.clone());
            }
        }
        out
    }

    /// Builds the quadtree on demand, finds adjacent pages, and reports
    /// `(page_id, track_id)` pairs plus the estimated seek count (spec
    /// §4.I, §4.H).
    pub fn find_adjacent_pages(&mut self, mbr: &Mbr) -> AdjacentPages {
        self.ensure_quadtree();
        let hits = self.quadtree.as_ref().unwrap().find_adjacent_to_region(mbr);
        let mut pages: Vec<(u64, u64)> = Vec::with_capacity(hits.len());
        for (page_id, _, _, _) in &hits {
            let track_id = self.disk.page(*page_id).map(|p| p.track_id()).unwrap_or(0);
            pages.push((*page_id, track_id));
        }
        let page_ids: Vec<u64> = pages.iter().map(|(id, _)| *id).collect();
        let estimated_seeks = self.disk.estimate_seeks(&page_ids);
        AdjacentPages {
            pages,
            estimated_seeks,
        }
    }

    /// Union of objects in adjacent pages, filtered by MBR intersection
    /// with `mbr` (spec §4.I "Query adjacent").
    pub fn query_adjacent(&mut self, mbr: &Mbr) -> Vec<SpatialObject> {
        let adjacent = self.find_adjacent_pages(mbr);
        let mut out = Vec::new();
        for (page_id, _) in adjacent.pages {
            if let Ok(page) = self.disk.page(page_id) {
                for obj in page.objects() {
                    if obj.mbr().intersects(mbr) {
                        out.push(obj.clone());
                    }
                }
            }
        }
        out
    }

    pub fn optimize(&mut self) -> IndexResult<()> {
        self.build()
    }

    /// Delegates to the disk manager; creates the file if not already open
    /// (spec §4.I "Save/Load").
    pub fn save(&mut self, path: impl AsRef<Path>) -> IndexResult<()> {
        if !self.disk.is_open() {
            self.disk.create(path)?;
        }
        self.disk.sync()
    }

    /// Loads via the disk manager, then reconstructs the in-memory KD-tree
    /// and quadtree with `build()` (spec §4.I "Save/Load").
    pub fn load(&mut self, path: impl AsRef<Path>) -> IndexResult<()> {
        self.disk.open(path)?;
        self.bounds = self.disk.header().bounds;
        self.next_object_id = self
            .disk
            .pool()
            .pages_iter()
            .flat_map(|p| p.objects().iter().map(|o| o.id()))
            .max()
            .unwrap_or(0)
            + 1;
        self.build()
    }

    pub fn sync(&mut self) -> IndexResult<()> {
        self.disk.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn index() -> SpatialIndex {
        SpatialIndex::create(IndexConfig::default())
    }

    #[test]
    fn s1_small_build_and_range() {
        let mut idx = index();
        idx.insert_point(5.0, 5.0).unwrap();
        idx.insert_point(15.0, 15.0).unwrap();
        idx.insert_point(25.0, 25.0).unwrap();
        idx.build().unwrap();
        let hits = idx.query_range(&Mbr::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(idx.count(), 3);
    }

    #[test]
    fn s2_polyline_centroid_and_range() {
        let mut idx = index();
        idx.insert_polyline(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)])
            .unwrap();
        idx.build().unwrap();
        let hits = idx.query_range(&Mbr::new(4.0, -1.0, 6.0, 1.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].centroid(), Point::new(5.0, 0.0));
    }

    #[test]
    fn s3_polygon_centroid_and_area() {
        let mut idx = index();
        idx.insert_polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ])
        .unwrap();
        let obj = idx.get(1).unwrap();
        assert_eq!(obj.centroid(), Point::new(5.0, 5.0));
    }

    #[test]
    fn s4_adjacency_grid() {
        let cfg = IndexConfig {
            page_capacity: 4,
            ..IndexConfig::default()
        };
        let mut idx = SpatialIndex::create(cfg);
        for i in 0..10i64 {
            for j in 0..5i64 {
                idx.insert_point((i * 100) as f64, (j * 100) as f64)
                    .unwrap();
            }
        }
        idx.build().unwrap();
        let adjacent = idx.find_adjacent_pages(&Mbr::new(150.0, 150.0, 350.0, 350.0));
        assert!(!adjacent.pages.is_empty());
        assert!(adjacent.estimated_seeks <= adjacent.pages.len().saturating_sub(1));
    }

    #[test]
    fn s5_knn_order() {
        let mut idx = index();
        for (x, y) in [
            (0.0, 0.0),
            (1.0, 1.0),
            (2.0, 2.0),
            (10.0, 10.0),
            (20.0, 20.0),
        ] {
            idx.insert_point(x, y).unwrap();
        }
        idx.build().unwrap();
        let hits = idx.query_knn(0.5, 0.5, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].centroid(), Point::new(0.0, 0.0));
        assert_eq!(hits[1].centroid(), Point::new(1.0, 1.0));
    }

    #[test]
    fn s6_persistence_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        let mut idx = index();
        idx.insert_point(1.0, 1.0).unwrap();
        idx.insert_point(2.0, 2.0).unwrap();
        idx.build().unwrap();
        idx.save(&path).unwrap();

        let mut idx2 = index();
        idx2.load(&path).unwrap();
        assert_eq!(idx2.count(), 2);
        let b = idx2.bounds();
        assert!((b.min_x - 1.0).abs() < 1e-12);
        assert!((b.max_x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn k_nearest_on_small_index_returns_size() {
        let mut idx = index();
        idx.insert_point(0.0, 0.0).unwrap();
        idx.build().unwrap();
        assert_eq!(idx.query_knn(0.0, 0.0, 5).len(), 1);
    }
}
