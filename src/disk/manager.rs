//! Owns the page pool, the LRU cache, the allocation KD-tree, and the
//! backing file (spec §4.H).

use crate::cache::PageCache;
use crate::config::{AllocationStrategy, IndexConfig};
use crate::disk::header::{FileHeader, HEADER_BYTES};
use crate::error::{IndexError, IndexResult};
use crate::kdtree::KdTree;
use crate::page::{Page, DEFAULT_PAGE_BYTES};
use crate::point::Point;
use crate::pool::PagePool;
use crate::track::Track;
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Page allocation, file layout, and seek accounting (spec §4.H).
pub struct DiskManager {
    page_size: u32,
    pages_per_track: usize,
    strategy: AllocationStrategy,
    sync_on_write: bool,
    pool: PagePool,
    cache: PageCache,
    /// Points are `(page.centroid, page_id, page_id)` for pages with ≥ 1
    /// object (spec §4.H, GLOSSARY "Allocation KD-tree").
    alloc_tree: KdTree<u64>,
    file: Option<File>,
    path: Option<PathBuf>,
    header: FileHeader,
    reads: u64,
    writes: u64,
    dirty: bool,
}

impl DiskManager {
    pub fn new(config: &IndexConfig) -> Self {
        let page_size = DEFAULT_PAGE_BYTES as u32;
        Self {
            page_size,
            pages_per_track: config.pages_per_track,
            strategy: config.strategy,
            sync_on_write: config.sync_on_write,
            pool: PagePool::new(config.page_capacity, config.pages_per_track),
            cache: PageCache::new(config.cache_size),
            alloc_tree: KdTree::new(),
            file: None,
            path: None,
            header: FileHeader::new(page_size, config.pages_per_track as u32, now_secs()),
            reads: 0,
            writes: 0,
            dirty: false,
        }
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut PagePool {
        &mut self.pool
    }

    pub fn cache_mut(&mut self) -> &mut PageCache {
        &mut self.cache
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    /// Serves a page through the LRU cache (spec §1 "serves pages through
    /// an LRU cache"), tracking hit/miss and touching its recency.
    pub fn page(&mut self, id: u64) -> IndexResult<&Page> {
        self.cache.get(id, &self.pool)
    }

    pub fn alloc_tree(&self) -> &KdTree<u64> {
        &self.alloc_tree
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Picks an existing track with free capacity under the configured
    /// strategy, or `NotFound` if none qualifies (spec §4.H, §8 boundary
    /// "`sequential` with no tracks yields `NotFound`").
    fn choose_track(&self, centroid: Point) -> IndexResult<u64> {
        let candidates: Vec<&Track> = self.pool.tracks_iter().filter(|t| !t.is_full()).collect();
        if candidates.is_empty() {
            return Err(IndexError::NotFound("no track with free capacity".into()));
        }
        match self.strategy {
            AllocationStrategy::NearestTrack => {
                let mut best: Option<(&Track, f64)> = None;
                for t in &candidates {
                    let d = t.centroid().distance_sq(&centroid);
                    let better = match best {
                        Some((bt, bd)) => d < bd || (d == bd && t.track_id() < bt.track_id()),
                        None => true,
                    };
                    if better {
                        best = Some((t, d));
                    }
                }
                Ok(best.unwrap().0.track_id())
            }
            AllocationStrategy::BestFit => {
                let point_mbr = crate::mbr::Mbr::from_point(&centroid);
                let mut best: Option<(&Track, f64)> = None;
                for t in &candidates {
                    let delta = t.extent().enlargement(&point_mbr);
                    let better = match best {
                        Some((bt, bd)) => {
                            delta < bd || (delta == bd && t.track_id() < bt.track_id())
                        }
                        None => true,
                    };
                    if better {
                        best = Some((t, delta));
                    }
                }
                Ok(best.unwrap().0.track_id())
            }
            AllocationStrategy::Sequential => {
                let last = self.pool.max_track_id();
                if last == 0 || self.pool.track(last)?.is_full() {
                    Err(IndexError::NotFound("last track is full".into()))
                } else {
                    Ok(last)
                }
            }
            AllocationStrategy::NewTrack => Err(IndexError::NotFound(
                "new-track strategy always creates".into(),
            )),
        }
    }

    /// Picks a track by the configured strategy (creating one if none
    /// qualifies), allocates a fresh page assigned to it, and inserts the
    /// page into the allocation KD-tree at `centroid` (spec §4.H).
    pub fn alloc_page(&mut self, centroid: Point) -> IndexResult<u64> {
        let track_id = match self.choose_track(centroid) {
            Ok(id) => id,
            Err(_) => self.pool.create_track(),
        };
        let page_id = self.pool.allocate_page();
        self.pool.assign_to_track(page_id, track_id)?;
        self.alloc_tree.insert(centroid, page_id, page_id);
        self.dirty = true;
        debug!("allocated page {page_id} on track {track_id} near {centroid}");
        Ok(page_id)
    }

    /// Clears and bulk-loads the allocation tree from every pool page with
    /// at least one object (spec §4.H "Rebuild allocation tree").
    pub fn rebuild_allocation_tree(&mut self) {
        let entries: Vec<(Point, u64, u64)> = self
            .pool
            .pages_iter()
            .filter(|p| p.object_count() > 0)
            .map(|p| (p.centroid(), p.page_id(), p.page_id()))
            .collect();
        self.alloc_tree = KdTree::new();
        self.alloc_tree.bulk_load(entries);
    }

    /// Counts track-id transitions along `page_ids` (spec §4.H, §8
    /// property 7); the leading transition from "no previous track" is
    /// never counted.
    pub fn estimate_seeks(&self, page_ids: &[u64]) -> usize {
        let mut count = 0;
        let mut prev: Option<u64> = None;
        for &id in page_ids {
            let track_id = self.pool.page(id).map(|p| p.track_id()).unwrap_or(0);
            if let Some(p) = prev {
                if p != track_id {
                    count += 1;
                }
            }
            prev = Some(track_id);
        }
        count
    }

    /// Creates a fresh backing file: zeroed header, empty pool.
    pub fn create(&mut self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.header = FileHeader::new(self.page_size, self.pages_per_track as u32, now_secs());
        self.write_header()?;
        self.dirty = false;
        info!("created index file at {}", path.display());
        Ok(())
    }

    /// Opens an existing file, loads the header, every page in
    /// `[1, page_count]`, and reconstructs tracks from page `track_id`
    /// fields (spec §4.H "Open").
    pub fn open(&mut self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header_buf = vec![0u8; HEADER_BYTES];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buf)?;
        self.reads += 1;
        let header = FileHeader::deserialize(&header_buf)?;

        self.pool = PagePool::new(self.pool.page_capacity(), header.pages_per_track as usize);
        let mut page_bytes = vec![0u8; header.page_size as usize];
        let mut track_members: std::collections::BTreeMap<u64, Vec<u64>> =
            std::collections::BTreeMap::new();
        for page_id in 1..=header.page_count as u64 {
            file.seek(SeekFrom::Start(header.page_offset(page_id)))?;
            file.read_exact(&mut page_bytes)?;
            self.reads += 1;
            let record = Page::deserialize(&page_bytes, self.pool.page_capacity())?;
            if record.flags.is_empty() && record.entries.is_empty() {
                continue; // never-written slot
            }
            if record.track_id != 0 {
                track_members
                    .entry(record.track_id)
                    .or_default()
                    .push(page_id);
            }
            let page = Page::from_record(record, self.pool.page_capacity());
            self.pool.restore_page(page);
        }
        for (track_id, page_ids) in track_members {
            self.pool
                .restore_track(Track::new(track_id, header.pages_per_track as usize));
            for id in page_ids {
                self.pool.track_mut(track_id)?.restore_page_id(id);
            }
            self.pool.recompute_track_derived(track_id)?;
        }

        self.header = header;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.rebuild_allocation_tree();
        self.dirty = false;
        info!(
            "opened index file at {} with {} pages",
            path.display(),
            self.header.page_count
        );
        Ok(())
    }

    fn write_header(&mut self) -> IndexResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| IndexError::InvalidArg("no open file".into()))?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.header.serialize())?;
        self.writes += 1;
        Ok(())
    }

    /// Persists every DIRTY page, recomputes header aggregates, and writes
    /// the header (spec §4.H "Sync").
    pub fn sync(&mut self) -> IndexResult<()> {
        if self.file.is_some() {
            let page_size = self.header.page_size as usize;
            let mut writes = 0u64;
            {
                let header = &self.header;
                let file = self.file.as_mut().unwrap();
                self.cache.flush(&mut self.pool, |page| {
                    let bytes = page.serialize(page_size)?;
                    let offset = header.page_offset(page.page_id());
                    file.seek(SeekFrom::Start(offset))?;
                    file.write_all(&bytes)?;
                    writes += 1;
                    Ok(())
                })?;
            }
            self.writes += writes;
            let stats = self.pool.stats();
            self.header.page_count = self.pool.max_page_id() as u32;
            self.header.track_count = self.pool.max_track_id() as u32;
            self.header.object_count = stats.total_objects as u64;
            let mut bounds = crate::mbr::Mbr::empty();
            for p in self.pool.pages_iter() {
                bounds.expand_mbr(&p.extent());
            }
            self.header.bounds = bounds;
            self.header.modified_time = now_secs();
            self.write_header()?;
            let file = self.file.as_mut().unwrap();
            file.sync_all()?;
        } else {
            warn!("sync() called with no open file; clearing dirty flags in memory only");
            let dirty_ids: Vec<u64> = self
                .pool
                .pages_iter()
                .filter(|p| p.is_dirty())
                .map(|p| p.page_id())
                .collect();
            for id in &dirty_ids {
                self.pool.page_mut(*id)?.clear_dirty_for_flush();
            }
        }
        self.dirty = false;
        Ok(())
    }

    /// Syncs, then releases the file handle (spec §4.H "Close").
    pub fn close(&mut self) -> IndexResult<()> {
        self.sync()?;
        self.file = None;
        self.path = None;
        Ok(())
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn io_counters(&self) -> (u64, u64) {
        (self.reads, self.writes)
    }

    pub fn sync_on_write(&self) -> bool {
        self.sync_on_write
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SpatialObject;
    use tempfile::NamedTempFile;

    fn config() -> IndexConfig {
        IndexConfig {
            page_capacity: 4,
            pages_per_track: 2,
            ..IndexConfig::default()
        }
    }

    #[test]
    fn new_track_strategy_always_creates() {
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::NewTrack;
        let mut mgr = DiskManager::new(&cfg);
        let p1 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        let p2 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        assert_ne!(
            mgr.pool().page(p1).unwrap().track_id(),
            mgr.pool().page(p2).unwrap().track_id()
        );
    }

    #[test]
    fn best_fit_prefers_least_enlargement() {
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::BestFit;
        let mut mgr = DiskManager::new(&cfg);

        // Build two tracks by hand, each with room left, so BestFit has a
        // real choice between them for p3.
        let track_a = mgr.pool_mut().create_track();
        let pa = mgr.pool_mut().allocate_page();
        mgr.pool_mut()
            .page_mut(pa)
            .unwrap()
            .add(SpatialObject::point(0.0, 0.0))
            .unwrap();
        mgr.pool_mut().assign_to_track(pa, track_a).unwrap();
        mgr.pool_mut().recompute_track_derived(track_a).unwrap();

        let track_b = mgr.pool_mut().create_track();
        let pb = mgr.pool_mut().allocate_page();
        mgr.pool_mut()
            .page_mut(pb)
            .unwrap()
            .add(SpatialObject::point(1000.0, 1000.0))
            .unwrap();
        mgr.pool_mut().assign_to_track(pb, track_b).unwrap();
        mgr.pool_mut().recompute_track_derived(track_b).unwrap();

        let p3 = mgr.alloc_page(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(mgr.pool().page(p3).unwrap().track_id(), track_a);
    }

    #[test]
    fn sequential_with_no_tracks_creates_new() {
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::Sequential;
        let mut mgr = DiskManager::new(&cfg);
        let p1 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(mgr.pool().page(p1).unwrap().track_id(), 1);
    }

    #[test]
    fn sequential_forces_new_track_when_last_created_is_full() {
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::Sequential;
        let mut mgr = DiskManager::new(&cfg);

        // T1 (track_a) has room for one more page; T2 (track_b), created
        // after it, is already full. Sequential must force a new track
        // rather than falling back to the earlier track with capacity.
        let track_a = mgr.pool_mut().create_track();
        let pa = mgr.pool_mut().allocate_page();
        mgr.pool_mut().assign_to_track(pa, track_a).unwrap();

        let track_b = mgr.pool_mut().create_track();
        let pb1 = mgr.pool_mut().allocate_page();
        mgr.pool_mut().assign_to_track(pb1, track_b).unwrap();
        let pb2 = mgr.pool_mut().allocate_page();
        mgr.pool_mut().assign_to_track(pb2, track_b).unwrap();
        assert!(mgr.pool().track(track_b).unwrap().is_full());

        let p3 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        let track_c = mgr.pool().page(p3).unwrap().track_id();
        assert_ne!(track_c, track_a);
        assert_ne!(track_c, track_b);
    }

    #[test]
    fn estimate_seeks_counts_track_transitions() {
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::NewTrack;
        let mut mgr = DiskManager::new(&cfg);
        let p1 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        let p2 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        let p3 = mgr.alloc_page(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(mgr.estimate_seeks(&[p1, p1, p2, p3]), 2);
    }

    #[test]
    fn create_sync_open_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        let mut cfg = config();
        cfg.strategy = AllocationStrategy::NewTrack;

        let mut mgr = DiskManager::new(&cfg);
        mgr.create(&path).unwrap();
        let page_id = mgr.alloc_page(Point::new(1.0, 1.0)).unwrap();
        let mut obj = SpatialObject::point(1.0, 1.0);
        obj.assign_id(1).unwrap();
        mgr.pool_mut().page_mut(page_id).unwrap().add(obj).unwrap();
        mgr.sync().unwrap();
        mgr.close().unwrap();

        let mut mgr2 = DiskManager::new(&cfg);
        mgr2.open(&path).unwrap();
        assert_eq!(mgr2.pool().stats().total_objects, 1);
        assert_eq!(
            mgr2.pool().page(page_id).unwrap().centroid(),
            Point::new(1.0, 1.0)
        );
    }
}
