//! Owns all page and track storage (spec §4.D).
//!
//! Everyone else references pages/tracks by id; the pool is the only
//! component that owns the underlying storage (spec §3 "Ownership",
//! spec §9 "Pointer graphs without cycles").

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;
use crate::page::Page;
use crate::track::Track;

#[derive(Debug, Default, Clone, Copy)]
pub struct PoolStats {
    pub page_count: usize,
    pub track_count: usize,
    pub total_objects: usize,
}

/// Dynamic arrays of pages and tracks, indexed by id.
pub struct PagePool {
    pages: Vec<Option<Page>>,
    tracks: Vec<Option<Track>>,
    next_page_id: u64,
    next_track_id: u64,
    page_capacity: usize,
    track_capacity: usize,
}

impl PagePool {
    pub fn new(page_capacity: usize, track_capacity: usize) -> Self {
        Self {
            pages: Vec::new(),
            tracks: Vec::new(),
            next_page_id: 1,
            next_track_id: 1,
            page_capacity,
            track_capacity,
        }
    }

    fn slot(id: u64) -> usize {
        (id - 1) as usize
    }

    /// Allocates a fresh, empty page (not yet assigned to a track).
    pub fn allocate_page(&mut self) -> u64 {
        let id = self.next_page_id;
        self.next_page_id += 1;
        let slot = Self::slot(id);
        if slot >= self.pages.len() {
            self.pages.resize_with(slot + 1, || None);
        }
        self.pages[slot] = Some(Page::new(id, self.page_capacity));
        id
    }

    pub fn create_track(&mut self) -> u64 {
        let id = self.next_track_id;
        self.next_track_id += 1;
        let slot = Self::slot(id);
        if slot >= self.tracks.len() {
            self.tracks.resize_with(slot + 1, || None);
        }
        self.tracks[slot] = Some(Track::new(id, self.track_capacity));
        id
    }

    pub fn page(&self, id: u64) -> IndexResult<&Page> {
        self.pages
            .get(Self::slot(id))
            .and_then(|p| p.as_ref())
            .ok_or_else(|| IndexError::NotFound(format!("page {id}")))
    }

    pub fn page_mut(&mut self, id: u64) -> IndexResult<&mut Page> {
        self.pages
            .get_mut(Self::slot(id))
            .and_then(|p| p.as_mut())
            .ok_or_else(|| IndexError::NotFound(format!("page {id}")))
    }

    pub fn track(&self, id: u64) -> IndexResult<&Track> {
        self.tracks
            .get(Self::slot(id))
            .and_then(|t| t.as_ref())
            .ok_or_else(|| IndexError::NotFound(format!("track {id}")))
    }

    pub fn track_mut(&mut self, id: u64) -> IndexResult<&mut Track> {
        self.tracks
            .get_mut(Self::slot(id))
            .and_then(|t| t.as_mut())
            .ok_or_else(|| IndexError::NotFound(format!("track {id}")))
    }

    /// Assigns `page_id` to `track_id`, updating both sides' derived
    /// state.
    pub fn assign_to_track(&mut self, page_id: u64, track_id: u64) -> IndexResult<()> {
        let mut page = self
            .pages
            .get_mut(Self::slot(page_id))
            .and_then(|p| p.take())
            .ok_or_else(|| IndexError::NotFound(format!("page {page_id}")))?;
        let result = self
            .tracks
            .get_mut(Self::slot(track_id))
            .and_then(|t| t.as_mut())
            .ok_or_else(|| IndexError::NotFound(format!("track {track_id}")))
            .and_then(|track| track.add_page(&mut page));
        self.pages[Self::slot(page_id)] = Some(page);
        result
    }

    /// Frees a page: removes it from its track (if any) and drops its
    /// storage.
    pub fn free_page(&mut self, page_id: u64) -> IndexResult<()> {
        let page = self
            .pages
            .get_mut(Self::slot(page_id))
            .and_then(|p| p.take())
            .ok_or_else(|| IndexError::NotFound(format!("page {page_id}")))?;
        if page.track_id() != 0 {
            if let Some(Some(track)) = self.tracks.get_mut(Self::slot(page.track_id())) {
                let _ = track.remove_page(page_id);
            }
        }
        Ok(())
    }

    /// Drops a track that owns no pages (e.g. a block-dedicated track
    /// from a prior `build()`), freeing its id slot.
    pub fn free_track(&mut self, track_id: u64) -> IndexResult<()> {
        self.tracks
            .get_mut(Self::slot(track_id))
            .and_then(|t| t.take())
            .map(|_| ())
            .ok_or_else(|| IndexError::NotFound(format!("track {track_id}")))
    }

    pub fn pages_iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter_map(|p| p.as_ref())
    }

    pub fn pages_iter_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.iter_mut().filter_map(|p| p.as_mut())
    }

    pub fn tracks_iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter_map(|t| t.as_ref())
    }

    /// Pages whose extent intersects `mbr` (pool-level MBR scan).
    pub fn query_region(&self, mbr: &Mbr) -> Vec<u64> {
        self.pages_iter()
            .filter(|p| p.extent().intersects(mbr))
            .map(|p| p.page_id())
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            page_count: self.pages_iter().count(),
            track_count: self.tracks_iter().count(),
            total_objects: self.pages_iter().map(|p| p.object_count()).sum(),
        }
    }

    pub fn page_capacity(&self) -> usize {
        self.page_capacity
    }

    pub fn track_capacity(&self) -> usize {
        self.track_capacity
    }

    /// Highest page id ever assigned (header `page_count` per spec §4.H —
    /// the slot range, not the count of currently-live pages).
    pub fn max_page_id(&self) -> u64 {
        self.next_page_id - 1
    }

    pub fn max_track_id(&self) -> u64 {
        self.next_track_id - 1
    }

    /// Reinserts a page recovered from disk at its own id, advancing the
    /// id counter past it (spec §4.H `open`).
    pub(crate) fn restore_page(&mut self, page: Page) {
        let id = page.page_id();
        let slot = Self::slot(id);
        if slot >= self.pages.len() {
            self.pages.resize_with(slot + 1, || None);
        }
        self.pages[slot] = Some(page);
        self.next_page_id = self.next_page_id.max(id + 1);
    }

    /// Reinserts a track recovered from disk at its own id.
    pub(crate) fn restore_track(&mut self, track: Track) {
        let id = track.track_id();
        let slot = Self::slot(id);
        if slot >= self.tracks.len() {
            self.tracks.resize_with(slot + 1, || None);
        }
        self.tracks[slot] = Some(track);
        self.next_track_id = self.next_track_id.max(id + 1);
    }

    /// Recomputes a track's aggregate extent/centroid from its current
    /// member pages (used after restoring pages from disk).
    pub(crate) fn recompute_track_derived(&mut self, track_id: u64) -> IndexResult<()> {
        let page_ids = self.track(track_id)?.page_ids().to_vec();
        let mut extent = Mbr::empty();
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
        for id in &page_ids {
            let p = self.page(*id)?;
            extent.expand_mbr(&p.extent());
            if !p.extent().is_empty() {
                let c = p.centroid();
                sx += c.x;
                sy += c.y;
                n += 1;
            }
        }
        let centroid = if n == 0 {
            crate::point::Point::new(0.0, 0.0)
        } else {
            crate::point::Point::new(sx / n as f64, sy / n as f64)
        };
        self.track_mut(track_id)?.set_derived(extent, centroid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SpatialObject;

    #[test]
    fn allocate_assign_and_query_region() {
        let mut pool = PagePool::new(4, 2);
        let track_id = pool.create_track();
        let page_id = pool.allocate_page();
        pool.page_mut(page_id)
            .unwrap()
            .add(SpatialObject::point(1.0, 1.0))
            .unwrap();
        pool.assign_to_track(page_id, track_id).unwrap();

        assert_eq!(pool.page(page_id).unwrap().track_id(), track_id);
        assert_eq!(pool.track(track_id).unwrap().page_count(), 1);

        let hits = pool.query_region(&Mbr::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(hits, vec![page_id]);
    }

    #[test]
    fn free_page_removes_from_track() {
        let mut pool = PagePool::new(4, 2);
        let track_id = pool.create_track();
        let page_id = pool.allocate_page();
        pool.assign_to_track(page_id, track_id).unwrap();
        pool.free_page(page_id).unwrap();
        assert!(pool.page(page_id).is_err());
        assert_eq!(pool.track(track_id).unwrap().page_count(), 0);
    }

    #[test]
    fn stats_aggregate_across_pages() {
        let mut pool = PagePool::new(4, 2);
        let p1 = pool.allocate_page();
        let p2 = pool.allocate_page();
        pool.page_mut(p1)
            .unwrap()
            .add(SpatialObject::point(0.0, 0.0))
            .unwrap();
        pool.page_mut(p2)
            .unwrap()
            .add(SpatialObject::point(1.0, 1.0))
            .unwrap();
        pool.page_mut(p2)
            .unwrap()
            .add(SpatialObject::point(2.0, 2.0))
            .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.page_count, 2);
        assert_eq!(stats.total_objects, 3);
    }
}
