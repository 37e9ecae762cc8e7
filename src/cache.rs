//! LRU metadata cache over pool-owned pages (spec §4.E).
//!
//! The pool is the sole owner of page storage (spec §3 "Ownership"); this
//! cache tracks *which* pages are hot and in what order, returning
//! references into the pool rather than owning copies. Eviction drops
//! only the cache's own bookkeeping — the underlying page always stays
//! resident in the pool, matching the "no dangling references across
//! rebuilds" design note in spec §9.

use crate::error::IndexResult;
use crate::page::Page;
use crate::pool::PagePool;
use log::trace;
use std::collections::{HashMap, VecDeque};

/// Per-entry access bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct PageRef {
    pub page_id: u64,
    pub access_count: u64,
    pub last_access: u64,
}

/// Bounded MRU→LRU cache of page ids.
pub struct PageCache {
    capacity: usize,
    /// Front = LRU (oldest), back = MRU (newest).
    order: VecDeque<u64>,
    index: HashMap<u64, PageRef>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            index: HashMap::new(),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, page_id: u64) -> bool {
        self.index.contains_key(&page_id)
    }

    /// Direct hit/miss counters, replacing the heuristic hit-rate formula
    /// flagged as buggy in spec §9.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn touch(&mut self, page_id: u64) {
        self.clock += 1;
        self.order.retain(|&id| id != page_id);
        self.order.push_back(page_id);
        let clock = self.clock;
        self.index
            .entry(page_id)
            .and_modify(|r| {
                r.access_count += 1;
                r.last_access = clock;
            })
            .or_insert(PageRef {
                page_id,
                access_count: 1,
                last_access: clock,
            });
    }

    /// Fetches `pool`'s page, tracking it as most-recently-used. Evicts
    /// one unpinned entry first if the cache is full and `id` isn't
    /// already tracked.
    pub fn get<'a>(&mut self, page_id: u64, pool: &'a PagePool) -> IndexResult<&'a Page> {
        let page = pool.page(page_id)?;
        if self.index.contains_key(&page_id) {
            self.hits += 1;
            trace!("cache hit for page {page_id}");
        } else {
            self.misses += 1;
            trace!("cache miss for page {page_id}");
            if self.index.len() >= self.capacity {
                self.evict_one(pool);
            }
        }
        self.touch(page_id);
        Ok(page)
    }

    /// Sets the `PINNED` flag on the page; pinned pages are skipped by
    /// eviction.
    pub fn pin(&mut self, page_id: u64, pool: &mut PagePool) -> IndexResult<()> {
        pool.page_mut(page_id)?.pin();
        Ok(())
    }

    pub fn unpin(&mut self, page_id: u64, pool: &mut PagePool) -> IndexResult<()> {
        pool.page_mut(page_id)?.unpin();
        Ok(())
    }

    pub fn mark_dirty(&mut self, page_id: u64, pool: &mut PagePool) -> IndexResult<()> {
        pool.page_mut(page_id)?.mark_dirty();
        Ok(())
    }

    /// Evicts one unpinned entry from the LRU tail, if any exists. The
    /// cursor advances past pinned entries without evicting them.
    fn evict_one(&mut self, pool: &PagePool) -> bool {
        let mut skipped = Vec::new();
        let mut evicted = false;
        while let Some(id) = self.order.pop_front() {
            let pinned = pool.page(id).map(|p| p.is_pinned()).unwrap_or(false);
            if pinned {
                skipped.push(id);
                continue;
            }
            self.index.remove(&id);
            trace!("evicted page {id} from cache");
            evicted = true;
            break;
        }
        for id in skipped.into_iter().rev() {
            self.order.push_front(id);
        }
        evicted
    }

    /// Evicts up to `n` unpinned entries from the tail; returns the
    /// number actually evicted.
    pub fn evict(&mut self, n: usize, pool: &PagePool) -> usize {
        let mut evicted = 0;
        while evicted < n && self.evict_one(pool) {
            evicted += 1;
        }
        evicted
    }

    /// Persists every DIRTY page in the *pool* (not just cached entries,
    /// per spec §4.E) via `persist`, clearing DIRTY on success.
    pub fn flush<F>(&mut self, pool: &mut PagePool, mut persist: F) -> IndexResult<usize>
    where
        F: FnMut(&Page) -> IndexResult<()>,
    {
        let dirty_ids: Vec<u64> = pool
            .pages_iter()
            .filter(|p| p.is_dirty())
            .map(|p| p.page_id())
            .collect();
        for id in &dirty_ids {
            let page = pool.page(*id)?;
            persist(page)?;
            let page = pool.page_mut(*id)?;
            page_clear_dirty(page);
        }
        Ok(dirty_ids.len())
    }

    /// Debug invariant: the LRU order and the hash index carry identical
    /// membership (spec §8, property 6).
    #[cfg(test)]
    fn check_invariant(&self) {
        let order_set: std::collections::HashSet<_> = self.order.iter().copied().collect();
        let index_set: std::collections::HashSet<_> = self.index.keys().copied().collect();
        assert_eq!(order_set, index_set);
    }
}

fn page_clear_dirty(page: &mut Page) {
    // Page doesn't expose a public dirty-clear (mutation always re-dirties
    // it); go through the flags directly since cache and page are in the
    // same crate.
    page.clear_dirty_for_flush();
}
