//! Page-level quadtree for adjacency queries (spec §4.G).

use crate::error::{IndexError, IndexResult};
use crate::mbr::Mbr;
use crate::point::Point;

/// Default items per node before splitting (`C_node`).
pub const DEFAULT_NODE_CAPACITY: usize = 8;
/// Default maximum depth (`D_max`).
pub const DEFAULT_MAX_DEPTH: usize = 20;

struct Item<T> {
    id: u64,
    bounds: Mbr,
    centroid: Point,
    data: T,
}

enum NodeBody<T> {
    Leaf,
    Internal(Box<[QuadNode<T>; 4]>),
}

struct QuadNode<T> {
    bounds: Mbr,
    depth: usize,
    items: Vec<Item<T>>,
    body: NodeBody<T>,
}

impl<T> QuadNode<T> {
    fn new_leaf(bounds: Mbr, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            items: Vec::new(),
            body: NodeBody::Leaf,
        }
    }

    /// Standard quadrant MBRs: north = higher y, east = higher x. The
    /// midline belongs to the north/east side (spec §4.G).
    fn child_bounds(&self) -> [Mbr; 4] {
        let mid_x = (self.bounds.min_x + self.bounds.max_x) / 2.0;
        let mid_y = (self.bounds.min_y + self.bounds.max_y) / 2.0;
        let nw = Mbr::new(self.bounds.min_x, mid_y, mid_x, self.bounds.max_y);
        let ne = Mbr::new(mid_x, mid_y, self.bounds.max_x, self.bounds.max_y);
        let sw = Mbr::new(self.bounds.min_x, self.bounds.min_y, mid_x, mid_y);
        let se = Mbr::new(mid_x, self.bounds.min_y, self.bounds.max_x, mid_y);
        [nw, ne, sw, se]
    }

    fn split(&mut self) {
        let child_bounds = self.child_bounds();
        let children: [QuadNode<T>; 4] =
            std::array::from_fn(|i| QuadNode::new_leaf(child_bounds[i], self.depth + 1));
        let mut children = Box::new(children);

        let old_items = std::mem::take(&mut self.items);
        let mut remaining = Vec::new();
        for item in old_items {
            match Self::quadrant_for(&child_bounds, &item.bounds) {
                Some(q) => children[q].items.push(item),
                None => remaining.push(item),
            }
        }
        self.items = remaining;
        self.body = NodeBody::Internal(children);
    }

    /// Finds the single quadrant whose bounds fully contain `bounds`,
    /// using inclusive-midline-on-north/east semantics, or `None` if no
    /// single quadrant does (the item stays at this node — spec §9's
    /// resolution of the source's item-dropping bug).
    fn quadrant_for(child_bounds: &[Mbr; 4], bounds: &Mbr) -> Option<usize> {
        (0..4).find(|&q| child_bounds[q].contains_mbr(bounds))
    }

    fn insert(&mut self, item: Item<T>, node_capacity: usize, max_depth: usize) -> IndexResult<()> {
        if !self.bounds.intersects(&item.bounds) {
            return Err(IndexError::InvalidArg(format!(
                "item bounds {} do not intersect node bounds {}",
                item.bounds, self.bounds
            )));
        }
        match &mut self.body {
            NodeBody::Leaf => {
                if self.items.len() < node_capacity || self.depth >= max_depth {
                    self.items.push(item);
                    Ok(())
                } else {
                    self.split();
                    self.insert(item, node_capacity, max_depth)
                }
            }
            NodeBody::Internal(children) => {
                let child_bounds: [Mbr; 4] = std::array::from_fn(|i| children[i].bounds);
                match Self::quadrant_for(&child_bounds, &item.bounds) {
                    Some(q) => children[q].insert(item, node_capacity, max_depth),
                    None => {
                        self.items.push(item);
                        Ok(())
                    }
                }
            }
        }
    }

    fn range_query<'a>(&'a self, mbr: &Mbr, out: &mut Vec<&'a Item<T>>) {
        if !self.bounds.intersects(mbr) {
            return;
        }
        for item in &self.items {
            if item.bounds.intersects(mbr) {
                out.push(item);
            }
        }
        if let NodeBody::Internal(children) = &self.body {
            for child in children.iter() {
                child.range_query(mbr, out);
            }
        }
    }

    fn point_query<'a>(&'a self, p: &Point, out: &mut Vec<&'a Item<T>>) {
        if !self.bounds.contains_point(p) {
            return;
        }
        for item in &self.items {
            if item.bounds.contains_point(p) {
                out.push(item);
            }
        }
        if let NodeBody::Internal(children) = &self.body {
            for child in children.iter() {
                child.point_query(p, out);
            }
        }
    }

    fn remove(&mut self, id: u64) -> Option<Item<T>> {
        if let Some(idx) = self.items.iter().position(|i| i.id == id) {
            return Some(self.items.remove(idx));
        }
        if let NodeBody::Internal(children) = &mut self.body {
            for child in children.iter_mut() {
                if let Some(item) = child.remove(id) {
                    return Some(item);
                }
            }
        }
        None
    }

    fn find(&self, id: u64) -> Option<&Item<T>> {
        if let Some(item) = self.items.iter().find(|i| i.id == id) {
            return Some(item);
        }
        if let NodeBody::Internal(children) = &self.body {
            for child in children.iter() {
                if let Some(item) = child.find(id) {
                    return Some(item);
                }
            }
        }
        None
    }
}

/// Recursive region quadtree over page (or object) MBRs.
pub struct Quadtree<T> {
    root: QuadNode<T>,
    node_capacity: usize,
    max_depth: usize,
}

impl<T> Quadtree<T> {
    pub fn new(bounds: Mbr, node_capacity: usize, max_depth: usize) -> Self {
        Self {
            root: QuadNode::new_leaf(bounds, 0),
            node_capacity,
            max_depth,
        }
    }

    pub fn bounds(&self) -> Mbr {
        self.root.bounds
    }

    pub fn insert(&mut self, id: u64, bounds: Mbr, centroid: Point, data: T) -> IndexResult<()> {
        self.root.insert(
            Item {
                id,
                bounds,
                centroid,
                data,
            },
            self.node_capacity,
            self.max_depth,
        )
    }

    pub fn range_query(&self, mbr: &Mbr) -> Vec<(u64, Mbr, Point, &T)> {
        let mut out = Vec::new();
        self.root.range_query(mbr, &mut out);
        out.into_iter().map(Self::project).collect()
    }

    pub fn point_query(&self, p: Point) -> Vec<(u64, Mbr, Point, &T)> {
        let mut out = Vec::new();
        self.root.point_query(&p, &mut out);
        out.into_iter().map(Self::project).collect()
    }

    /// Expands `region` by `max(1e-6, 0.01 * width)` per axis, range-queries
    /// it, then filters to items that overlap `region` within an absolute
    /// tolerance of `1e-9` on both axes (spec §4.G, GLOSSARY).
    pub fn find_adjacent_to_region(&self, region: &Mbr) -> Vec<(u64, Mbr, Point, &T)> {
        let expanded = region.expanded_for_adjacency();
        self.range_query(&expanded)
            .into_iter()
            .filter(|(_, bounds, _, _)| bounds.adjacent_or_intersects(region, 1e-9))
            .collect()
    }

    pub fn remove(&mut self, id: u64) -> Option<(u64, Mbr, Point, T)> {
        self.root
            .remove(id)
            .map(|i| (i.id, i.bounds, i.centroid, i.data))
    }

    pub fn find(&self, id: u64) -> Option<(u64, Mbr, Point, &T)> {
        self.root.find(id).map(Self::project)
    }

    /// Removes and reinserts at the new bounds/centroid (spec §4.G).
    pub fn update(&mut self, id: u64, bounds: Mbr, centroid: Point) -> IndexResult<()>
    where
        T: Clone,
    {
        let (_, _, _, data) = self
            .remove(id)
            .ok_or_else(|| IndexError::NotFound(format!("quadtree item {id}")))?;
        self.insert(id, bounds, centroid, data)
    }

    fn project(item: &Item<T>) -> (u64, Mbr, Point, &T) {
        (item.id, item.bounds, item.centroid, &item.data)
    }
}
