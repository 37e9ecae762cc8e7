//! 2-D median-split KD-tree: bulk load, nearest/k-nearest/range/radius
//! queries, and leaf-bounds partitioning into blocks (spec §4.F).

use crate::mbr::Mbr;
use crate::point::Point;

/// A KD-tree node. `data` is the opaque payload the caller attaches to
/// each point (a page or object reference, per spec §9's "typed carrier"
/// design note — generic here instead of a void pointer).
struct Node<T> {
    point: Point,
    object_id: u64,
    data: T,
    split_dim: u8,
    bounds: Mbr,
    subtree_size: usize,
    insertion_order: u64,
    left: Option<Box<Node<T>>>,
    right: Option<Box<Node<T>>>,
}

/// A neighbor result from [`KdTree::nearest`]/[`KdTree::k_nearest`].
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a, T> {
    pub point: Point,
    pub object_id: u64,
    pub data: &'a T,
    pub distance_sq: f64,
}

/// Statistics about tree shape (spec §4.F).
#[derive(Debug, Clone, Copy)]
pub struct KdTreeStats {
    pub size: usize,
    pub depth: usize,
    pub is_balanced: bool,
}

pub struct KdTree<T> {
    root: Option<Box<Node<T>>>,
    next_insertion_order: u64,
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self {
            root: None,
            next_insertion_order: 0,
        }
    }
}

impl<T> KdTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.root.as_ref().map(|n| n.subtree_size).unwrap_or(0)
    }

    pub fn bounds(&self) -> Mbr {
        self.root
            .as_ref()
            .map(|n| n.bounds)
            .unwrap_or_else(Mbr::empty)
    }

    /// Rebuilds the tree from scratch via median-split bulk loading.
    /// Ties on the split axis place equal coordinates in the right
    /// subtree (spec §4.F).
    pub fn bulk_load(&mut self, entries: Vec<(Point, u64, T)>) {
        let indexed: Vec<(Point, u64, T, u64)> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (p, id, d))| (p, id, d, i as u64))
            .collect();
        self.next_insertion_order = indexed.len() as u64;
        self.root = Self::build(indexed, 0);
    }

    fn build(mut entries: Vec<(Point, u64, T, u64)>, depth: usize) -> Option<Box<Node<T>>> {
        if entries.is_empty() {
            return None;
        }
        let dim = (depth % 2) as u8;
        entries.sort_by(|a, b| a.0.on_axis(dim).partial_cmp(&b.0.on_axis(dim)).unwrap());
        let m = entries.len() / 2;
        let mut right_entries = entries.split_off(m);
        let (point, object_id, data, insertion_order) = right_entries.remove(0);
        let left_entries = entries;

        let left = Self::build(left_entries, depth + 1);
        let right = Self::build(right_entries, depth + 1);

        let mut bounds = Mbr::from_point(&point);
        let mut subtree_size = 1;
        if let Some(l) = &left {
            bounds.expand_mbr(&l.bounds);
            subtree_size += l.subtree_size;
        }
        if let Some(r) = &right {
            bounds.expand_mbr(&r.bounds);
            subtree_size += r.subtree_size;
        }

        Some(Box::new(Node {
            point,
            object_id,
            data,
            split_dim: dim,
            bounds,
            subtree_size,
            insertion_order,
            left,
            right,
        }))
    }

    /// Descends by the split rule, attaching a new leaf at the first null
    /// child. Ancestors grow `subtree_size` and `bounds`; no rebalancing
    /// happens (spec §4.F).
    pub fn insert(&mut self, point: Point, object_id: u64, data: T) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        Self::insert_rec(&mut self.root, point, object_id, data, 0, order);
    }

    fn insert_rec(
        slot: &mut Option<Box<Node<T>>>,
        point: Point,
        object_id: u64,
        data: T,
        depth: usize,
        order: u64,
    ) {
        match slot {
            None => {
                *slot = Some(Box::new(Node {
                    point,
                    object_id,
                    data,
                    split_dim: (depth % 2) as u8,
                    bounds: Mbr::from_point(&point),
                    subtree_size: 1,
                    insertion_order: order,
                    left: None,
                    right: None,
                }));
            }
            Some(node) => {
                let dim = node.split_dim;
                if point.on_axis(dim) < node.point.on_axis(dim) {
                    Self::insert_rec(&mut node.left, point, object_id, data, depth + 1, order);
                } else {
                    Self::insert_rec(&mut node.right, point, object_id, data, depth + 1, order);
                }
                node.subtree_size += 1;
                node.bounds.expand_point(&point);
            }
        }
    }

    /// Recursive best-first nearest neighbor (spec §4.F).
    pub fn nearest(&self, q: Point) -> Option<Neighbor<'_, T>> {
        let mut best: Option<Neighbor<'_, T>> = None;
        Self::nearest_rec(self.root.as_deref(), q, &mut best);
        best
    }

    fn nearest_rec<'a>(node: Option<&'a Node<T>>, q: Point, best: &mut Option<Neighbor<'a, T>>) {
        let Some(node) = node else { return };
        let d = q.distance_sq(&node.point);
        if best.is_none() || d < best.as_ref().unwrap().distance_sq {
            *best = Some(Neighbor {
                point: node.point,
                object_id: node.object_id,
                data: &node.data,
                distance_sq: d,
            });
        }
        let dim = node.split_dim;
        let diff = q.on_axis(dim) - node.point.on_axis(dim);
        let (near, far) = if diff < 0.0 {
            (node.left.as_deref(), node.right.as_deref())
        } else {
            (node.right.as_deref(), node.left.as_deref())
        };
        Self::nearest_rec(near, q, best);
        if diff * diff < best.as_ref().unwrap().distance_sq {
            Self::nearest_rec(far, q, best);
        }
    }

    /// `min(k, size)` neighbors sorted by non-decreasing distance; ties
    /// broken by lower id then lower insertion order (spec §4.F).
    pub fn k_nearest(&self, q: Point, k: usize) -> Vec<Neighbor<'_, T>> {
        if k == 0 {
            return Vec::new();
        }
        let mut all = Vec::with_capacity(self.len());
        Self::collect_all(self.root.as_deref(), q, &mut all);
        all.sort_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap()
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });
        all.into_iter()
            .take(k)
            .map(|(id, order, d, point, data)| {
                let _ = order;
                Neighbor {
                    point,
                    object_id: id,
                    data,
                    distance_sq: d,
                }
            })
            .collect()
    }

    #[allow(clippy::type_complexity)]
    fn collect_all<'a>(
        node: Option<&'a Node<T>>,
        q: Point,
        out: &mut Vec<(u64, u64, f64, Point, &'a T)>,
    ) {
        let Some(node) = node else { return };
        out.push((
            node.object_id,
            node.insertion_order,
            q.distance_sq(&node.point),
            node.point,
            &node.data,
        ));
        Self::collect_all(node.left.as_deref(), q, out);
        Self::collect_all(node.right.as_deref(), q, out);
    }

    /// Prunes subtrees whose `bounds` miss `mbr`; reports a node's point
    /// iff `mbr` contains it (spec §4.F).
    pub fn range_query(&self, mbr: &Mbr) -> Vec<Neighbor<'_, T>> {
        let mut out = Vec::new();
        Self::range_rec(self.root.as_deref(), mbr, &mut out);
        out
    }

    fn range_rec<'a>(node: Option<&'a Node<T>>, mbr: &Mbr, out: &mut Vec<Neighbor<'a, T>>) {
        let Some(node) = node else { return };
        if !node.bounds.intersects(mbr) {
            return;
        }
        if mbr.contains_point(&node.point) {
            out.push(Neighbor {
                point: node.point,
                object_id: node.object_id,
                data: &node.data,
                distance_sq: 0.0,
            });
        }
        Self::range_rec(node.left.as_deref(), mbr, out);
        Self::range_rec(node.right.as_deref(), mbr, out);
    }

    /// Range query over `(q ± r)` filtered by the exact squared distance
    /// (spec §4.F).
    pub fn radius_query(&self, q: Point, r: f64) -> Vec<Neighbor<'_, T>> {
        let box_ = Mbr::new(q.x - r, q.y - r, q.x + r, q.y + r);
        let r_sq = r * r;
        self.range_query(&box_)
            .into_iter()
            .filter_map(|mut n| {
                let d = q.distance_sq(&n.point);
                if d <= r_sq {
                    n.distance_sq = d;
                    Some(n)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Emits `node.bounds` as a block whenever `subtree_size` is within
    /// budget or the node is a leaf; otherwise recurses (spec §4.F).
    /// Emission order is the traversal order used here (parent before
    /// children), matching spec §5's determinism guarantee.
    pub fn partition(&self, max_points_per_block: usize) -> Vec<Mbr> {
        let mut out = Vec::new();
        Self::partition_rec(self.root.as_deref(), max_points_per_block, &mut out);
        out
    }

    fn partition_rec(node: Option<&Node<T>>, max_points_per_block: usize, out: &mut Vec<Mbr>) {
        let Some(node) = node else { return };
        let is_leaf = node.left.is_none() && node.right.is_none();
        if node.subtree_size <= max_points_per_block || is_leaf {
            out.push(node.bounds);
            return;
        }
        Self::partition_rec(node.left.as_deref(), max_points_per_block, out);
        Self::partition_rec(node.right.as_deref(), max_points_per_block, out);
    }

    pub fn stats(&self) -> KdTreeStats {
        let size = self.len();
        let depth = Self::depth_rec(self.root.as_deref());
        let optimal = ((size + 1) as f64).log2().ceil() as usize;
        KdTreeStats {
            size,
            depth,
            is_balanced: depth <= 2 * optimal.max(1),
        }
    }

    fn depth_rec(node: Option<&Node<T>>) -> usize {
        match node {
            None => 0,
            Some(n) => {
                1 + Self::depth_rec(n.left.as_deref()).max(Self::depth_rec(n.right.as_deref()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<(Point, u64, ())> {
        coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| (Point::new(x, y), i as u64 + 1, ()))
            .collect()
    }

    #[test]
    fn bulk_load_reports_correct_size_and_bounds() {
        let mut tree = KdTree::new();
        tree.bulk_load(pts(&[(5.0, 5.0), (15.0, 15.0), (25.0, 25.0)]));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.bounds(), Mbr::new(5.0, 5.0, 25.0, 25.0));
    }

    #[test]
    fn nearest_finds_closest_point() {
        let mut tree = KdTree::new();
        tree.bulk_load(pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (10.0, 10.0)]));
        let n = tree.nearest(Point::new(0.9, 0.9)).unwrap();
        assert_eq!(n.object_id, 2);
    }

    #[test]
    fn k_nearest_orders_by_distance() {
        let mut tree = KdTree::new();
        tree.bulk_load(pts(&[
            (0.0, 0.0),
            (1.0, 1.0),
            (2.0, 2.0),
            (10.0, 10.0),
            (20.0, 20.0),
        ]));
        let result = tree.k_nearest(Point::new(0.5, 0.5), 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].object_id, 1);
        assert_eq!(result[1].object_id, 2);
    }

    #[test]
    fn k_nearest_caps_at_size() {
        let mut tree = KdTree::new();
        tree.bulk_load(pts(&[(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(tree.k_nearest(Point::new(0.0, 0.0), 5).len(), 2);
    }

    #[test]
    fn range_query_respects_mbr() {
        let mut tree = KdTree::new();
        tree.bulk_load(pts(&[(5.0, 5.0), (15.0, 15.0), (25.0, 25.0)]));
        let hits: Vec<u64> = tree
            .range_query(&Mbr::new(0.0, 0.0, 20.0, 20.0))
            .into_iter()
            .map(|n| n.object_id)
            .collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&1));
        assert!(hits.contains(&2));
    }

    #[test]
    fn insert_grows_without_rebuild() {
        let mut tree: KdTree<()> = KdTree::new();
        tree.insert(Point::new(0.0, 0.0), 1, ());
        tree.insert(Point::new(5.0, 5.0), 2, ());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.bounds(), Mbr::new(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn partition_tiles_leaf_extents() {
        let mut tree = KdTree::new();
        let many: Vec<_> = (0..20)
            .map(|i| (Point::new(i as f64, i as f64), i as u64 + 1, ()))
            .collect();
        tree.bulk_load(many);
        let blocks = tree.partition(4);
        assert!(!blocks.is_empty());
        let mut union = Mbr::empty();
        for b in &blocks {
            union.expand_mbr(b);
        }
        assert_eq!(union, tree.bounds());
    }
}
