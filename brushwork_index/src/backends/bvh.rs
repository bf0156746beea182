// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dynamic bounding volume hierarchy backend generic over scalar `T: Scalar`.
//!
//! Every slot remembers the leaf that holds it, so removal walks up from that
//! leaf instead of searching from the root. A slot whose new box still fits in
//! its leaf is updated in place; brushes nudged by a few units never leave
//! their leaf. Nodes freed by collapses are recycled.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::{Aabb3D, Scalar, half_area, union_aabb};

/// A dynamic BVH with cost-guided insertion and median leaf splits.
pub struct BVH<T: Scalar, P: Copy + Debug> {
    max_leaf: usize,
    root: Option<usize>,
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    entries: Vec<Option<Entry<T>>>,
    _p: core::marker::PhantomData<P>,
}

#[derive(Copy, Clone, Debug)]
struct Entry<T> {
    bbox: Aabb3D<T>,
    leaf: usize,
}

#[derive(Debug)]
enum Kind {
    Leaf(Vec<usize>),
    Internal([usize; 2]),
    Free,
}

#[derive(Debug)]
struct Node<T> {
    bbox: Aabb3D<T>,
    parent: Option<usize>,
    kind: Kind,
}

impl<T: Scalar, P: Copy + Debug> Default for BVH<T, P> {
    fn default() -> Self {
        Self {
            max_leaf: 8,
            root: None,
            nodes: Vec::new(),
            free: Vec::new(),
            entries: Vec::new(),
            _p: core::marker::PhantomData,
        }
    }
}

fn centroid<T: Scalar>(b: &Aabb3D<T>, axis: usize) -> T {
    match axis {
        0 => T::mid(b.min_x, b.max_x),
        1 => T::mid(b.min_y, b.max_y),
        _ => T::mid(b.min_z, b.max_z),
    }
}

impl<T: Scalar, P: Copy + Debug> BVH<T, P> {
    fn alloc(&mut self, node: Node<T>) -> usize {
        if let Some(i) = self.free.pop() {
            self.nodes[i] = node;
            i
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, i: usize) {
        self.nodes[i].kind = Kind::Free;
        self.nodes[i].parent = None;
        self.free.push(i);
    }

    fn entry_box(&self, slot: usize) -> Option<Aabb3D<T>> {
        self.entries.get(slot).and_then(|e| e.map(|e| e.bbox))
    }

    fn leaf_bounds(&self, items: &[usize]) -> Option<Aabb3D<T>> {
        items
            .iter()
            .filter_map(|&s| self.entry_box(s))
            .reduce(union_aabb)
    }

    /// Recompute bounds from `start` up to the root, stopping once a node's
    /// box no longer changes.
    fn refit(&mut self, start: Option<usize>) {
        let mut cur = start;
        while let Some(i) = cur {
            let bbox = match &self.nodes[i].kind {
                Kind::Leaf(items) => self.leaf_bounds(items),
                Kind::Internal([l, r]) => Some(union_aabb(self.nodes[*l].bbox, self.nodes[*r].bbox)),
                Kind::Free => None,
            };
            let Some(bbox) = bbox else {
                return;
            };
            if self.nodes[i].bbox == bbox {
                return;
            }
            self.nodes[i].bbox = bbox;
            cur = self.nodes[i].parent;
        }
    }

    /// Descend from the root towards the child whose bounds grow least.
    fn choose_leaf(&self, root: usize, bbox: &Aabb3D<T>) -> usize {
        let mut i = root;
        while let Kind::Internal([l, r]) = self.nodes[i].kind {
            let grow = |c: usize| {
                let cb = self.nodes[c].bbox;
                half_area(&union_aabb(cb, *bbox)) - half_area(&cb)
            };
            i = if grow(l) <= grow(r) { l } else { r };
        }
        i
    }

    /// Turn an overfull leaf into an internal node over two halves, cut at
    /// the median centroid along the axis where centroids spread most.
    fn split_leaf(&mut self, i: usize) {
        let Kind::Leaf(mut items) = core::mem::replace(&mut self.nodes[i].kind, Kind::Free) else {
            return;
        };
        let axis = (0..3)
            .map(|axis| {
                let mut lo = None::<T>;
                let mut hi = None::<T>;
                for b in items.iter().filter_map(|&s| self.entry_box(s)) {
                    let c = centroid(&b, axis);
                    if lo.is_none_or(|v| c < v) {
                        lo = Some(c);
                    }
                    if hi.is_none_or(|v| c > v) {
                        hi = Some(c);
                    }
                }
                let spread = match (lo, hi) {
                    (Some(lo), Some(hi)) => T::widen(T::sub(hi, lo)),
                    _ => T::widen(T::zero()),
                };
                (axis, spread)
            })
            .reduce(|a, b| if b.1 > a.1 { b } else { a })
            .map_or(0, |(axis, _)| axis);

        let mid = items.len() / 2;
        let entries = &self.entries;
        let key = |s: &usize| entries[*s].map(|e| centroid(&e.bbox, axis));
        items.select_nth_unstable_by(mid, |a, b| {
            key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal)
        });
        let right_items = items.split_off(mid);
        let left_items = items;

        let mut children = [0; 2];
        for (child, part) in children.iter_mut().zip([left_items, right_items]) {
            let bbox = self.leaf_bounds(&part).unwrap_or(self.nodes[i].bbox);
            let slots = part.clone();
            let c = self.alloc(Node {
                bbox,
                parent: Some(i),
                kind: Kind::Leaf(part),
            });
            for s in slots {
                if let Some(Some(e)) = self.entries.get_mut(s) {
                    e.leaf = c;
                }
            }
            *child = c;
        }
        self.nodes[i].kind = Kind::Internal(children);
    }

    /// Drop `leaf` after its last slot left, hoisting its sibling into the
    /// parent's place.
    fn collapse(&mut self, leaf: usize) {
        let Some(parent) = self.nodes[leaf].parent else {
            self.release(leaf);
            self.root = None;
            return;
        };
        let Kind::Internal([l, r]) = self.nodes[parent].kind else {
            return;
        };
        let sibling = if l == leaf { r } else { l };
        let grand = self.nodes[parent].parent;
        self.nodes[sibling].parent = grand;
        match grand {
            None => self.root = Some(sibling),
            Some(g) => {
                if let Kind::Internal(children) = &mut self.nodes[g].kind {
                    for c in children.iter_mut().filter(|c| **c == parent) {
                        *c = sibling;
                    }
                }
            }
        }
        self.release(leaf);
        self.release(parent);
        self.refit(grand);
    }

    fn collect_hits(&self, probe: &Aabb3D<T>) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.bbox.overlaps(probe) {
                continue;
            }
            match &node.kind {
                Kind::Leaf(items) => out.extend(
                    items
                        .iter()
                        .copied()
                        .filter(|&s| self.entry_box(s).is_some_and(|b| b.overlaps(probe))),
                ),
                Kind::Internal(children) => stack.extend_from_slice(children),
                Kind::Free => {}
            }
        }
        out
    }
}

impl<T: Scalar, P: Copy + Debug> Backend<T, P> for BVH<T, P> {
    fn insert(&mut self, slot: usize, aabb: Aabb3D<T>) {
        if self.entry_box(slot).is_some() {
            self.remove(slot);
        }
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        let Some(root) = self.root else {
            let leaf = self.alloc(Node {
                bbox: aabb,
                parent: None,
                kind: Kind::Leaf(vec![slot]),
            });
            self.entries[slot] = Some(Entry { bbox: aabb, leaf });
            self.root = Some(leaf);
            return;
        };
        let leaf = self.choose_leaf(root, &aabb);
        self.entries[slot] = Some(Entry { bbox: aabb, leaf });
        let full = match &mut self.nodes[leaf].kind {
            Kind::Leaf(items) => {
                items.push(slot);
                items.len() > self.max_leaf
            }
            _ => false,
        };
        let mut cur = Some(leaf);
        while let Some(i) = cur {
            self.nodes[i].bbox = union_aabb(self.nodes[i].bbox, aabb);
            cur = self.nodes[i].parent;
        }
        if full {
            self.split_leaf(leaf);
        }
    }

    fn update(&mut self, slot: usize, aabb: Aabb3D<T>) {
        let Some(Some(entry)) = self.entries.get(slot).copied() else {
            return;
        };
        if self.nodes[entry.leaf].bbox.contains(&aabb) {
            self.entries[slot] = Some(Entry { bbox: aabb, ..entry });
            self.refit(Some(entry.leaf));
        } else {
            self.remove(slot);
            self.insert(slot, aabb);
        }
    }

    fn remove(&mut self, slot: usize) {
        let Some(entry) = self.entries.get_mut(slot).and_then(Option::take) else {
            return;
        };
        let now_empty = match &mut self.nodes[entry.leaf].kind {
            Kind::Leaf(items) => {
                items.retain(|&s| s != slot);
                items.is_empty()
            }
            _ => false,
        };
        if now_empty {
            self.collapse(entry.leaf);
        } else {
            self.refit(Some(entry.leaf));
        }
    }

    fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.free.clear();
        self.entries.clear();
    }

    fn query_point<'a>(&'a self, x: T, y: T, z: T) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.collect_hits(&Aabb3D::from_point(x, y, z)).into_iter())
    }

    fn query_box<'a>(&'a self, aabb: Aabb3D<T>) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.collect_hits(&aabb).into_iter())
    }
}

impl<T: Scalar, P: Copy + Debug> Debug for BVH<T, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BVH")
            .field("max_leaf", &self.max_leaf)
            .field("nodes", &(self.nodes.len() - self.free.len()))
            .field("free_nodes", &self.free.len())
            .field("alive", &self.entries.iter().flatten().count())
            .finish_non_exhaustive()
    }
}

/// BVH with f32 coordinates and f64 metrics.
pub type BVHF32<P> = BVH<f32, P>;

/// BVH with f64 coordinates and f64 metrics.
pub type BVHF64<P> = BVH<f64, P>;

/// BVH with i64 coordinates and i128 metrics.
pub type BVHI64<P> = BVH<i64, P>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    fn cube(x: f64, y: f64, z: f64, s: f64) -> Aabb3D<f64> {
        Aabb3D::new(x, y, z, x + s, y + s, z + s)
    }

    /// Every live slot sits in the leaf it records, and every node's box
    /// encloses what lies below it.
    fn assert_well_formed<T: Scalar>(b: &BVH<T, u8>) {
        for (slot, e) in b.entries.iter().enumerate() {
            let Some(e) = e else { continue };
            match &b.nodes[e.leaf].kind {
                Kind::Leaf(items) => assert!(items.contains(&slot), "slot {slot} not in its leaf"),
                _ => panic!("slot {slot} points at a non-leaf"),
            }
            assert!(b.nodes[e.leaf].bbox.contains(&e.bbox));
        }
        for (i, n) in b.nodes.iter().enumerate() {
            if let Kind::Internal(children) = n.kind {
                for c in children {
                    assert_eq!(b.nodes[c].parent, Some(i));
                    assert!(n.bbox.contains(&b.nodes[c].bbox));
                }
            }
        }
    }

    #[test]
    fn touching_brushes_are_reported() {
        let mut idx = Index::<f64, u32>::with_bvh();
        let _ = idx.insert(cube(0.0, 0.0, 0.0, 1.0), 1);
        let _ = idx.insert(cube(1.0, 0.0, 0.0, 1.0), 2);
        let _ = idx.insert(cube(3.0, 0.0, 0.0, 1.0), 3);
        let _ = idx.commit();
        let mut hits: Vec<_> = idx
            .query_box(cube(0.0, 0.0, 0.0, 1.0))
            .map(|(_, p)| p)
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
        assert_eq!(idx.query_point(1.0, 0.5, 0.5).count(), 2);
    }

    #[test]
    fn nudge_inside_leaf_keeps_structure() {
        let mut b: BVH<f64, u8> = BVH::default();
        for i in 0..20 {
            b.insert(i, cube(i as f64 * 2.0, 0.0, 0.0, 1.0));
        }
        let nodes_before = b.nodes.len();
        let leaf_before = b.entries[10].map(|e| e.leaf);

        // Shrinking a brush never leaves its leaf.
        b.update(10, cube(20.25, 0.25, 0.25, 0.5));
        assert_eq!(b.nodes.len(), nodes_before);
        assert_eq!(b.entries[10].map(|e| e.leaf), leaf_before);
        assert_eq!(b.query_point(20.1, 0.1, 0.1).count(), 0);
        assert_eq!(b.query_point(20.5, 0.5, 0.5).collect::<Vec<_>>(), vec![10]);
        assert_well_formed(&b);
    }

    #[test]
    fn churn_recycles_nodes() {
        let mut b: BVH<i64, u8> = BVH::default();
        for i in 0..24 {
            b.insert(i, Aabb3D::new(i as i64 * 12, 0, 0, i as i64 * 12 + 10, 10, 10));
        }
        let baseline = b.nodes.len();
        for _ in 0..50 {
            b.update(3, Aabb3D::new(5000, 5000, 5000, 5010, 5010, 5010));
            b.update(3, Aabb3D::new(36, 0, 0, 46, 10, 10));
        }
        assert_eq!(b.query_point(40, 5, 5).collect::<Vec<_>>(), vec![3]);
        assert_eq!(b.query_point(5005, 5005, 5005).count(), 0);
        assert!(b.nodes.len() <= baseline + 4, "node storage grew under churn");
        assert_well_formed(&b);
    }

    #[test]
    fn emptied_tree_is_reused() {
        let mut b: BVH<f64, u8> = BVH::default();
        for i in 0..30 {
            b.insert(i, cube(0.0, 0.0, i as f64 * 3.0, 2.0));
        }
        let high_water = b.nodes.len();
        for i in 0..30 {
            b.remove(i);
            assert_well_formed(&b);
        }
        assert!(b.root.is_none());
        assert_eq!(b.query_box(cube(-100.0, -100.0, -100.0, 500.0)).count(), 0);

        for i in 0..30 {
            b.insert(i, cube(i as f64 * 3.0, 0.0, 0.0, 2.0));
        }
        assert_eq!(b.nodes.len(), high_water);
        assert_well_formed(&b);
    }

    #[test]
    fn split_keeps_every_brush_reachable() {
        let mut b: BVH<f64, u8> = BVH::default();
        let mut current = Vec::new();
        for i in 0..40 {
            let a = cube(0.0, 0.0, i as f64 * 20.0, 10.0);
            current.push(a);
            b.insert(i, a);
        }
        assert!(matches!(b.root.map(|r| &b.nodes[r].kind), Some(Kind::Internal(_))));

        for &i in &[0_usize, 7, 19, 33] {
            let moved = cube(1000.0 + i as f64 * 15.0, 1000.0, 1000.0, 10.0);
            b.update(i, moved);
            current[i] = moved;
        }
        assert_well_formed(&b);
        for (i, bb) in current.iter().enumerate() {
            let hits: Vec<_> = b
                .query_point(
                    (bb.min_x + bb.max_x) * 0.5,
                    (bb.min_y + bb.max_y) * 0.5,
                    (bb.min_z + bb.max_z) * 0.5,
                )
                .collect();
            assert_eq!(hits, vec![i]);
        }
    }
}
