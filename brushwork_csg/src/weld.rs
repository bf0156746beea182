// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vertex welding.

use glam::DVec3;
use hashbrown::HashMap;
use smallvec::SmallVec;

type Cell = (i64, i64, i64);

/// A vertex table that snaps near-duplicate positions to one canonical vertex.
///
/// Space is split into cubic cells of twice the tolerance, so every vertex within
/// tolerance of a query lies in the query's cell or one of its 26 neighbours.
/// Inserting a point closer than the tolerance to an existing vertex returns the
/// existing index and leaves the stored position untouched, so every consumer of
/// the table sees bit-identical coordinates.
#[derive(Clone, Debug)]
pub struct HashedVertices {
    vertices: Vec<DVec3>,
    cells: HashMap<Cell, SmallVec<[u32; 4]>>,
    cell_size: f64,
    tolerance: f64,
}

impl HashedVertices {
    /// Create an empty table.
    pub fn new(tolerance: f64) -> Self {
        Self::with_capacity(tolerance, 0)
    }

    /// Create an empty table with room for `capacity` vertices.
    pub fn with_capacity(tolerance: f64, capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
            cells: HashMap::with_capacity(capacity),
            cell_size: tolerance * 2.0,
            tolerance,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "cell coordinates of finite scene positions fit in i64"
    )]
    fn cell_of(&self, p: DVec3) -> Cell {
        let c = (p / self.cell_size).floor();
        (c.x as i64, c.y as i64, c.z as i64)
    }

    /// The index of the closest vertex within tolerance of `p`.
    pub fn find(&self, p: DVec3) -> Option<u32> {
        let (cx, cy, cz) = self.cell_of(p);
        let limit = self.tolerance * self.tolerance;
        let mut best: Option<(f64, u32)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(ids) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &i in ids {
                        let d = self.vertices[i as usize].distance_squared(p);
                        if d <= limit && best.is_none_or(|(bd, _)| d < bd) {
                            best = Some((d, i));
                        }
                    }
                }
            }
        }
        best.map(|(_, i)| i)
    }

    /// Insert `p`, or return the index of the vertex it snaps to.
    pub fn insert(&mut self, p: DVec3) -> u32 {
        debug_assert!(p.is_finite(), "welding a non-finite vertex");
        if let Some(i) = self.find(p) {
            return i;
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "per-cycle vertex tables stay far below u32::MAX"
        )]
        let i = self.vertices.len() as u32;
        self.vertices.push(p);
        let cell = self.cell_of(p);
        self.cells.entry(cell).or_default().push(i);
        i
    }

    /// Insert `p` and return the canonical position.
    pub fn snap(&mut self, p: DVec3) -> DVec3 {
        let i = self.insert(p);
        self.vertices[i as usize]
    }

    /// Position of vertex `i`.
    pub fn get(&self, i: u32) -> DVec3 {
        self.vertices[i as usize]
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Number of distinct vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// True if no vertex was inserted.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Remove every vertex, keeping the allocations.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_duplicates_share_an_index() {
        let mut w = HashedVertices::new(1e-6);
        let a = w.insert(DVec3::new(1.0, 2.0, 3.0));
        let b = w.insert(DVec3::new(1.0 + 1e-7, 2.0, 3.0));
        let c = w.insert(DVec3::new(2.0, 2.0, 3.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(w.len(), 2);
        assert_eq!(w.get(b), DVec3::new(1.0, 2.0, 3.0), "first position wins");
    }

    #[test]
    fn welds_across_cell_boundaries() {
        let mut w = HashedVertices::new(0.1);
        let a = w.insert(DVec3::new(0.199, 0.0, 0.0));
        let b = w.insert(DVec3::new(0.201, 0.0, 0.0));
        assert_eq!(a, b);
        let c = w.insert(DVec3::new(-0.0001, -0.0001, 0.0));
        let d = w.insert(DVec3::new(0.0001, 0.0001, 0.0));
        assert_eq!(c, d);
    }

    #[test]
    fn picks_the_closest_candidate() {
        let mut w = HashedVertices::new(1.0);
        let far = w.insert(DVec3::ZERO);
        // Outside tolerance of the first vertex, so stored separately.
        let near = {
            w.vertices.push(DVec3::new(1.5, 0.0, 0.0));
            let cell = w.cell_of(DVec3::new(1.5, 0.0, 0.0));
            w.cells.entry(cell).or_default().push(1);
            1
        };
        assert_eq!(w.find(DVec3::new(0.9, 0.0, 0.0)), Some(near));
        assert_eq!(w.find(DVec3::new(0.4, 0.0, 0.0)), Some(far));
    }
}
