// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Uniform grid backend. Cell-based spatial indexing for f64 coordinates.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::Aabb3D;

type CellKey = (i64, i64, i64);

/// Uniform cubic grid backend.
///
/// Maps AABBs to the cells they cover and aggregates candidates per query.
/// Negative coordinates are supported through the origin offset and floor division.
/// Choose the cell size so that most boxes cover only a handful of cells.
pub struct GridF64<P: Copy + Debug> {
    cell: f64,
    origin: [f64; 3],
    entries: Vec<Option<Aabb3D<f64>>>,
    cells: BTreeMap<CellKey, Vec<usize>>,
    _p: core::marker::PhantomData<P>,
}

impl<P: Copy + Debug> GridF64<P> {
    /// Create a grid backend with the given cell edge length and origin offset.
    pub fn new(cell: f64, origin: [f64; 3]) -> Self {
        debug_assert!(cell > 0.0, "cell size must be positive");
        Self {
            cell,
            origin,
            entries: Vec::new(),
            cells: BTreeMap::new(),
            _p: core::marker::PhantomData,
        }
    }

    #[inline]
    fn floor_to_i64(v: f64) -> i64 {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Cell coordinates saturate for out-of-range inputs."
        )]
        let i = v as i64;
        if (i as f64) > v { i - 1 } else { i }
    }

    fn key_for(&self, x: f64, y: f64, z: f64) -> CellKey {
        (
            Self::floor_to_i64((x - self.origin[0]) / self.cell),
            Self::floor_to_i64((y - self.origin[1]) / self.cell),
            Self::floor_to_i64((z - self.origin[2]) / self.cell),
        )
    }

    fn cells_for_aabb(&self, a: &Aabb3D<f64>) -> impl Iterator<Item = CellKey> {
        let (x0, y0, z0) = self.key_for(a.min_x, a.min_y, a.min_z);
        let (x1, y1, z1) = self.key_for(a.max_x, a.max_y, a.max_z);
        (z0..=z1).flat_map(move |z| {
            (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (x, y, z)))
        })
    }

    fn add_to_cells(&mut self, slot: usize, aabb: &Aabb3D<f64>) {
        let keys: Vec<_> = self.cells_for_aabb(aabb).collect();
        for key in keys {
            self.cells.entry(key).or_default().push(slot);
        }
    }

    fn remove_from_cells(&mut self, slot: usize) {
        let Some(Some(old)) = self.entries.get(slot).copied() else {
            return;
        };
        let keys: Vec<_> = self.cells_for_aabb(&old).collect();
        for key in keys {
            if let Some(slots) = self.cells.get_mut(&key) {
                slots.retain(|&s| s != slot);
                if slots.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
    }

    fn gather(
        &self,
        keys: impl Iterator<Item = CellKey>,
        hit: impl Fn(&Aabb3D<f64>) -> bool,
    ) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        for key in keys {
            let Some(slots) = self.cells.get(&key) else {
                continue;
            };
            for &s in slots {
                if let Some(Some(a)) = self.entries.get(s)
                    && hit(a)
                {
                    set.insert(s);
                }
            }
        }
        set
    }
}

impl<P: Copy + Debug> Backend<f64, P> for GridF64<P> {
    fn insert(&mut self, slot: usize, aabb: Aabb3D<f64>) {
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        self.remove_from_cells(slot);
        self.entries[slot] = Some(aabb);
        self.add_to_cells(slot, &aabb);
    }
    fn update(&mut self, slot: usize, aabb: Aabb3D<f64>) {
        if slot >= self.entries.len() {
            return;
        }
        self.remove_from_cells(slot);
        self.entries[slot] = Some(aabb);
        self.add_to_cells(slot, &aabb);
    }
    fn remove(&mut self, slot: usize) {
        self.remove_from_cells(slot);
        if let Some(e) = self.entries.get_mut(slot) {
            *e = None;
        }
    }
    fn clear(&mut self) {
        self.entries.clear();
        self.cells.clear();
    }
    fn query_point<'a>(&'a self, x: f64, y: f64, z: f64) -> Box<dyn Iterator<Item = usize> + 'a> {
        let key = self.key_for(x, y, z);
        let set = self.gather(core::iter::once(key), |a| a.contains_point(x, y, z));
        Box::new(set.into_iter())
    }
    fn query_box<'a>(&'a self, aabb: Aabb3D<f64>) -> Box<dyn Iterator<Item = usize> + 'a> {
        let set = self.gather(self.cells_for_aabb(&aabb), |a| a.overlaps(&aabb));
        Box::new(set.into_iter())
    }
}

impl<P: Copy + Debug> Debug for GridF64<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.entries.len();
        let alive = self.entries.iter().filter(|e| e.is_some()).count();
        f.debug_struct("GridF64")
            .field("cell", &self.cell)
            .field("origin", &self.origin)
            .field("total_slots", &total)
            .field("alive", &alive)
            .field("cells", &self.cells.len())
            .finish_non_exhaustive()
    }
}
