// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linear-scan backend over a dense list. Fine for a handful of brushes.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::Aabb3D;

/// Linear-scan backend.
///
/// Live boxes are kept packed so scans never step over removed slots.
pub struct FlatVec<T: Copy + PartialOrd + Debug, P: Copy + Debug> {
    dense: Vec<(usize, Aabb3D<T>)>,
    /// Position of each slot in `dense`.
    at: Vec<Option<usize>>,
    _p: core::marker::PhantomData<P>,
}

impl<T: Copy + PartialOrd + Debug, P: Copy + Debug> Default for FlatVec<T, P> {
    fn default() -> Self {
        Self {
            dense: Vec::new(),
            at: Vec::new(),
            _p: core::marker::PhantomData,
        }
    }
}

impl<T: Copy + PartialOrd + Debug, P: Copy + Debug> Debug for FlatVec<T, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlatVec")
            .field("alive", &self.dense.len())
            .finish_non_exhaustive()
    }
}

impl<T: Copy + PartialOrd + Debug, P: Copy + Debug> Backend<T, P> for FlatVec<T, P> {
    fn insert(&mut self, slot: usize, aabb: Aabb3D<T>) {
        if self.at.len() <= slot {
            self.at.resize(slot + 1, None);
        }
        match self.at[slot] {
            Some(pos) => self.dense[pos].1 = aabb,
            None => {
                self.at[slot] = Some(self.dense.len());
                self.dense.push((slot, aabb));
            }
        }
    }

    fn update(&mut self, slot: usize, aabb: Aabb3D<T>) {
        if let Some(Some(pos)) = self.at.get(slot) {
            self.dense[*pos].1 = aabb;
        }
    }

    fn remove(&mut self, slot: usize) {
        let Some(pos) = self.at.get_mut(slot).and_then(Option::take) else {
            return;
        };
        self.dense.swap_remove(pos);
        if let Some(&(moved, _)) = self.dense.get(pos) {
            self.at[moved] = Some(pos);
        }
    }

    fn clear(&mut self) {
        self.dense.clear();
        self.at.clear();
    }

    fn query_point<'a>(&'a self, x: T, y: T, z: T) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(
            self.dense
                .iter()
                .filter(move |(_, b)| b.contains_point(x, y, z))
                .map(|(s, _)| *s),
        )
    }

    fn query_box<'a>(&'a self, aabb: Aabb3D<T>) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(
            self.dense
                .iter()
                .filter(move |(_, b)| b.overlaps(&aabb))
                .map(|(s, _)| *s),
        )
    }
}
