// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public `Index` API and generic implementation over a pluggable backend.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::damage::Damage;
use crate::types::Aabb3D;

/// Generational handle for entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(u32, u32);

impl Key {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Index keys are intentionally 32-bit; higher bits are truncated by design."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }

    const fn generation(self) -> u32 {
        self.1
    }
}

#[derive(Clone, Debug)]
struct Entry<T, P> {
    generation: u32,
    payload: P,
    /// The box as last set.
    aabb: Aabb3D<T>,
    /// The box the backend holds, `None` until the first commit.
    committed: Option<Aabb3D<T>>,
    removed: bool,
    staged: bool,
}

#[derive(Clone, Debug)]
enum Slot<T, P> {
    Vacant { generation: u32 },
    Occupied(Entry<T, P>),
}

/// A generic AABB index parameterized by a spatial backend.
///
/// Mutations are staged; the backend only sees them after [`commit`](Self::commit).
/// Queries therefore reflect the last committed state, while [`get`](Self::get)
/// returns the staged one.
#[derive(Debug)]
pub struct IndexGeneric<T: Copy + PartialOrd + Debug, P: Copy + Debug, B: Backend<T, P>> {
    slots: Vec<Slot<T, P>>,
    vacant: Vec<usize>,
    /// Slots touched since the last commit.
    staged: Vec<usize>,
    live: usize,
    backend: B,
}

impl<T, P, B> IndexGeneric<T, P, B>
where
    T: Copy + PartialOrd + Debug,
    P: Copy + Debug,
    B: Backend<T, P> + Default,
{
    /// Create an empty index using the backend's default constructor.
    pub fn new() -> Self {
        Self::with_backend(B::default())
    }
}

impl<T, P, B> IndexGeneric<T, P, B>
where
    T: Copy + PartialOrd + Debug,
    P: Copy + Debug,
    B: Backend<T, P>,
{
    /// Create an empty index around an explicitly configured backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            staged: Vec::new(),
            live: 0,
            backend,
        }
    }

    /// Reserve space for at least `n` more entries.
    pub fn reserve(&mut self, n: usize) {
        self.slots.reserve(n.saturating_sub(self.vacant.len()));
    }

    /// Number of entries, counting staged inserts and not counting staged removals.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if the index holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// True if there are staged changes that [`commit`](Self::commit) has not applied yet.
    pub fn has_pending(&self) -> bool {
        !self.staged.is_empty()
    }

    fn stage(&mut self, idx: usize) {
        if let Some(Slot::Occupied(e)) = self.slots.get_mut(idx)
            && !e.staged
        {
            e.staged = true;
            self.staged.push(idx);
        }
    }

    /// Insert a new AABB with payload. Returns a stable handle `Key`.
    pub fn insert(&mut self, aabb: Aabb3D<T>, payload: P) -> Key {
        let (idx, generation) = match self.vacant.pop() {
            Some(idx) => {
                let previous = match self.slots[idx] {
                    Slot::Vacant { generation } => generation,
                    Slot::Occupied(ref e) => e.generation,
                };
                (idx, previous.wrapping_add(1))
            }
            None => {
                self.slots.push(Slot::Vacant { generation: 0 });
                (self.slots.len() - 1, 1)
            }
        };
        self.slots[idx] = Slot::Occupied(Entry {
            generation,
            payload,
            aabb,
            committed: None,
            removed: false,
            staged: false,
        });
        self.stage(idx);
        self.live += 1;
        Key::new(idx, generation)
    }

    /// Update an existing AABB.
    pub fn update(&mut self, key: Key, aabb: Aabb3D<T>) {
        let Some(e) = self.entry_mut(key) else {
            return;
        };
        e.aabb = aabb;
        self.stage(key.idx());
    }

    /// Remove an existing AABB.
    pub fn remove(&mut self, key: Key) {
        let Some(e) = self.entry_mut(key) else {
            return;
        };
        let committed = e.committed.is_some();
        e.removed = committed;
        self.live -= 1;
        if committed {
            self.stage(key.idx());
            return;
        }
        // Never reached the backend: drop it on the spot.
        let idx = key.idx();
        self.slots[idx] = Slot::Vacant {
            generation: key.generation(),
        };
        self.vacant.push(idx);
        self.staged.retain(|&i| i != idx);
    }

    /// Current (possibly uncommitted) AABB and payload for a key.
    pub fn get(&self, key: Key) -> Option<(Aabb3D<T>, P)> {
        match self.slots.get(key.idx())? {
            Slot::Occupied(e) if e.generation == key.generation() && !e.removed => {
                Some((e.aabb, e.payload))
            }
            _ => None,
        }
    }

    /// Clear the index (without reporting damage).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.staged.clear();
        self.live = 0;
        self.backend.clear();
    }

    /// Apply pending changes and compute batched damage. Also synchronizes backend state.
    ///
    /// Damage is reported in slot order. A box moved away and back within one
    /// batch is not reported.
    pub fn commit(&mut self) -> Damage<T, P> {
        let mut dmg = Damage::default();
        let mut staged = core::mem::take(&mut self.staged);
        staged.sort_unstable();
        for &idx in &staged {
            let Slot::Occupied(e) = &mut self.slots[idx] else {
                continue;
            };
            e.staged = false;
            if e.removed {
                self.backend.remove(idx);
                dmg.removed.push((e.payload, e.committed.unwrap_or(e.aabb)));
                let generation = e.generation;
                self.slots[idx] = Slot::Vacant { generation };
                self.vacant.push(idx);
                continue;
            }
            match e.committed.replace(e.aabb) {
                None => {
                    self.backend.insert(idx, e.aabb);
                    dmg.added.push((e.payload, e.aabb));
                }
                Some(prev) if prev != e.aabb => {
                    self.backend.update(idx, e.aabb);
                    dmg.moved.push((e.payload, prev, e.aabb));
                }
                Some(_) => {}
            }
        }
        staged.clear();
        self.staged = staged;
        dmg
    }

    /// Query for entries whose AABB contains the point.
    pub fn query_point(&self, x: T, y: T, z: T) -> impl Iterator<Item = (Key, P)> + '_ {
        self.resolve(self.backend.query_point(x, y, z))
    }

    /// Query for entries whose AABB intersects the given box.
    pub fn query_box(&self, aabb: Aabb3D<T>) -> impl Iterator<Item = (Key, P)> + '_ {
        self.resolve(self.backend.query_box(aabb))
    }

    fn resolve<'a>(
        &'a self,
        slots: impl Iterator<Item = usize> + 'a,
    ) -> impl Iterator<Item = (Key, P)> + 'a {
        slots.filter_map(move |i| match self.slots.get(i) {
            Some(Slot::Occupied(e)) => Some((Key::new(i, e.generation), e.payload)),
            _ => None,
        })
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry<T, P>> {
        match self.slots.get_mut(key.idx())? {
            Slot::Occupied(e) if e.generation == key.generation() && !e.removed => Some(e),
            _ => None,
        }
    }
}

/// Default index using a flat vector backend.
pub type Index<T, P> = IndexGeneric<T, P, crate::backends::flatvec::FlatVec<T, P>>;

impl<T: Copy + PartialOrd + Debug, P: Copy + Debug> Default for Index<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Copy + Debug> Index<f64, P> {
    /// Create a grid-backed index with the given cubic cell size, origin at zero.
    pub fn with_uniform_grid(cell: f64) -> IndexGeneric<f64, P, crate::backends::grid::GridF64<P>> {
        IndexGeneric::with_backend(crate::backends::grid::GridF64::new(cell, [0.0; 3]))
    }

    /// Create a grid-backed index with explicit origin offset.
    pub fn with_uniform_grid_with_origin(
        cell: f64,
        origin: [f64; 3],
    ) -> IndexGeneric<f64, P, crate::backends::grid::GridF64<P>> {
        IndexGeneric::with_backend(crate::backends::grid::GridF64::new(cell, origin))
    }

    /// Create a BVH-backed index, the usual choice for brush bounds.
    pub fn with_bvh() -> IndexGeneric<f64, P, crate::backends::bvh::BVHF64<P>> {
        IndexGeneric::with_backend(crate::backends::bvh::BVHF64::default())
    }
}

impl<P: Copy + Debug> Index<f32, P> {
    /// Create a BVH-backed index (f32 coordinates).
    pub fn with_bvh() -> IndexGeneric<f32, P, crate::backends::bvh::BVHF32<P>> {
        IndexGeneric::with_backend(crate::backends::bvh::BVHF32::default())
    }
}
