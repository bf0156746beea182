// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batched damage structures returned by [`Index::commit`](crate::Index::commit).

use alloc::vec::Vec;

use crate::types::{Aabb3D, union_aabb};

/// Batched damage summary returned by [`Index::commit`](crate::Index::commit).
#[derive(Clone, Debug)]
pub struct Damage<T, P> {
    /// Newly added entries since last commit.
    pub added: Vec<(P, Aabb3D<T>)>,
    /// Removed entries since last commit.
    pub removed: Vec<(P, Aabb3D<T>)>,
    /// Moved entries since last commit: (payload, old, new).
    pub moved: Vec<(P, Aabb3D<T>, Aabb3D<T>)>,
}

impl<T, P> Default for Damage<T, P> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            moved: Vec::new(),
        }
    }
}

impl<T: Copy + PartialOrd, P: Copy> Damage<T, P> {
    /// True if no damage entries recorded.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    /// Payloads of every entry touched by this commit, in report order.
    pub fn payloads(&self) -> impl Iterator<Item = P> + '_ {
        self.added
            .iter()
            .map(|(p, _)| *p)
            .chain(self.removed.iter().map(|(p, _)| *p))
            .chain(self.moved.iter().map(|(p, _, _)| *p))
    }

    /// Union of all AABBs affected. Returns `None` if empty.
    pub fn union(&self) -> Option<Aabb3D<T>> {
        let mut it = self
            .added
            .iter()
            .map(|(_, a)| *a)
            .chain(self.removed.iter().map(|(_, a)| *a))
            .chain(self.moved.iter().flat_map(|(_, a, b)| [*a, *b]));
        let first = it.next()?;
        Some(it.fold(first, union_aabb))
    }
}
