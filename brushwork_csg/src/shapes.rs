// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shape registry.

use std::sync::Arc;

use brushwork_tree::{ShapeId, ShapeRef};

use crate::brush_mesh::BrushMesh;
use crate::error::ShapeError;

/// Owns brush shapes, keyed by [`ShapeId`].
///
/// A shape that failed validation is kept as "no mesh" so brushes referencing
/// it degrade to no geometry instead of failing the cycle.
#[derive(Clone, Debug, Default)]
pub struct ShapeRegistry {
    entries: Vec<Option<Arc<BrushMesh>>>,
}

impl ShapeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shape and return a reference carrying its content hash.
    pub fn insert(&mut self, shape: Result<BrushMesh, ShapeError>) -> ShapeRef {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "ShapeId uses 32-bit ids by design."
        )]
        let id = ShapeId(self.entries.len() as u32);
        self.entries.push(Self::admit(id, shape));
        self.shape_ref(id).unwrap_or(ShapeRef { id, hash: 0 })
    }

    /// Replace the content of an existing shape.
    ///
    /// Returns the new reference, or `None` if `id` was never issued.
    pub fn replace(&mut self, id: ShapeId, shape: Result<BrushMesh, ShapeError>) -> Option<ShapeRef> {
        let admitted = Self::admit(id, shape);
        let entry = self.entries.get_mut(id.0 as usize)?;
        *entry = admitted;
        self.shape_ref(id)
    }

    fn admit(id: ShapeId, shape: Result<BrushMesh, ShapeError>) -> Option<Arc<BrushMesh>> {
        match shape {
            Ok(mesh) => Some(Arc::new(mesh)),
            Err(e) => {
                log::warn!("shape {} is invalid and will produce no geometry: {e}", id.0);
                None
            }
        }
    }

    /// The mesh of `id`, if it is registered and valid.
    pub fn get(&self, id: ShapeId) -> Option<&Arc<BrushMesh>> {
        self.entries.get(id.0 as usize)?.as_ref()
    }

    /// Content hash of `id`; 0 for an invalid shape.
    pub fn hash(&self, id: ShapeId) -> Option<u64> {
        let entry = self.entries.get(id.0 as usize)?;
        Some(entry.as_ref().map_or(0, |m| m.content_hash()))
    }

    /// Reference to `id` with its current hash.
    pub fn shape_ref(&self, id: ShapeId) -> Option<ShapeRef> {
        Some(ShapeRef {
            id,
            hash: self.hash(id)?,
        })
    }

    /// Number of registered shapes, valid or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
