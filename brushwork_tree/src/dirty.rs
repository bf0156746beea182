// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty scan: turns status flags into work lists for one evaluation cycle.

use alloc::vec::Vec;
use hashbrown::HashSet;

use crate::hierarchy::Hierarchy;
use crate::types::{NodeId, NodeKind, NodeStatusFlags};

/// Work lists produced by [`Hierarchy::collect_dirty`].
///
/// `rebuild` and `transform_only` are disjoint; `touching` may overlap either.
#[derive(Clone, Debug, Default)]
pub struct DirtyScan {
    /// Brushes whose boolean result must be recomputed.
    pub rebuild: Vec<NodeId>,
    /// Brushes that only moved: their cached geometry needs a transform refresh.
    pub transform_only: Vec<NodeId>,
    /// Brushes that require every overlapping brush to be recomputed too.
    pub touching: Vec<NodeId>,
    /// Brushes that left the tree (deleted or detached) since the last scan.
    pub departed: Vec<NodeId>,
    /// Whether the shape of the CSG expression changed (operations, parents, child sets).
    pub topology_changed: bool,
    flagged: Vec<NodeId>,
    departed_seen: usize,
}

impl DirtyScan {
    /// True if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.rebuild.is_empty()
            && self.transform_only.is_empty()
            && self.departed.is_empty()
            && !self.topology_changed
    }
}

impl Hierarchy {
    /// Classify every flagged brush in the tree without clearing anything.
    pub fn collect_dirty(&self) -> DirtyScan {
        let mut scan = DirtyScan::default();
        self.walk(self.root, |r| {
            if r.flags.is_empty() {
                return;
            }
            scan.flagged.push(r.id);
            scan.topology_changed |= r.flags.intersects(NodeStatusFlags::TOPOLOGY);
            if r.kind != NodeKind::Brush {
                return;
            }
            if r.flags.intersects(NodeStatusFlags::REBUILD) {
                scan.rebuild.push(r.id);
            } else if r.flags.contains(NodeStatusFlags::TRANSFORM_MODIFIED) {
                scan.transform_only.push(r.id);
            }
            if r.flags.contains(NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE) {
                scan.touching.push(r.id);
            }
        });
        // A brush detached and re-attached before the scan is simply rebuilt.
        let mut seen = HashSet::new();
        scan.departed = self
            .departed
            .iter()
            .copied()
            .filter(|&id| !self.is_valid(id) || !self.is_in_tree(id))
            .filter(|&id| seen.insert(id))
            .collect();
        scan.departed_seen = self.departed.len();
        scan.topology_changed |= !scan.departed.is_empty();
        scan
    }

    /// Clear the flags consumed by `scan` and re-register brushes whose shape changed.
    ///
    /// Call this only after the cycle that used `scan` succeeded.
    pub fn acknowledge(&mut self, scan: &DirtyScan) {
        for &id in &scan.flagged {
            if !self.is_valid(id) {
                continue;
            }
            let record = self.record_mut(id);
            record.flags = NodeStatusFlags::empty();
            let current = record.shape.map(|s| s.id);
            let registered = record.registered_shape;
            if record.kind != NodeKind::Brush || current == registered {
                continue;
            }
            record.registered_shape = current;
            if let Some(old) = registered {
                self.unregister_user(old, id);
            }
            if let Some(new) = current {
                self.register_user(new, id);
            }
        }
        let n = scan.departed_seen.min(self.departed.len());
        self.departed.drain(..n);
    }

    /// [`collect_dirty`](Self::collect_dirty) followed by [`acknowledge`](Self::acknowledge).
    pub fn scan_dirty(&mut self) -> DirtyScan {
        let scan = self.collect_dirty();
        self.acknowledge(&scan);
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CsgOperation, ShapeId, ShapeRef};
    use glam::{DMat4, DVec3};

    fn shape(id: u32) -> Option<ShapeRef> {
        Some(ShapeRef {
            id: ShapeId(id),
            hash: 7,
        })
    }

    #[test]
    fn second_scan_without_edits_is_empty() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let b = h.create_brush(shape(2), Some(h.root()));
        let first = h.scan_dirty();
        assert_eq!(first.rebuild, [a, b]);
        assert!(first.topology_changed);
        let second = h.scan_dirty();
        assert!(second.is_empty());
        assert!(second.rebuild.is_empty());
        assert!(second.transform_only.is_empty());
        assert!(h.status_flags(h.root()).unwrap().is_empty());
    }

    #[test]
    fn transform_only_edit_is_not_a_rebuild() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let _ = h.scan_dirty();
        h.set_transform(a, DMat4::from_translation(DVec3::X));
        let scan = h.scan_dirty();
        assert!(scan.rebuild.is_empty());
        assert_eq!(scan.transform_only, [a]);
        assert_eq!(scan.touching, [a]);
        assert!(!scan.topology_changed);
    }

    #[test]
    fn collect_without_acknowledge_keeps_flags() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let _ = h.scan_dirty();
        h.set_operation(a, CsgOperation::Subtractive);
        let first = h.collect_dirty();
        let again = h.collect_dirty();
        assert_eq!(first.rebuild, [a]);
        assert_eq!(again.rebuild, [a], "an unacknowledged scan must be repeatable");
        h.acknowledge(&again);
        assert!(h.collect_dirty().is_empty());
    }

    #[test]
    fn departed_brushes_are_reported_once() {
        let mut h = Hierarchy::new();
        let branch = h.create_branch(Some(h.root()));
        let a = h.create_brush(shape(1), Some(branch));
        let b = h.create_brush(shape(1), Some(branch));
        let _ = h.scan_dirty();
        assert!(h.delete(branch, true));
        let scan = h.scan_dirty();
        assert_eq!(scan.departed, [a, b]);
        assert!(scan.topology_changed);
        assert!(h.scan_dirty().departed.is_empty());
    }

    #[test]
    fn detach_then_reattach_is_a_rebuild_not_a_removal() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let _ = h.scan_dirty();
        assert!(h.detach(a));
        h.add_child(h.root(), a);
        let scan = h.scan_dirty();
        assert!(scan.departed.is_empty());
        assert_eq!(scan.rebuild, [a]);
    }

    #[test]
    fn shape_users_follow_acknowledged_scans() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let b = h.create_brush(shape(1), Some(h.root()));
        let _ = h.scan_dirty();
        let mut users: Vec<_> = h.users_of(ShapeId(1)).collect();
        users.sort();
        let mut expected = [a, b];
        expected.sort();
        assert_eq!(users, expected);

        h.set_shape(b, shape(2));
        let _ = h.scan_dirty();
        assert_eq!(h.users_of(ShapeId(1)).collect::<Vec<_>>(), [a]);
        assert_eq!(h.users_of(ShapeId(2)).collect::<Vec<_>>(), [b]);

        assert_eq!(h.notify_shape_changed(ShapeId(1), 99), 1);
        let scan = h.scan_dirty();
        assert_eq!(scan.rebuild, [a]);
        assert_eq!(h.shape(a).unwrap().hash, 99);
        assert!(h.check_consistency().is_ok());
    }
}
