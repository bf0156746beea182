// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The hierarchy store: an arena of node records addressed by generational handles.
//!
//! Every child range lives as one contiguous run inside the backing array. Attaching
//! and detaching shift records inside that run, or relocate the whole run to the end
//! of the array when it has no room to grow. Relocation leaves holes that are reused
//! for standalone nodes and removed by [`Hierarchy::compact`].

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use brushwork_index::{Aabb3D, BVHF64, Damage, Index, IndexGeneric, Key as AabbKey};
use glam::DMat4;
use hashbrown::{HashMap, HashSet};

use crate::types::{
    CsgOperation, HierarchyId, NodeId, NodeKind, NodeStatusFlags, ShapeId, ShapeRef,
};

pub(crate) type BoundsIndex = IndexGeneric<f64, NodeId, BVHF64<NodeId>>;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    pub(crate) position: usize,
    pub(crate) generation: u32,
    pub(crate) live: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Record {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) child_offset: usize,
    pub(crate) child_count: usize,
    pub(crate) kind: NodeKind,
    pub(crate) operation: CsgOperation,
    pub(crate) transform: DMat4,
    pub(crate) flags: NodeStatusFlags,
    pub(crate) bounds: Option<Aabb3D<f64>>,
    pub(crate) shape: Option<ShapeRef>,
    // Shape this brush is listed under in `shape_users`; updated by the dirty scan.
    pub(crate) registered_shape: Option<ShapeId>,
    pub(crate) index_key: Option<AabbKey>,
}

impl Record {
    fn new(id: NodeId, kind: NodeKind, shape: Option<ShapeRef>) -> Self {
        Self {
            id,
            parent: None,
            child_offset: 0,
            child_count: 0,
            kind,
            operation: CsgOperation::Additive,
            transform: DMat4::IDENTITY,
            flags: NodeStatusFlags::NEEDS_FULL_UPDATE,
            bounds: None,
            shape,
            registered_shape: None,
            index_key: None,
        }
    }

    pub(crate) fn child_range(&self) -> Range<usize> {
        self.child_offset..self.child_offset + self.child_count
    }
}

/// One CSG tree: the root, its branches and brushes.
pub struct Hierarchy {
    pub(crate) id: HierarchyId,
    pub(crate) root: NodeId,
    pub(crate) slots: Vec<Slot>,
    pub(crate) free_slots: Vec<u32>,
    pub(crate) records: Vec<Option<Record>>,
    // Holes in `records`; entries may be stale and are checked on reuse.
    pub(crate) free_positions: Vec<usize>,
    pub(crate) shape_users: HashMap<ShapeId, HashSet<NodeId>>,
    // Brushes deleted or detached since the last acknowledged scan.
    pub(crate) departed: Vec<NodeId>,
    pub(crate) bounds_index: BoundsIndex,
}

impl core::fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let alive = self.slots.iter().filter(|s| s.live).count();
        let holes = self.records.iter().filter(|r| r.is_none()).count();
        f.debug_struct("Hierarchy")
            .field("id", &self.id)
            .field("nodes_alive", &alive)
            .field("array_len", &self.records.len())
            .field("holes", &holes)
            .field("departed", &self.departed.len())
            .field("bounds_index", &self.bounds_index)
            .finish_non_exhaustive()
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Hierarchy {
    /// Create a hierarchy holding only its root node.
    pub fn new() -> Self {
        let id = HierarchyId::next();
        let root = NodeId::new(0, 1, id);
        let mut record = Record::new(root, NodeKind::Tree, None);
        record.flags |= NodeStatusFlags::TREE_NEEDS_UPDATE;
        Self {
            id,
            root,
            slots: vec![Slot {
                position: 0,
                generation: 1,
                live: true,
            }],
            free_slots: Vec::new(),
            records: vec![Some(record)],
            free_positions: Vec::new(),
            shape_users: HashMap::new(),
            departed: Vec::new(),
            bounds_index: Index::<f64, NodeId>::with_bvh(),
        }
    }

    /// Identifier of this hierarchy.
    pub fn id(&self) -> HierarchyId {
        self.id
    }

    /// The root node. It cannot be deleted, detached or attached elsewhere.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, including the root and detached nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    /// True if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    // --- creation ---

    /// Create a node. With a shape the node is a brush, otherwise a branch.
    ///
    /// With a parent, the node is appended to the parent's children.
    pub fn create_node(&mut self, shape: Option<ShapeRef>, parent: Option<NodeId>) -> NodeId {
        let kind = if shape.is_some() {
            NodeKind::Brush
        } else {
            NodeKind::Branch
        };
        self.alloc_node(kind, shape, parent)
    }

    /// Create a brush. A brush without a shape contributes no geometry.
    pub fn create_brush(&mut self, shape: Option<ShapeRef>, parent: Option<NodeId>) -> NodeId {
        self.alloc_node(NodeKind::Brush, shape, parent)
    }

    /// Create a branch.
    pub fn create_branch(&mut self, parent: Option<NodeId>) -> NodeId {
        self.alloc_node(NodeKind::Branch, None, parent)
    }

    fn alloc_node(
        &mut self,
        kind: NodeKind,
        shape: Option<ShapeRef>,
        parent: Option<NodeId>,
    ) -> NodeId {
        if let Some(p) = parent {
            self.expect_valid(p, "create_node");
        }
        let (slot, generation) = if let Some(slot) = self.free_slots.pop() {
            let s = &mut self.slots[slot as usize];
            s.generation = s.generation.wrapping_add(1);
            s.live = true;
            (slot, s.generation)
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit slots by design."
            )]
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                position: 0,
                generation: 1,
                live: true,
            });
            (slot, 1)
        };
        let id = NodeId::new(slot, generation, self.id);
        let mut record = Record::new(id, kind, shape);
        if kind == NodeKind::Brush {
            record.flags |=
                NodeStatusFlags::SHAPE_MODIFIED | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE;
        }
        let position = self.alloc_position();
        self.place(position, record);
        if let Some(p) = parent {
            let index = self.record(p).child_count;
            self.attach_to_parent(p, index, id);
        }
        id
    }

    // --- deletion ---

    /// Delete a node.
    ///
    /// Returns `false` for the root, for an invalid handle, and for a non-recursive
    /// delete of a node that still has children. A recursive delete frees every
    /// descendant's slot. Deleted brushes are reported by the next dirty scan.
    pub fn delete(&mut self, id: NodeId, recursive: bool) -> bool {
        if !self.is_valid(id) || id == self.root {
            log::warn!("refusing to delete {id:?}: root or invalid handle");
            return false;
        }
        if !recursive && self.record(id).child_count > 0 {
            log::warn!("refusing non-recursive delete of {id:?}: node has children");
            return false;
        }
        if let Some(parent) = self.record(id).parent {
            self.unlink(id);
            self.mark(parent, NodeStatusFlags::BRANCH_NEEDS_UPDATE);
        }
        let subtree = self.subtree(id);
        for node in subtree {
            let position = self.slots[node.idx()].position;
            let Some(record) = self.records[position].take() else {
                continue;
            };
            self.free_positions.push(position);
            let slot = &mut self.slots[node.idx()];
            slot.live = false;
            self.free_slots.push(node.slot());
            if let Some(key) = record.index_key {
                self.bounds_index.remove(key);
            }
            if let Some(shape) = record.registered_shape {
                self.unregister_user(shape, node);
            }
            if record.kind == NodeKind::Brush {
                self.departed.push(node);
            }
        }
        self.mark_root();
        true
    }

    // --- attachment ---

    /// Attach `id` under `parent` so that it becomes child number `index`.
    ///
    /// If `id` already has a parent it is detached first. The other children keep their
    /// relative order.
    ///
    /// # Panics
    ///
    /// On stale handles, on attaching the root, on attaching a node under itself or one
    /// of its descendants, on attaching under a brush, and if `index` exceeds the child
    /// count.
    pub fn attach_to_parent(&mut self, parent: NodeId, index: usize, id: NodeId) {
        self.expect_valid(parent, "attach_to_parent");
        self.expect_valid(id, "attach_to_parent");
        assert!(id != self.root, "the root cannot be attached");
        assert!(
            id != parent && !self.is_descendant(id, parent),
            "cannot attach {id:?} under its own subtree"
        );
        assert!(
            self.record(parent).kind != NodeKind::Brush,
            "brushes cannot have children"
        );
        if let Some(old_parent) = self.record(id).parent {
            self.unlink(id);
            self.mark(old_parent, NodeStatusFlags::BRANCH_NEEDS_UPDATE);
        }
        let count = self.record(parent).child_count;
        assert!(index <= count, "child index {index} out of range (0..={count})");

        let from = self.slots[id.idx()].position;
        let mut record = self.records[from].take().expect("dangling NodeId");
        self.free_positions.push(from);
        record.parent = Some(parent);

        if count == 0 {
            // A lone child stays wherever a hole is; the range starts there.
            let position = self.alloc_position();
            let p = self.record_mut(parent);
            p.child_offset = position;
            p.child_count = 1;
            self.place(position, record);
        } else {
            let offset = self.grow_range(parent);
            let end = offset + count;
            for i in (offset + index..end).rev() {
                self.move_record(i, i + 1);
            }
            self.place(offset + index, record);
            self.record_mut(parent).child_count = count + 1;
        }

        self.mark_subtree_brushes(
            id,
            NodeStatusFlags::HIERARCHY_MODIFIED | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE,
        );
        self.mark(id, NodeStatusFlags::HIERARCHY_MODIFIED);
        self.mark(parent, NodeStatusFlags::BRANCH_NEEDS_UPDATE);
    }

    /// Append `id` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, id: NodeId) {
        self.expect_valid(parent, "add_child");
        let index = self.record(parent).child_count;
        let index = match self.record(id).parent {
            // Moving within the same parent: it is removed before being re-inserted.
            Some(p) if p == parent => index - 1,
            _ => index,
        };
        self.attach_to_parent(parent, index, id);
    }

    /// Remove `id` from its parent and keep it as a standalone node.
    ///
    /// Brushes in the detached subtree leave the CSG tree and are reported by the next
    /// dirty scan. Returns `false` if the node had no parent.
    pub fn detach(&mut self, id: NodeId) -> bool {
        self.expect_valid(id, "detach");
        let Some(parent) = self.record(id).parent else {
            return false;
        };
        self.unlink(id);
        self.mark(parent, NodeStatusFlags::BRANCH_NEEDS_UPDATE);
        self.mark(id, NodeStatusFlags::HIERARCHY_MODIFIED);
        for node in self.subtree(id) {
            let record = self.record_mut(node);
            if record.kind != NodeKind::Brush {
                continue;
            }
            record.flags |=
                NodeStatusFlags::HIERARCHY_MODIFIED | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE;
            record.bounds = None;
            if let Some(key) = record.index_key.take() {
                self.bounds_index.remove(key);
            }
            self.departed.push(node);
        }
        true
    }

    // --- state ---

    /// Set shape, operation and transform in one call.
    ///
    /// Only the bits of fields that actually changed are set; any change also sets
    /// [`NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE`]. Transform and operation changes
    /// on a branch are pushed down to every brush below it. Returns the bits that
    /// were set on the node itself.
    ///
    /// # Panics
    ///
    /// On a stale handle, or when giving a shape to a node that is not a brush.
    pub fn set_state(
        &mut self,
        id: NodeId,
        shape: Option<ShapeRef>,
        operation: CsgOperation,
        transform: DMat4,
    ) -> NodeStatusFlags {
        self.expect_valid(id, "set_state");
        let is_root = id == self.root;
        let record = self.record_mut(id);
        assert!(
            shape.is_none() || record.kind == NodeKind::Brush,
            "only brushes reference shapes"
        );
        let mut changed = NodeStatusFlags::empty();
        if record.shape != shape {
            record.shape = shape;
            changed |= NodeStatusFlags::SHAPE_MODIFIED;
        }
        if record.operation != operation {
            record.operation = operation;
            changed |= NodeStatusFlags::OPERATION_MODIFIED;
        }
        if record.transform != transform {
            record.transform = transform;
            changed |= NodeStatusFlags::TRANSFORM_MODIFIED;
        }
        if changed.is_empty() {
            return changed;
        }
        changed |= NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE;
        record.flags |= changed;
        let kind = record.kind;
        if kind != NodeKind::Brush && !is_root {
            let inherited = changed
                & (NodeStatusFlags::TRANSFORM_MODIFIED
                    | NodeStatusFlags::OPERATION_MODIFIED
                    | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE);
            self.mark_subtree_brushes(id, inherited);
        }
        self.mark_root();
        changed
    }

    /// Set only the operation. See [`Hierarchy::set_state`].
    pub fn set_operation(&mut self, id: NodeId, operation: CsgOperation) -> NodeStatusFlags {
        self.expect_valid(id, "set_operation");
        let (shape, transform) = self.shape_and_transform(id);
        self.set_state(id, shape, operation, transform)
    }

    /// Set only the local transform. See [`Hierarchy::set_state`].
    pub fn set_transform(&mut self, id: NodeId, transform: DMat4) -> NodeStatusFlags {
        self.expect_valid(id, "set_transform");
        let (shape, _) = self.shape_and_transform(id);
        let operation = self.record(id).operation;
        self.set_state(id, shape, operation, transform)
    }

    /// Set only the shape reference. See [`Hierarchy::set_state`].
    pub fn set_shape(&mut self, id: NodeId, shape: Option<ShapeRef>) -> NodeStatusFlags {
        self.expect_valid(id, "set_shape");
        let (_, transform) = self.shape_and_transform(id);
        let operation = self.record(id).operation;
        self.set_state(id, shape, operation, transform)
    }

    /// Record that the content of `shape` changed to `hash`.
    ///
    /// Marks every registered brush using the shape whose stored hash differs.
    /// Returns the number of brushes marked.
    pub fn notify_shape_changed(&mut self, shape: ShapeId, hash: u64) -> usize {
        let Some(users) = self.shape_users.get(&shape) else {
            return 0;
        };
        let users: Vec<NodeId> = users.iter().copied().collect();
        let mut marked = 0;
        for user in users {
            let record = self.record_mut(user);
            match record.shape.as_mut() {
                Some(s) if s.id == shape && s.hash != hash => {
                    s.hash = hash;
                    record.flags |=
                        NodeStatusFlags::SHAPE_MODIFIED | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE;
                    marked += 1;
                }
                _ => {}
            }
        }
        if marked > 0 {
            self.mark_root();
        }
        marked
    }

    /// Brushes currently registered as users of `shape`.
    pub fn users_of(&self, shape: ShapeId) -> impl Iterator<Item = NodeId> + '_ {
        self.shape_users.get(&shape).into_iter().flatten().copied()
    }

    // --- bounds ---

    /// Store a brush's tree-space bounds and stage the matching index update.
    ///
    /// Returns true if the bounds changed. Call [`Hierarchy::commit_bounds`] before
    /// querying.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Option<Aabb3D<f64>>) -> bool {
        self.expect_valid(id, "set_bounds");
        let record = self.record_mut(id);
        if record.bounds == bounds {
            return false;
        }
        record.bounds = bounds;
        match (record.index_key, bounds) {
            (Some(key), Some(b)) => self.bounds_index.update(key, b),
            (Some(key), None) => {
                self.bounds_index.remove(key);
                self.record_mut(id).index_key = None;
            }
            (None, Some(b)) => {
                let key = self.bounds_index.insert(b, id);
                self.record_mut(id).index_key = Some(key);
            }
            (None, None) => {}
        }
        true
    }

    /// Apply staged bounds changes to the spatial index.
    pub fn commit_bounds(&mut self) -> Damage<f64, NodeId> {
        self.bounds_index.commit()
    }

    /// Brushes whose committed bounds intersect `aabb` (touching counts).
    pub fn query_bounds(&self, aabb: Aabb3D<f64>) -> impl Iterator<Item = NodeId> + '_ {
        self.bounds_index.query_box(aabb).map(|(_, id)| id)
    }

    // --- queries ---

    /// Whether `id` refers to a live node of this hierarchy.
    pub fn is_valid(&self, id: NodeId) -> bool {
        id.hierarchy() == self.id
            && self
                .slots
                .get(id.idx())
                .is_some_and(|s| s.live && s.generation == id.generation())
    }

    /// Position of `id` among its siblings.
    pub fn sibling_index_of(&self, id: NodeId) -> Option<usize> {
        let r = self.get(id)?;
        let parent = self.get(r.parent?)?;
        Some(self.slots[id.idx()].position - parent.child_offset)
    }

    /// Number of children.
    pub fn child_count(&self, id: NodeId) -> Option<usize> {
        self.get(id).map(|r| r.child_count)
    }

    /// Child number `index`.
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        let r = self.get(id)?;
        if index >= r.child_count {
            return None;
        }
        self.records[r.child_offset + index].as_ref().map(|c| c.id)
    }

    /// Children in order. Empty for invalid handles.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let range = self.get(id).map(|r| r.child_range()).unwrap_or(0..0);
        self.records[range].iter().filter_map(|r| r.as_ref().map(|r| r.id))
    }

    /// Parent of `id`; `None` for the root, detached nodes and invalid handles.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    /// Whether `node` lies strictly below `ancestor`.
    pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.is_valid(ancestor) {
            return false;
        }
        let mut cur = self.parent_of(node);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent_of(p);
        }
        false
    }

    /// Whether `id` is the root or reachable from it.
    pub fn is_in_tree(&self, id: NodeId) -> bool {
        id == self.root || self.is_descendant(self.root, id)
    }

    /// Kind of node.
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.get(id).map(|r| r.kind)
    }

    /// Boolean operation.
    pub fn operation(&self, id: NodeId) -> Option<CsgOperation> {
        self.get(id).map(|r| r.operation)
    }

    /// Local transform, relative to the parent.
    pub fn transform(&self, id: NodeId) -> Option<DMat4> {
        self.get(id).map(|r| r.transform)
    }

    /// Shape reference (brushes only).
    pub fn shape(&self, id: NodeId) -> Option<ShapeRef> {
        self.get(id)?.shape
    }

    /// Tree-space bounds last stored with [`Hierarchy::set_bounds`].
    pub fn bounds(&self, id: NodeId) -> Option<Aabb3D<f64>> {
        self.get(id)?.bounds
    }

    /// Pending status bits.
    pub fn status_flags(&self, id: NodeId) -> Option<NodeStatusFlags> {
        self.get(id).map(|r| r.flags)
    }

    /// Product of the transforms from below the root down to and including `id`.
    pub fn node_to_tree(&self, id: NodeId) -> Option<DMat4> {
        let mut r = self.get(id)?;
        let mut m = DMat4::IDENTITY;
        while r.id != self.root {
            m = r.transform * m;
            match r.parent {
                Some(p) => r = self.get(p)?,
                None => break,
            }
        }
        Some(m)
    }

    /// Brushes in the tree, in pre-order (children in sibling order).
    pub fn brushes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(self.root, |r| {
            if r.kind == NodeKind::Brush {
                out.push(r.id);
            }
        });
        out
    }

    /// Visit `start` and its subtree in pre-order.
    pub(crate) fn walk(&self, start: NodeId, mut visit: impl FnMut(&Record)) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let r = self.record(id);
            visit(r);
            for child in self.records[r.child_range()].iter().rev().flatten() {
                stack.push(child.id);
            }
        }
    }

    /// Rewrite the backing array so that it has no holes.
    ///
    /// Nodes are laid out parent first, with each child range placed as one block
    /// before descending into it. Detached subtrees follow the tree.
    pub fn compact(&mut self) {
        let mut old = core::mem::take(&mut self.records);
        let mut roots = vec![self.root];
        roots.extend(
            old.iter()
                .flatten()
                .filter(|r| r.parent.is_none() && r.id != self.root)
                .map(|r| r.id),
        );
        let mut records: Vec<Option<Record>> = Vec::with_capacity(old.len());
        for root in roots {
            let position = self.slots[root.idx()].position;
            let record = old[position].take().expect("dangling NodeId");
            self.slots[root.idx()].position = records.len();
            records.push(Some(record));
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let at = self.slots[id.idx()].position;
                let range = records[at].as_ref().map(|r| r.child_range()).unwrap_or(0..0);
                let offset = records.len();
                for i in range {
                    let child = old[i].take().expect("hole inside a child range");
                    self.slots[child.id.idx()].position = records.len();
                    stack.push(child.id);
                    records.push(Some(child));
                }
                if let Some(r) = records[at].as_mut() {
                    r.child_offset = if r.child_count > 0 { offset } else { 0 };
                }
            }
        }
        self.records = records;
        self.free_positions.clear();
    }

    // --- internals ---

    pub(crate) fn get(&self, id: NodeId) -> Option<&Record> {
        if !self.is_valid(id) {
            return None;
        }
        self.records[self.slots[id.idx()].position].as_ref()
    }

    pub(crate) fn record(&self, id: NodeId) -> &Record {
        self.records[self.slots[id.idx()].position]
            .as_ref()
            .expect("dangling NodeId")
    }

    pub(crate) fn record_mut(&mut self, id: NodeId) -> &mut Record {
        self.records[self.slots[id.idx()].position]
            .as_mut()
            .expect("dangling NodeId")
    }

    fn shape_and_transform(&self, id: NodeId) -> (Option<ShapeRef>, DMat4) {
        let r = self.record(id);
        (r.shape, r.transform)
    }

    fn expect_valid(&self, id: NodeId, op: &str) {
        assert!(
            self.is_valid(id),
            "{op}: stale or foreign handle {id:?} (hierarchy {:?})",
            self.id
        );
    }

    fn alloc_position(&mut self) -> usize {
        while let Some(p) = self.free_positions.pop() {
            if self.records.get(p).is_some_and(Option::is_none) {
                return p;
            }
        }
        self.records.push(None);
        self.records.len() - 1
    }

    fn place(&mut self, position: usize, record: Record) {
        self.slots[record.id.idx()].position = position;
        self.records[position] = Some(record);
    }

    fn move_record(&mut self, from: usize, to: usize) {
        debug_assert!(self.records[to].is_none(), "move target {to} occupied");
        if let Some(record) = self.records[from].take() {
            self.place(to, record);
        }
    }

    /// Make room for one more child after `parent`'s range. Returns the (possibly new) offset.
    fn grow_range(&mut self, parent: NodeId) -> usize {
        let Range { start, end } = self.record(parent).child_range();
        if end == self.records.len() {
            self.records.push(None);
            return start;
        }
        if self.records[end].is_none() {
            return start;
        }
        // No room: move the whole run to the end of the array.
        let offset = self.records.len();
        for i in start..end {
            self.records.push(None);
            self.move_record(i, offset + (i - start));
            self.free_positions.push(i);
        }
        self.records.push(None);
        self.record_mut(parent).child_offset = offset;
        offset
    }

    /// Remove `id` from its parent's range and move it to a standalone position.
    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.record(id).parent else {
            return;
        };
        let from = self.slots[id.idx()].position;
        let Range { start, end } = self.record(parent).child_range();
        debug_assert!((start..end).contains(&from), "child outside parent's range");
        let mut record = self.records[from].take().expect("dangling NodeId");
        record.parent = None;
        for i in from + 1..end {
            self.move_record(i, i - 1);
        }
        self.free_positions.push(end - 1);
        let p = self.record_mut(parent);
        p.child_count -= 1;
        if p.child_count == 0 {
            p.child_offset = 0;
        }
        let position = self.alloc_position();
        self.place(position, record);
    }

    /// Ids of `id` and everything below it, pre-order.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, |r| out.push(r.id));
        out
    }

    fn mark(&mut self, id: NodeId, flags: NodeStatusFlags) {
        self.record_mut(id).flags |= flags;
        self.mark_root();
    }

    fn mark_root(&mut self) {
        let root = self.root;
        self.record_mut(root).flags |= NodeStatusFlags::TREE_NEEDS_UPDATE;
    }

    fn mark_subtree_brushes(&mut self, id: NodeId, flags: NodeStatusFlags) {
        for node in self.subtree(id) {
            let r = self.record_mut(node);
            if r.kind == NodeKind::Brush {
                r.flags |= flags;
            }
        }
        self.mark_root();
    }

    pub(crate) fn register_user(&mut self, shape: ShapeId, id: NodeId) {
        self.shape_users.entry(shape).or_default().insert(id);
    }

    pub(crate) fn unregister_user(&mut self, shape: ShapeId, id: NodeId) {
        if let Some(users) = self.shape_users.get_mut(&shape) {
            users.remove(&id);
            if users.is_empty() {
                self.shape_users.remove(&shape);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn shape(id: u32) -> Option<ShapeRef> {
        Some(ShapeRef {
            id: ShapeId(id),
            hash: u64::from(id),
        })
    }

    fn assert_contiguous(h: &Hierarchy) {
        for (slot, s) in h.slots.iter().enumerate() {
            if !s.live {
                continue;
            }
            let r = h.records[s.position].as_ref().expect("live slot without record");
            assert_eq!(r.id.idx(), slot, "slot/record disagreement");
            for i in r.child_range() {
                let child = h.records[i].as_ref().expect("hole inside child range");
                assert_eq!(child.parent, Some(r.id), "child range holds a foreign node");
            }
        }
    }

    #[test]
    fn stale_handle_rejected_after_slot_reuse() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        assert!(h.is_valid(a));
        assert!(h.delete(a, false));
        assert!(!h.is_valid(a));
        let b = h.create_brush(shape(2), Some(h.root()));
        assert_eq!(a.slot(), b.slot(), "freed slot is reused");
        assert_ne!(a, b);
        assert!(!h.is_valid(a));
        assert!(h.is_valid(b));
        assert_eq!(h.shape(a), None);
    }

    #[test]
    fn handles_from_another_hierarchy_are_rejected() {
        let mut h1 = Hierarchy::new();
        let h2 = Hierarchy::new();
        let a = h1.create_branch(Some(h1.root()));
        assert!(!h2.is_valid(a));
        assert_eq!(h2.child_count(a), None);
    }

    #[test]
    #[should_panic(expected = "stale or foreign handle")]
    fn mutating_through_stale_handle_panics() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        h.delete(a, false);
        h.set_transform(a, DMat4::IDENTITY);
    }

    #[test]
    fn attach_keeps_order_and_contiguity() {
        let mut h = Hierarchy::new();
        let root = h.root();
        let branch = h.create_branch(Some(root));
        let other = h.create_branch(Some(root));
        let a = h.create_brush(shape(1), Some(branch));
        let b = h.create_brush(shape(2), Some(branch));
        // Occupy the slot right after `branch`'s range to force a relocation.
        let _blocker = h.create_brush(shape(3), Some(other));
        let c = h.create_brush(shape(4), None);
        h.attach_to_parent(branch, 1, c);
        let kids: Vec<_> = h.children(branch).collect();
        assert_eq!(kids, [a, c, b]);
        assert_eq!(h.sibling_index_of(c), Some(1));
        assert_eq!(h.child_at(branch, 2), Some(b));
        assert_eq!(h.parent_of(c), Some(branch));
        assert_contiguous(&h);
        assert!(h.check_consistency().is_ok());
    }

    #[test]
    fn moving_between_parents_and_within_parent() {
        let mut h = Hierarchy::new();
        let root = h.root();
        let x = h.create_branch(Some(root));
        let y = h.create_branch(Some(root));
        let a = h.create_brush(shape(1), Some(x));
        let b = h.create_brush(shape(1), Some(x));
        let c = h.create_brush(shape(1), Some(x));
        h.attach_to_parent(y, 0, b);
        assert_eq!(h.children(x).collect::<Vec<_>>(), [a, c]);
        assert_eq!(h.children(y).collect::<Vec<_>>(), [b]);
        h.attach_to_parent(x, 0, c);
        assert_eq!(h.children(x).collect::<Vec<_>>(), [c, a]);
        h.add_child(x, c);
        assert_eq!(h.children(x).collect::<Vec<_>>(), [a, c]);
        assert_contiguous(&h);
        assert!(h.check_consistency().is_ok());
    }

    #[test]
    #[should_panic(expected = "under its own subtree")]
    fn attaching_under_descendant_panics() {
        let mut h = Hierarchy::new();
        let a = h.create_branch(Some(h.root()));
        let b = h.create_branch(Some(a));
        h.attach_to_parent(b, 0, a);
    }

    #[test]
    fn delete_rules() {
        let mut h = Hierarchy::new();
        let root = h.root();
        assert!(!h.delete(root, true), "root cannot be deleted");
        let branch = h.create_branch(Some(root));
        let a = h.create_brush(shape(1), Some(branch));
        assert!(!h.delete(branch, false), "non-recursive delete with children is refused");
        assert!(h.is_valid(a));
        assert!(h.delete(branch, true));
        assert!(!h.is_valid(branch));
        assert!(!h.is_valid(a));
        assert!(!h.delete(a, true), "already deleted");
        assert_eq!(h.child_count(root), Some(0));
        assert_eq!(h.len(), 1);
        assert!(h.check_consistency().is_ok());
    }

    #[test]
    fn set_state_reports_only_changed_fields() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let _ = h.scan_dirty();
        let same = h.set_state(a, shape(1), CsgOperation::Additive, DMat4::IDENTITY);
        assert!(same.is_empty());
        let moved = DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let changed = h.set_state(a, shape(1), CsgOperation::Additive, moved);
        assert_eq!(
            changed,
            NodeStatusFlags::TRANSFORM_MODIFIED | NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE
        );
        let changed = h.set_operation(a, CsgOperation::Subtractive);
        assert!(changed.contains(NodeStatusFlags::OPERATION_MODIFIED));
        assert!(!changed.contains(NodeStatusFlags::TRANSFORM_MODIFIED));
        let root_flags = h.status_flags(h.root()).unwrap();
        assert!(root_flags.contains(NodeStatusFlags::TREE_NEEDS_UPDATE));
    }

    #[test]
    fn branch_transform_reaches_descendant_brushes() {
        let mut h = Hierarchy::new();
        let branch = h.create_branch(Some(h.root()));
        let inner = h.create_branch(Some(branch));
        let a = h.create_brush(shape(1), Some(inner));
        let _ = h.scan_dirty();
        let t = DMat4::from_translation(DVec3::new(0.0, 2.0, 0.0));
        h.set_transform(branch, t);
        let flags = h.status_flags(a).unwrap();
        assert!(flags.contains(NodeStatusFlags::TRANSFORM_MODIFIED));
        assert!(flags.contains(NodeStatusFlags::NEED_ALL_TOUCHING_UPDATE));
        h.set_transform(a, DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0)));
        let m = h.node_to_tree(a).unwrap();
        let p = m.transform_point3(DVec3::ZERO);
        assert_eq!(p, DVec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn compact_removes_holes() {
        let mut h = Hierarchy::new();
        let root = h.root();
        let x = h.create_branch(Some(root));
        let y = h.create_branch(Some(root));
        let mut xs = Vec::new();
        for i in 0..4 {
            xs.push(h.create_brush(shape(i), Some(x)));
            let _ = h.create_brush(shape(i), Some(y));
        }
        let loose = h.create_brush(shape(9), None);
        assert!(h.records.iter().any(Option::is_none), "relocation leaves holes");
        h.compact();
        assert!(h.records.iter().all(Option::is_some));
        assert_eq!(h.children(x).collect::<Vec<_>>(), xs);
        assert!(h.is_valid(loose));
        assert_eq!(h.parent_of(loose), None);
        assert!(h.check_consistency().is_ok());
    }

    #[test]
    fn bounds_index_follows_set_bounds() {
        let mut h = Hierarchy::new();
        let a = h.create_brush(shape(1), Some(h.root()));
        let b = h.create_brush(shape(1), Some(h.root()));
        assert!(h.set_bounds(a, Some(Aabb3D::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0))));
        assert!(h.set_bounds(b, Some(Aabb3D::new(5.0, 5.0, 5.0, 6.0, 6.0, 6.0))));
        assert!(!h.set_bounds(b, Some(Aabb3D::new(5.0, 5.0, 5.0, 6.0, 6.0, 6.0))));
        let _ = h.commit_bounds();
        let hits: Vec<_> = h.query_bounds(Aabb3D::new(0.5, 0.5, 0.5, 2.0, 2.0, 2.0)).collect();
        assert_eq!(hits, [a]);
        h.delete(a, false);
        let _ = h.commit_bounds();
        assert_eq!(h.query_bounds(Aabb3D::new(0.5, 0.5, 0.5, 2.0, 2.0, 2.0)).count(), 0);
    }

    #[test]
    fn brushes_walk_is_pre_order() {
        let mut h = Hierarchy::new();
        let root = h.root();
        let a = h.create_brush(shape(1), Some(root));
        let branch = h.create_branch(Some(root));
        let b = h.create_brush(shape(1), Some(branch));
        let c = h.create_brush(shape(1), Some(root));
        let d = h.create_brush(shape(1), Some(branch));
        assert_eq!(h.brushes(), [a, b, d, c]);
        assert!(h.is_descendant(root, d));
        assert!(h.is_descendant(branch, d));
        assert!(!h.is_descendant(branch, c));
    }
}
