// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The evaluation cycle.
//!
//! [`CsgTree::update`] reads the hierarchy's dirty flags, recomputes the
//! affected brushes and commits the results in one step. Until the commit the
//! hierarchy is only read; a failed cycle leaves every flag and buffer as it
//! was, so the next call retries the same work.

use std::sync::Arc;

use brushwork_index::Aabb3D;
use brushwork_tree::{CsgOperation, DirtyScan, Hierarchy, NodeId, NodeStatusFlags, ShapeId};
use glam::DMat4;
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::broadphase::{BoundsView, find_candidates};
use crate::brush_mesh::BrushMesh;
use crate::categorize::{Neighbor, categorize};
use crate::compact_tree::{CompactTree, IndexOrder};
use crate::error::{CycleError, ShapeError};
use crate::intersection::{BrushIntersection, IntersectionKind, PairIntersection, intersect_pair};
use crate::render_buffer::{RenderBuffer, build_render_buffer};
use crate::settings::CsgSettings;
use crate::shapes::ShapeRegistry;
use crate::tree_space::TreeSpaceBrush;

/// Receives the output of every completed cycle.
pub trait CycleListener: Send {
    /// Called once per cycle that changed anything, after the results are stored.
    fn on_cycle_complete(&mut self, output: &CycleOutput);
}

/// A brush whose output changed in a cycle.
#[derive(Clone, Debug)]
pub struct BrushUpdate {
    /// The brush.
    pub brush: NodeId,
    /// Its new output; `None` when nothing of it is visible.
    pub buffer: Option<Arc<RenderBuffer>>,
    /// Positions or triangles differ from the previous buffer.
    pub geometry_changed: bool,
    /// Texture coordinates, tangents or surface attributes differ.
    pub surface_changed: bool,
}

/// Work counters of one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Brushes re-evaluated against their neighbours.
    pub rebuilt: usize,
    /// Brushes that only moved and overlap nothing.
    pub refreshed: usize,
    /// Distinct brush pairs with overlapping bounds.
    pub candidate_pairs: usize,
    /// Pairs sharing volume or face area.
    pub intersecting_pairs: usize,
}

/// What a cycle changed.
#[derive(Clone, Debug, Default)]
pub struct CycleOutput {
    /// Brushes whose render buffer changed, in node order.
    pub updated: Vec<BrushUpdate>,
    /// Brushes whose tree-space bounds changed.
    pub bounds_changed: Vec<NodeId>,
    /// Brushes that left the tree; their buffers are gone.
    pub removed: Vec<NodeId>,
    /// Counters.
    pub stats: CycleStats,
}

impl CycleOutput {
    /// True if the cycle changed nothing.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.bounds_changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
struct BrushState {
    geometry: Option<Arc<TreeSpaceBrush>>,
    intersections: Vec<BrushIntersection>,
    buffer: Option<Arc<RenderBuffer>>,
}

/// Result of evaluating one brush.
#[derive(Debug)]
struct BrushResult {
    brush: IndexOrder,
    buffer: Option<Arc<RenderBuffer>>,
    intersections: Vec<BrushIntersection>,
}

/// Everything a cycle computes before it commits.
#[derive(Debug, Default)]
struct CycleScratch {
    geometry: HashMap<NodeId, Option<Arc<TreeSpaceBrush>>>,
    bounds: HashMap<NodeId, Option<Aabb3D<f64>>>,
    rebuild: Vec<IndexOrder>,
    refresh: Vec<IndexOrder>,
    pairs: Vec<(IndexOrder, IndexOrder)>,
    pair_kinds: Vec<IntersectionKind>,
    results: Vec<BrushResult>,
    tree: CompactTree,
    stats: CycleStats,
}

impl CycleScratch {
    fn reserve(scan: &DirtyScan) -> Result<Self, CycleError> {
        let dirty = scan.rebuild.len() + scan.transform_only.len();
        let mut scratch = Self::default();
        scratch.geometry.try_reserve(dirty)?;
        scratch.bounds.try_reserve(dirty)?;
        scratch.rebuild.try_reserve(dirty + scan.touching.len())?;
        scratch.refresh.try_reserve(scan.transform_only.len())?;
        scratch.results.try_reserve(dirty + scan.touching.len())?;
        Ok(scratch)
    }
}

/// Tree-space shapes as of this cycle: freshly computed ones first, then the cache.
#[derive(Clone, Copy)]
struct GeometryView<'a> {
    pending: &'a HashMap<NodeId, Option<Arc<TreeSpaceBrush>>>,
    cached: &'a HashMap<NodeId, BrushState>,
}

impl<'a> GeometryView<'a> {
    fn get(&self, id: NodeId) -> Option<&'a TreeSpaceBrush> {
        match self.pending.get(&id) {
            Some(g) => g.as_deref(),
            None => self.cached.get(&id)?.geometry.as_deref(),
        }
    }
}

/// A CSG tree of brushes with incrementally maintained render buffers.
///
/// Edit the tree through the methods here, then call [`CsgTree::update`] to
/// bring every buffer up to date.
pub struct CsgTree {
    hierarchy: Hierarchy,
    shapes: ShapeRegistry,
    settings: CsgSettings,
    brushes: HashMap<NodeId, BrushState>,
    listeners: Vec<Box<dyn CycleListener>>,
    /// The last committed tree had an `Intersecting` node.
    had_intersecting: bool,
}

impl core::fmt::Debug for CsgTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CsgTree")
            .field("nodes", &self.hierarchy.len())
            .field("shapes", &self.shapes.len())
            .field("brushes", &self.brushes.len())
            .field("listeners", &self.listeners.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for CsgTree {
    fn default() -> Self {
        Self::new(CsgSettings::default())
    }
}

impl CsgTree {
    /// Create an empty tree.
    pub fn new(settings: CsgSettings) -> Self {
        Self {
            hierarchy: Hierarchy::new(),
            shapes: ShapeRegistry::new(),
            settings,
            brushes: HashMap::new(),
            listeners: Vec::new(),
            had_intersecting: false,
        }
    }

    /// The node hierarchy.
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.hierarchy.root()
    }

    /// Registered shapes.
    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    /// Tolerances in use.
    pub fn settings(&self) -> &CsgSettings {
        &self.settings
    }

    /// Register a listener notified after each cycle that changed anything.
    pub fn add_listener(&mut self, listener: Box<dyn CycleListener>) {
        self.listeners.push(listener);
    }

    // --- shapes ---

    /// Register a shape. An invalid shape is kept and yields no geometry.
    pub fn add_shape(&mut self, shape: Result<BrushMesh, ShapeError>) -> ShapeId {
        self.shapes.insert(shape).id
    }

    /// Replace a shape's content and mark every brush using it.
    ///
    /// Returns the number of brushes marked.
    pub fn replace_shape(&mut self, id: ShapeId, shape: Result<BrushMesh, ShapeError>) -> usize {
        match self.shapes.replace(id, shape) {
            Some(r) => self.hierarchy.notify_shape_changed(id, r.hash),
            None => {
                log::warn!("replace_shape: shape {} was never registered", id.0);
                0
            }
        }
    }

    // --- structure ---

    /// Create a brush, appended under `parent` or detached.
    pub fn create_brush(&mut self, parent: Option<NodeId>, shape: Option<ShapeId>) -> NodeId {
        let shape = shape.and_then(|s| self.shapes.shape_ref(s));
        self.hierarchy.create_brush(shape, parent)
    }

    /// Create a branch, appended under `parent` or detached.
    pub fn create_branch(&mut self, parent: Option<NodeId>) -> NodeId {
        self.hierarchy.create_branch(parent)
    }

    /// Insert `id` as child `index` of `parent`. See [`Hierarchy::attach_to_parent`].
    pub fn attach(&mut self, parent: NodeId, index: usize, id: NodeId) {
        self.hierarchy.attach_to_parent(parent, index, id);
    }

    /// Take `id` out of the tree, keeping it for later re-attachment.
    pub fn detach(&mut self, id: NodeId) -> bool {
        self.hierarchy.detach(id)
    }

    /// Delete `id`, and with `recursive` everything below it.
    pub fn delete(&mut self, id: NodeId, recursive: bool) -> bool {
        self.hierarchy.delete(id, recursive)
    }

    /// Rewrite the hierarchy's storage without holes. Handles stay valid.
    pub fn compact(&mut self) {
        self.hierarchy.compact();
    }

    // --- state ---

    /// Set shape, operation and local transform together.
    pub fn set_state(
        &mut self,
        id: NodeId,
        shape: Option<ShapeId>,
        operation: CsgOperation,
        transform: DMat4,
    ) -> NodeStatusFlags {
        let shape = shape.and_then(|s| self.shapes.shape_ref(s));
        self.hierarchy.set_state(id, shape, operation, transform)
    }

    /// Point a brush at another shape, or at none.
    pub fn set_brush_shape(&mut self, id: NodeId, shape: Option<ShapeId>) -> NodeStatusFlags {
        let shape = shape.and_then(|s| self.shapes.shape_ref(s));
        self.hierarchy.set_shape(id, shape)
    }

    /// Set a node's operation.
    pub fn set_operation(&mut self, id: NodeId, operation: CsgOperation) -> NodeStatusFlags {
        self.hierarchy.set_operation(id, operation)
    }

    /// Set a node's local transform.
    pub fn set_transform(&mut self, id: NodeId, transform: DMat4) -> NodeStatusFlags {
        self.hierarchy.set_transform(id, transform)
    }

    // --- results ---

    /// Current output of a brush.
    pub fn render_buffer(&self, id: NodeId) -> Option<&Arc<RenderBuffer>> {
        self.brushes.get(&id)?.buffer.as_ref()
    }

    /// Brushes intersecting `id` as of the last cycle, in index order.
    pub fn intersections(&self, id: NodeId) -> &[BrushIntersection] {
        self.brushes
            .get(&id)
            .map_or(&[], |s| s.intersections.as_slice())
    }

    /// Cached tree-space shape of a brush.
    pub fn tree_space(&self, id: NodeId) -> Option<&Arc<TreeSpaceBrush>> {
        self.brushes.get(&id)?.geometry.as_ref()
    }

    // --- cycle ---

    /// Bring every render buffer up to date with the edits made since the last
    /// successful call.
    pub fn update(&mut self) -> Result<CycleOutput, CycleError> {
        if self.settings.check_consistency {
            self.hierarchy.check_consistency()?;
        }
        let scan = self.hierarchy.collect_dirty();
        if scan.is_empty() {
            // Flags that lead to no work, such as a root transform, are consumed too.
            self.hierarchy.acknowledge(&scan);
            return Ok(CycleOutput::default());
        }
        let scratch = self.evaluate(&scan)?;
        let output = self.commit(&scan, scratch);
        log::debug!(
            "cycle: {} rebuilt, {} refreshed, {}/{} pairs intersecting, {} updated, {} removed",
            output.stats.rebuilt,
            output.stats.refreshed,
            output.stats.intersecting_pairs,
            output.stats.candidate_pairs,
            output.updated.len(),
            output.removed.len(),
        );
        if !output.is_empty() {
            for listener in &mut self.listeners {
                listener.on_cycle_complete(&output);
            }
        }
        Ok(output)
    }

    fn evaluate(&self, scan: &DirtyScan) -> Result<CycleScratch, CycleError> {
        let settings = &self.settings;
        let mut scratch = CycleScratch::reserve(scan)?;

        // Tree-space shapes and bounds of every brush that changed or moved.
        let mut inputs = Vec::new();
        inputs.try_reserve(scan.rebuild.len() + scan.transform_only.len())?;
        for &id in scan.rebuild.iter().chain(&scan.transform_only) {
            let mesh = self
                .hierarchy
                .shape(id)
                .and_then(|s| self.shapes.get(s.id))
                .cloned();
            inputs.push((id, mesh, self.hierarchy.node_to_tree(id)));
        }
        let placed: Vec<(NodeId, Option<Arc<TreeSpaceBrush>>)> = inputs
            .into_par_iter()
            .map(|(id, mesh, transform)| {
                let Some((mesh, transform)) = mesh.zip(transform) else {
                    return (id, None);
                };
                let placed = TreeSpaceBrush::new(mesh, transform);
                if placed.is_none() {
                    log::warn!("brush {id:?} has a singular transform and produces no geometry");
                }
                (id, placed.map(Arc::new))
            })
            .collect();
        for (id, g) in placed {
            scratch.bounds.insert(id, g.as_ref().map(|g| g.bounds()));
            scratch.geometry.insert(id, g);
        }
        log::trace!("placed {} brushes", scratch.geometry.len());

        let tree = CompactTree::build(&self.hierarchy)?;
        let view = BoundsView::new(&self.hierarchy, &scratch.bounds);
        let padding = settings.plane_epsilon;

        // Everything whose output may depend on what changed.
        let mut rebuild: HashSet<NodeId> = scan.rebuild.iter().copied().collect();
        let mut refresh = Vec::new();
        for &id in &scan.transform_only {
            if view.has_overlap(&tree, id, padding) {
                rebuild.insert(id);
            } else {
                refresh.push(id);
            }
        }
        let touch_around = |id: NodeId, rebuild: &mut HashSet<NodeId>| {
            if let Some(bounds) = view.bounds(id) {
                rebuild.extend(
                    view.query(bounds.inflate(padding))
                        .into_iter()
                        .filter(|&other| other != id && tree.index_of(other).is_some()),
                );
            }
            self.previous_partners(id, &tree, rebuild);
        };
        for &id in &scan.touching {
            touch_around(id, &mut rebuild);
        }
        for &id in &scan.departed {
            self.previous_partners(id, &tree, &mut rebuild);
        }
        // An intersection empties the siblings before it even where nothing overlaps.
        if self.had_intersecting || tree.has_intersecting() {
            for id in self.clipped_by_changes(scan, &tree) {
                rebuild.insert(id);
                touch_around(id, &mut rebuild);
            }
        }
        refresh.retain(|id| !rebuild.contains(id));

        scratch
            .rebuild
            .extend(rebuild.iter().filter_map(|&id| tree.index_of(id)));
        scratch.rebuild.sort_unstable();
        scratch
            .refresh
            .extend(refresh.iter().filter_map(|&id| tree.index_of(id)));
        scratch.refresh.sort_unstable();
        log::trace!(
            "closure: {} to rebuild, {} to refresh",
            scratch.rebuild.len(),
            scratch.refresh.len()
        );

        // Broad phase.
        let candidates: Vec<_> = scratch
            .rebuild
            .par_iter()
            .map(|&brush| find_candidates(brush, &view, &tree, padding))
            .collect();
        let mut pairs: Vec<(IndexOrder, IndexOrder)> = Vec::new();
        pairs.try_reserve(candidates.iter().map(Vec::len).sum())?;
        pairs.extend(candidates.into_iter().flatten().map(|c| c.unordered()));
        pairs.sort_unstable();
        pairs.dedup();

        // Narrow phase.
        let geometry = GeometryView {
            pending: &scratch.geometry,
            cached: &self.brushes,
        };
        let intersections: Vec<PairIntersection> = pairs
            .par_iter()
            .map(|&(a, b)| match (geometry.get(a.id), geometry.get(b.id)) {
                (Some(ga), Some(gb)) => intersect_pair(ga, gb, settings),
                _ => PairIntersection::default(),
            })
            .collect();

        let mut by_brush: HashMap<u32, Vec<(usize, bool)>> = HashMap::new();
        for (k, ((a, b), r)) in pairs.iter().zip(&intersections).enumerate() {
            if r.kind == IntersectionKind::None {
                continue;
            }
            by_brush.entry(a.index).or_default().push((k, true));
            by_brush.entry(b.index).or_default().push((k, false));
        }

        // Categorization and buffers.
        let work: Vec<IndexOrder> = scratch
            .rebuild
            .iter()
            .chain(&scratch.refresh)
            .copied()
            .collect();
        let results: Vec<BrushResult> = work
            .par_iter()
            .map(|&brush| {
                let Some(shape) = geometry.get(brush.id) else {
                    return BrushResult {
                        brush,
                        buffer: None,
                        intersections: Vec::new(),
                    };
                };
                let entries = by_brush.get(&brush.index).map_or(&[][..], Vec::as_slice);
                let mut neighbors = Vec::with_capacity(entries.len());
                let mut records = Vec::with_capacity(entries.len());
                for &(k, first) in entries {
                    let (a, b) = pairs[k];
                    let other = if first { b } else { a };
                    let Some(other_shape) = geometry.get(other.id) else {
                        continue;
                    };
                    let r = &intersections[k];
                    neighbors.push(Neighbor {
                        index: other.index,
                        brush: other_shape,
                        loops: r.loops_of(first),
                        seeds: &r.vertices,
                    });
                    records.push(BrushIntersection {
                        other,
                        kind: r.kind_of(first),
                        ancestors: tree.ancestor_range(other.index),
                    });
                }
                records.sort_by_key(|r| r.other.index);
                let categorized = categorize(brush.index, shape, &neighbors, &tree, settings);
                let buffer = build_render_buffer(brush.id, shape, &categorized, settings);
                BrushResult {
                    brush,
                    buffer: buffer.map(Arc::new),
                    intersections: records,
                }
            })
            .collect();

        scratch.stats = CycleStats {
            rebuilt: scratch.rebuild.len(),
            refreshed: scratch.refresh.len(),
            candidate_pairs: pairs.len(),
            intersecting_pairs: intersections
                .iter()
                .filter(|r| r.kind != IntersectionKind::None)
                .count(),
        };
        scratch.pair_kinds = intersections.iter().map(|r| r.kind).collect();
        scratch.pairs = pairs;
        scratch.results = results;
        scratch.tree = tree;
        Ok(scratch)
    }

    /// Brushes whose result may have changed because an `Intersecting` node
    /// after them changed, appeared or went away.
    fn clipped_by_changes(&self, scan: &DirtyScan, tree: &CompactTree) -> HashSet<NodeId> {
        let mut clipped = HashSet::new();
        for (at, node) in (0..).zip(tree.nodes()) {
            let flags = self
                .hierarchy
                .status_flags(node.id)
                .unwrap_or(NodeStatusFlags::empty());
            if flags.is_empty() {
                continue;
            }
            // The child set changed: a departed sibling may have been intersecting.
            if flags.contains(NodeStatusFlags::BRANCH_NEEDS_UPDATE) {
                clipped.extend(tree.brushes_between(at + 1..node.subtree_end).map(|o| o.id));
            }
            if node.operation == CsgOperation::Intersecting
                || flags.contains(NodeStatusFlags::OPERATION_MODIFIED)
            {
                clipped.extend(tree.preceding_siblings(at).map(|o| o.id));
            }
        }
        // Changes inside an intersecting branch reach the siblings before it.
        for &id in scan.rebuild.iter().chain(&scan.touching) {
            let Some(order) = tree.index_of(id) else {
                continue;
            };
            let mut at = Some(tree.node_of(order.index));
            while let Some(n) = at {
                let node = &tree.nodes()[n as usize];
                if node.operation == CsgOperation::Intersecting {
                    clipped.extend(tree.preceding_siblings(n).map(|o| o.id));
                }
                at = node.parent;
            }
        }
        clipped
    }

    fn previous_partners(&self, id: NodeId, tree: &CompactTree, out: &mut HashSet<NodeId>) {
        let Some(state) = self.brushes.get(&id) else {
            return;
        };
        out.extend(
            state
                .intersections
                .iter()
                .map(|r| r.other.id)
                .filter(|&other| tree.index_of(other).is_some()),
        );
    }

    fn commit(&mut self, scan: &DirtyScan, scratch: CycleScratch) -> CycleOutput {
        let CycleScratch {
            geometry,
            bounds,
            pairs,
            pair_kinds,
            results,
            tree,
            stats,
            ..
        } = scratch;
        let mut output = CycleOutput {
            stats,
            ..CycleOutput::default()
        };

        for (id, b) in bounds {
            if self.hierarchy.set_bounds(id, b) {
                output.bounds_changed.push(id);
            }
        }
        self.hierarchy.commit_bounds();
        for (id, g) in geometry {
            self.brushes.entry(id).or_default().geometry = g;
        }

        let mut evaluated: HashSet<NodeId> = HashSet::with_capacity(results.len());
        for result in results {
            let id = result.brush.id;
            evaluated.insert(id);
            let state = self.brushes.entry(id).or_default();
            let previous = state.buffer.as_ref();
            let geometry_changed =
                previous.map(|b| b.geometry_hash) != result.buffer.as_ref().map(|b| b.geometry_hash);
            let surface_changed =
                previous.map(|b| b.surface_hash) != result.buffer.as_ref().map(|b| b.surface_hash);
            state.buffer = result.buffer;
            state.intersections = result.intersections;
            if geometry_changed || surface_changed {
                output.updated.push(BrushUpdate {
                    brush: id,
                    buffer: state.buffer.clone(),
                    geometry_changed,
                    surface_changed,
                });
            }
        }

        // Partners that were not re-evaluated still see the new relation.
        for (&(a, b), &kind) in pairs.iter().zip(&pair_kinds) {
            for (this, other, kind) in [(a, b, kind), (b, a, kind.reversed())] {
                if evaluated.contains(&this.id) {
                    continue;
                }
                let Some(state) = self.brushes.get_mut(&this.id) else {
                    continue;
                };
                state.intersections.retain(|r| r.other.id != other.id);
                if kind != IntersectionKind::None {
                    state.intersections.push(BrushIntersection {
                        other,
                        kind,
                        ancestors: tree.ancestor_range(other.index),
                    });
                    state.intersections.sort_by_key(|r| r.other.index);
                }
            }
        }

        for &id in &scan.departed {
            if self.brushes.remove(&id).is_some() {
                output.removed.push(id);
            }
        }

        if scan.topology_changed {
            // Indices and ancestor ranges refer to this cycle's tree.
            for state in self.brushes.values_mut() {
                state.intersections.retain_mut(|r| match tree.index_of(r.other.id) {
                    Some(other) => {
                        r.other = other;
                        r.ancestors = tree.ancestor_range(other.index);
                        true
                    }
                    None => false,
                });
                state.intersections.sort_by_key(|r| r.other.index);
            }
        }

        self.hierarchy.acknowledge(scan);
        self.had_intersecting = tree.has_intersecting();
        output.updated.sort_by_key(|u| tree.index_of(u.brush).map(|o| o.index));
        output.bounds_changed.sort_unstable();
        output.removed.sort_unstable();
        output
    }
}
