// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CSG basics.
//!
//! Carve a notch out of a block, move the cutter, and print what each cycle
//! changed.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p brushwork_demos --example csg_basics`

use brushwork_csg::{BrushMesh, CsgOperation, CsgTree, CycleOutput, RenderBuffer};
use glam::{DMat4, DVec3};

fn describe(label: &str, out: &CycleOutput) {
    println!(
        "{label}: {} rebuilt, {} refreshed, {} of {} pairs intersecting",
        out.stats.rebuilt,
        out.stats.refreshed,
        out.stats.intersecting_pairs,
        out.stats.candidate_pairs,
    );
    for u in &out.updated {
        println!(
            "  {:?}: geometry changed {}, surface changed {}, {} triangles",
            u.brush,
            u.geometry_changed,
            u.surface_changed,
            u.buffer.as_deref().map_or(0, RenderBuffer::triangle_count),
        );
    }
    if !out.removed.is_empty() {
        println!("  removed: {:?}", out.removed);
    }
}

fn main() {
    env_logger::init();

    let mut csg = CsgTree::default();
    let block = csg.add_shape(BrushMesh::cuboid(DVec3::ZERO, DVec3::splat(2.0)));
    let cutter = csg.add_shape(BrushMesh::cylinder(0.5, 4.0, 16));

    let root = csg.root();
    let a = csg.create_brush(Some(root), Some(block));
    let b = csg.create_brush(Some(root), Some(cutter));
    csg.set_operation(b, CsgOperation::Subtractive);
    csg.set_transform(b, DMat4::from_translation(DVec3::new(1.0, 1.0, -1.0)));

    let out = csg.update().expect("first cycle");
    describe("drill", &out);

    // Slide the cutter to a corner: both brushes are recomputed.
    csg.set_transform(b, DMat4::from_translation(DVec3::new(2.0, 2.0, -1.0)));
    let out = csg.update().expect("second cycle");
    describe("slide", &out);

    // Nothing changed since the last cycle.
    let out = csg.update().expect("idle cycle");
    assert!(out.is_empty());

    let buffer = csg.render_buffer(a).expect("the block is visible");
    for s in &buffer.surfaces {
        println!(
            "  surface {} (reversed {}): {} triangles, material {}",
            s.surface,
            s.reversed,
            s.indices.len() / 3,
            s.material
        );
    }
}
