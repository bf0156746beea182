// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hierarchy edits.
//!
//! Group brushes under branches, move a branch, detach and re-attach a brush,
//! delete a branch recursively, and check the hierarchy after each step.
//!
//! Run:
//! - `RUST_LOG=trace cargo run -p brushwork_demos --example hierarchy_edits`

use brushwork_csg::{BrushMesh, CsgOperation, CsgTree};
use brushwork_index::Aabb3D;
use glam::{DMat4, DVec3};

fn check(csg: &CsgTree, step: &str) {
    csg.hierarchy()
        .check_consistency()
        .unwrap_or_else(|e| panic!("{step}: {e}"));
}

fn main() {
    env_logger::init();

    let mut csg = CsgTree::default();
    let wall = csg.add_shape(BrushMesh::cuboid(DVec3::ZERO, DVec3::new(4.0, 0.5, 3.0)));
    let door = csg.add_shape(BrushMesh::cuboid(
        DVec3::new(1.5, -0.5, 0.0),
        DVec3::new(2.5, 1.0, 2.0),
    ));

    let root = csg.root();
    let house = csg.create_branch(Some(root));
    let front = csg.create_brush(Some(house), Some(wall));
    let doorway = csg.create_brush(Some(house), Some(door));
    csg.set_operation(doorway, CsgOperation::Subtractive);
    let back = csg.create_brush(Some(house), Some(wall));
    csg.set_transform(back, DMat4::from_translation(DVec3::Y * 4.0));
    check(&csg, "build");

    let out = csg.update().expect("build cycle");
    println!("built: {} buffers", out.updated.len());
    log::info!("intersections of the front wall: {:?}", csg.intersections(front));

    // Moving the branch moves every brush below it.
    csg.set_transform(house, DMat4::from_translation(DVec3::X * 10.0));
    let out = csg.update().expect("move cycle");
    println!("moved: bounds changed for {:?}", out.bounds_changed);
    let probe = Aabb3D::new(10.0, 0.0, 0.0, 14.0, 0.5, 3.0);
    let hits: Vec<_> = csg.hierarchy().query_bounds(probe).collect();
    println!("brushes near the front wall: {hits:?}");

    // Take the doorway out and put it back.
    csg.detach(doorway);
    let out = csg.update().expect("detach cycle");
    println!("detached: removed {:?}", out.removed);
    csg.attach(house, 1, doorway);
    let out = csg.update().expect("attach cycle");
    println!("re-attached: {} buffers updated", out.updated.len());
    check(&csg, "re-attach");

    // A branch with children needs a recursive delete.
    assert!(!csg.delete(house, false));
    assert!(csg.delete(house, true));
    let out = csg.update().expect("delete cycle");
    println!("deleted: removed {:?}", out.removed);
    check(&csg, "delete");

    csg.compact();
    check(&csg, "compact");
    println!("{} nodes left", csg.hierarchy().len());
}
