// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Basic usage of Brushwork Index: insert, update, commit damage, and query.

use brushwork_index::{Aabb3D, Index};

fn main() {
    let mut idx = Index::<f64, u32>::with_bvh();
    let k1 = idx.insert(Aabb3D::new(0.0, 0.0, 0.0, 10.0, 10.0, 10.0), 1);
    let _k2 = idx.insert(Aabb3D::new(5.0, 5.0, 5.0, 15.0, 15.0, 15.0), 2);
    let _ = idx.commit();

    // Move box 1
    idx.update(k1, Aabb3D::new(20.0, 0.0, 0.0, 30.0, 10.0, 10.0));
    let dmg = idx.commit();
    println!(
        "damage: added={:?}, removed={:?}, moved={:?}",
        dmg.added, dmg.removed, dmg.moved
    );

    // Query a point
    let hits: Vec<_> = idx.query_point(6.0, 6.0, 6.0).collect();
    println!("hits at (6,6,6): {:?}", hits);
}
