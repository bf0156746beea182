// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use brushwork_csg::{BrushMesh, CsgOperation, CsgTree, NodeId};
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::{DMat4, DVec3};

/// An `n` by `n` floor of slightly oversized blocks, every third one carving.
fn build_floor(n: usize) -> (CsgTree, Vec<NodeId>) {
    let mut csg = CsgTree::default();
    let block = csg.add_shape(BrushMesh::cuboid(DVec3::ZERO, DVec3::new(1.25, 1.25, 1.0)));
    let pillar = csg.add_shape(BrushMesh::cylinder(0.3, 2.0, 12));
    let root = csg.root();
    let mut brushes = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let i = y * n + x;
            let shape = if i % 5 == 4 { pillar } else { block };
            let id = csg.create_brush(Some(root), Some(shape));
            csg.set_transform(
                id,
                DMat4::from_translation(DVec3::new(x as f64, y as f64, 0.0)),
            );
            if i % 3 == 2 {
                csg.set_operation(id, CsgOperation::Subtractive);
            }
            brushes.push(id);
        }
    }
    (csg, brushes)
}

fn bench_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("csg_full_cycle");
    group.sample_size(20);
    for &n in &[4usize, 8, 16] {
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("floor_n{}", n), |b| {
            b.iter_batched(
                || build_floor(n).0,
                |mut csg| {
                    let out = csg.update().unwrap();
                    black_box(out.stats);
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_incremental_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("csg_incremental");
    group.sample_size(20);
    let n = 16;
    group.bench_function("move_one_brush_n16", |b| {
        b.iter_batched(
            || {
                let (mut csg, brushes) = build_floor(n);
                csg.update().unwrap();
                (csg, brushes[n * n / 2 + n / 2])
            },
            |(mut csg, id)| {
                csg.set_transform(id, DMat4::from_translation(DVec3::new(8.3, 8.1, 0.2)));
                let out = csg.update().unwrap();
                black_box(out.stats);
            },
            BatchSize::LargeInput,
        )
    });
    group.bench_function("idle_update_n16", |b| {
        let (mut csg, _) = build_floor(n);
        csg.update().unwrap();
        b.iter(|| black_box(csg.update().unwrap().is_empty()));
    });
    group.finish();
}

criterion_group!(benches, bench_full_cycle, bench_incremental_move);
criterion_main!(benches);
