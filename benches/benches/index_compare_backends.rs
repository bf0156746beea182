// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use brushwork_index::{Aabb3D, Index};
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn gen_grid_boxes(n: usize, cell: f64) -> Vec<Aabb3D<f64>> {
    let mut out = Vec::with_capacity(n * n * 4);
    for z in 0..4 {
        for y in 0..n {
            for x in 0..n {
                let x0 = x as f64 * cell;
                let y0 = y as f64 * cell;
                let z0 = z as f64 * cell;
                out.push(Aabb3D::<f64>::from_origin_size(x0, y0, z0, cell, cell, cell));
            }
        }
    }
    out
}

fn gen_grid_boxes_f32(n: usize, cell: f32) -> Vec<Aabb3D<f32>> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f32 * cell;
            let y0 = y as f32 * cell;
            out.push(Aabb3D::<f32>::from_origin_size(x0, y0, 0.0, cell, cell, cell));
        }
    }
    out
}

/// Brush-like boxes: overlapping neighbours, as in a level built from
/// slightly oversized blocks.
fn gen_overlap_grid_boxes(n: usize, cell: f64, scale: f64) -> Vec<Aabb3D<f64>> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            let s = cell * scale;
            out.push(Aabb3D::<f64>::from_origin_size(x0, y0, 0.0, s, s, s));
        }
    }
    out
}

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_random_boxes(count: usize, extent: f64, size: f64) -> Vec<Aabb3D<f64>> {
    let mut out = Vec::with_capacity(count);
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    for _ in 0..count {
        let x0 = rng.next_f64() * (extent - size).max(1.0);
        let y0 = rng.next_f64() * (extent - size).max(1.0);
        let z0 = rng.next_f64() * (extent - size).max(1.0) * 0.25;
        out.push(Aabb3D::<f64>::from_origin_size(x0, y0, z0, size, size, size));
    }
    out
}

fn gen_clustered_boxes(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<Aabb3D<f64>> {
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut centers = Vec::with_capacity(n_clusters);
    for _ in 0..n_clusters {
        centers.push((rng.next_f64() * 2000.0, rng.next_f64() * 2000.0));
    }
    for (cx, cy) in centers {
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            let dz = rng.next_f64() * spread * 0.25;
            out.push(Aabb3D::<f64>::from_origin_size(cx + dx, cy + dy, dz, 12.0, 12.0, 12.0));
        }
    }
    out
}

fn query_window() -> Aabb3D<f64> {
    Aabb3D::<f64>::from_origin_size(100.0, 100.0, 0.0, 400.0, 400.0, 40.0)
}

fn bench_flatvec(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatvec");
    for &n in &[16usize, 32, 64] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_function(format!("insert_commit_box_n{}", n), |b| {
            b.iter_batched(
                Index::<f64, u32>::new,
                |mut idx| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        let _ = idx.insert(r, i as u32);
                    }
                    let _ = idx.commit();
                    let hits: usize = idx.query_box(query_window()).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");
    for &n in &[16usize, 32, 64] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_function(format!("insert_commit_box_n{}", n), |b| {
            b.iter_batched(
                || Index::<f64, u32>::with_uniform_grid(32.0),
                |mut idx| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        let _ = idx.insert(r, i as u32);
                    }
                    let _ = idx.commit();
                    let hits: usize = idx.query_box(query_window()).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    let boxes = gen_random_boxes(4096, 2000.0, 12.0);
    group.bench_function("insert_commit_box_random", |b| {
        b.iter_batched(
            || Index::<f64, u32>::with_uniform_grid(32.0),
            |mut idx| {
                for (i, r) in boxes.iter().copied().enumerate() {
                    let _ = idx.insert(r, i as u32);
                }
                let _ = idx.commit();
                let hits: usize = idx
                    .query_box(Aabb3D::<f64>::from_origin_size(800.0, 800.0, 0.0, 400.0, 400.0, 500.0))
                    .count();
                black_box(hits);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_bvh(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_f64");
    for &n in &[16usize, 32, 64] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_function(format!("insert_commit_box_n{}", n), |b| {
            b.iter_batched(
                Index::<f64, u32>::with_bvh,
                |mut idx| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        let _ = idx.insert(r, i as u32);
                    }
                    let _ = idx.commit();
                    let hits: usize = idx.query_box(query_window()).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    let boxes = gen_overlap_grid_boxes(64, 10.0, 1.5);
    group.bench_function("insert_commit_box_overlap", |b| {
        b.iter_batched(
            Index::<f64, u32>::with_bvh,
            |mut idx| {
                for (i, r) in boxes.iter().copied().enumerate() {
                    let _ = idx.insert(r, i as u32);
                }
                let _ = idx.commit();
                let hits: usize = idx.query_box(query_window()).count();
                black_box(hits);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_bvh_f32(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_f32");
    for &n in &[32usize, 64, 128] {
        let boxes = gen_grid_boxes_f32(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("insert_commit_box_n{}", n), |b| {
            b.iter_batched(
                Index::<f32, u32>::with_bvh,
                |mut idx| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        let _ = idx.insert(r, i as u32);
                    }
                    let _ = idx.commit();
                    let hits: usize = idx
                        .query_box(Aabb3D::<f32>::from_origin_size(
                            100.0, 100.0, 0.0, 400.0, 400.0, 10.0,
                        ))
                        .count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Every brush moves a little and the index is committed once, as after a
/// branch transform edit.
fn bench_update_heavy_bvh(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_f64_update_heavy");
    let boxes = gen_overlap_grid_boxes(64, 10.0, 1.5);
    group.bench_function("update_move_then_commit", |b| {
        b.iter_batched(
            || {
                let mut idx = Index::<f64, u32>::with_bvh();
                let mut keys = Vec::new();
                for (i, r) in boxes.iter().copied().enumerate() {
                    keys.push(idx.insert(r, i as u32));
                }
                let _ = idx.commit();
                (idx, keys)
            },
            |(mut idx, keys)| {
                for (k, r) in keys.into_iter().zip(&boxes) {
                    idx.update(k, r.inflate(0.5));
                }
                let _ = idx.commit();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

/// Broad-phase shape: one box query per brush.
fn bench_query_heavy_bvh(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_f64_query_heavy");
    let boxes = gen_overlap_grid_boxes(64, 8.0, 1.25);
    group.bench_function("build_then_query_every_box", |b| {
        b.iter_batched(
            || {
                let mut idx = Index::<f64, u32>::with_bvh();
                for (i, r) in boxes.iter().copied().enumerate() {
                    let _ = idx.insert(r, i as u32);
                }
                let _ = idx.commit();
                idx
            },
            |idx| {
                let mut total = 0usize;
                for r in &boxes {
                    total += idx.query_box(r.inflate(1e-5)).count();
                }
                black_box(total);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_bvh_clustered(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_f64_clustered");
    let boxes = gen_clustered_boxes(16, 256, 128.0);
    group.bench_function("insert_commit_query", |b| {
        b.iter_batched(
            Index::<f64, u32>::with_bvh,
            |mut idx| {
                for (i, r) in boxes.iter().copied().enumerate() {
                    let _ = idx.insert(r, i as u32);
                }
                let _ = idx.commit();
                let hits = idx
                    .query_box(Aabb3D::<f64>::from_origin_size(800.0, 800.0, 0.0, 400.0, 400.0, 64.0))
                    .count();
                black_box(hits);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_flatvec,
    bench_grid,
    bench_bvh,
    bench_bvh_f32,
    bench_update_heavy_bvh,
    bench_query_heavy_bvh,
    bench_bvh_clustered,
);
criterion_main!(benches);
