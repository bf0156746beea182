// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Triangulation of merged surface fragments.
//!
//! Fragments of one surface share edges. Those shared edges are split where a
//! neighbour's corner lies on them (T-junctions), interior edges cancel against
//! their reverse, and what remains is the outline of the surface: outer loops
//! and holes. Each outer loop is triangulated together with its holes.

use glam::{DVec2, DVec3};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::brush_mesh::ring;
use crate::plane::tangent_axes;

/// Triangulate fragments lying on one plane.
///
/// `rings` index into `positions` and wind counter-clockwise around `normal`.
/// Triangles wind the same way.
pub fn triangulate_surface(
    positions: &[DVec3],
    rings: &[Vec<u32>],
    normal: DVec3,
    weld_epsilon: f64,
) -> Vec<[u32; 3]> {
    let (u, v) = tangent_axes(normal);
    let flat = |i: u32| {
        let p = positions[i as usize];
        DVec2::new(p.dot(u), p.dot(v))
    };

    let mut used: Vec<u32> = rings.iter().flatten().copied().collect();
    used.sort_unstable();
    used.dedup();

    let refined: Vec<Vec<u32>> = rings
        .iter()
        .map(|r| split_t_junctions(positions, r, &used, weld_epsilon))
        .collect();
    let outline = outline_edges(&refined);
    let loops = chain_loops(outline, &flat);

    let mut outers: Vec<(Vec<u32>, f64)> = Vec::new();
    let mut holes: Vec<Vec<u32>> = Vec::new();
    for l in loops {
        let area = signed_area(l.iter().map(|&i| flat(i)));
        if area > 0.0 {
            outers.push((l, area));
        } else if area < 0.0 {
            holes.push(l);
        }
    }

    let mut holes_of: Vec<Vec<Vec<u32>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let best = outers
            .iter()
            .enumerate()
            .map(|(k, (outer, area))| {
                let outer2d: Vec<DVec2> = outer.iter().map(|&i| flat(i)).collect();
                let inside = hole
                    .iter()
                    .filter(|&&i| point_in_polygon(flat(i), &outer2d))
                    .count();
                (k, inside, *area)
            })
            .filter(|&(_, inside, _)| inside > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.total_cmp(&a.2)));
        match best {
            Some((k, _, _)) => holes_of[k].push(hole),
            None => log::trace!("dropping a hole outside every outer loop"),
        }
    }

    let mut triangles = Vec::new();
    for ((outer, _), holes) in outers.iter().zip(&holes_of) {
        earcut_loops(outer, holes, &flat, &mut triangles);
    }
    triangles
}

/// Insert corners from `candidates` that lie on the edges of `ring`.
fn split_t_junctions(positions: &[DVec3], ring_in: &[u32], candidates: &[u32], eps: f64) -> Vec<u32> {
    let mut out = Vec::with_capacity(ring_in.len());
    for (a, b) in ring(ring_in) {
        out.push(a);
        let pa = positions[a as usize];
        let ab = positions[b as usize] - pa;
        let len2 = ab.length_squared();
        if len2 <= eps * eps {
            continue;
        }
        let mut on: SmallVec<[(f64, u32); 4]> = SmallVec::new();
        for &c in candidates {
            if c == a || c == b {
                continue;
            }
            let pc = positions[c as usize];
            let t = (pc - pa).dot(ab) / len2;
            if t <= 0.0 || t >= 1.0 {
                continue;
            }
            if (pa + ab * t).distance_squared(pc) <= eps * eps {
                on.push((t, c));
            }
        }
        on.sort_by(|x, y| x.0.total_cmp(&y.0));
        out.extend(on.into_iter().map(|(_, c)| c));
    }
    out
}

/// Directed edges left after every edge cancels against its reverse.
fn outline_edges(rings: &[Vec<u32>]) -> Vec<(u32, u32)> {
    let mut count: HashMap<(u32, u32), u32> = HashMap::new();
    for r in rings {
        for (a, b) in ring(r) {
            if a == b {
                continue;
            }
            match count.get_mut(&(b, a)) {
                Some(c) if *c > 0 => *c -= 1,
                _ => *count.entry((a, b)).or_insert(0) += 1,
            }
        }
    }
    let mut edges: Vec<(u32, u32)> = count
        .into_iter()
        .flat_map(|(e, c)| core::iter::repeat_n(e, c as usize))
        .collect();
    edges.sort_unstable();
    edges
}

/// Chain directed edges into closed loops.
///
/// Where several edges leave one vertex, the sharpest left turn is taken, which
/// separates loops that only touch at a corner.
fn chain_loops(edges: Vec<(u32, u32)>, flat: &impl Fn(u32) -> DVec2) -> Vec<Vec<u32>> {
    let mut outgoing: HashMap<u32, SmallVec<[u32; 2]>> = HashMap::new();
    for &(a, b) in &edges {
        outgoing.entry(a).or_default().push(b);
    }
    let mut loops = Vec::new();
    for &(start, _) in &edges {
        while let Some(first) = take_edge(&mut outgoing, start, None, flat) {
            let mut l = vec![start];
            let (mut prev, mut cur) = (start, first);
            let mut closed = true;
            while cur != start {
                l.push(cur);
                match take_edge(&mut outgoing, cur, Some(prev), flat) {
                    Some(next) => (prev, cur) = (cur, next),
                    None => {
                        closed = false;
                        break;
                    }
                }
            }
            if closed && l.len() >= 3 {
                loops.push(l);
            } else if !closed {
                log::trace!("dropping an open outline chain of {} vertices", l.len());
            }
        }
    }
    loops
}

fn take_edge(
    outgoing: &mut HashMap<u32, SmallVec<[u32; 2]>>,
    at: u32,
    from: Option<u32>,
    flat: &impl Fn(u32) -> DVec2,
) -> Option<u32> {
    let list = outgoing.get_mut(&at)?;
    if list.is_empty() {
        return None;
    }
    let pick = match from {
        Some(prev) if list.len() > 1 => {
            let d_in = flat(at) - flat(prev);
            let turn = |to: u32| {
                let d_out = flat(to) - flat(at);
                d_in.perp_dot(d_out).atan2(d_in.dot(d_out))
            };
            (0..list.len())
                .max_by(|&x, &y| turn(list[x]).total_cmp(&turn(list[y])))
                .unwrap_or(0)
        }
        _ => list.len() - 1,
    };
    Some(list.swap_remove(pick))
}

fn signed_area(points: impl Iterator<Item = DVec2> + Clone) -> f64 {
    let pts: SmallVec<[DVec2; 8]> = points.collect();
    ring(&pts).map(|(a, b)| a.perp_dot(b)).sum::<f64>() * 0.5
}

fn point_in_polygon(p: DVec2, polygon: &[DVec2]) -> bool {
    let mut inside = false;
    for (a, b) in ring(polygon) {
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn earcut_loops(
    outer: &[u32],
    holes: &[Vec<u32>],
    flat: &impl Fn(u32) -> DVec2,
    out: &mut Vec<[u32; 3]>,
) {
    let ids: Vec<u32> = outer.iter().chain(holes.iter().flatten()).copied().collect();
    let mut data = Vec::with_capacity(ids.len() * 2);
    for &i in &ids {
        let p = flat(i);
        data.push(p.x);
        data.push(p.y);
    }
    let mut hole_starts = Vec::with_capacity(holes.len());
    let mut at = outer.len();
    for h in holes {
        hole_starts.push(at);
        at += h.len();
    }
    let indices = match earcutr::earcut(&data, &hole_starts, 2) {
        Ok(indices) => indices,
        Err(e) => {
            log::warn!("triangulation of a {}-corner outline failed: {e:?}", ids.len());
            return;
        }
    };
    for t in indices.chunks_exact(3) {
        let [a, b, c] = [ids[t[0]], ids[t[1]], ids[t[2]]];
        let area = (flat(b) - flat(a)).perp_dot(flat(c) - flat(a));
        if area > 0.0 {
            out.push([a, b, c]);
        } else if area < 0.0 {
            out.push([a, c, b]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<DVec3> {
        let mut out = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                out.push(DVec3::new(x as f64, y as f64, 0.0));
            }
        }
        out
    }

    fn id(n: usize, x: usize, y: usize) -> u32 {
        u32::try_from(y * (n + 1) + x).unwrap()
    }

    fn total_area(positions: &[DVec3], tris: &[[u32; 3]]) -> f64 {
        tris.iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (positions[a as usize], positions[b as usize], positions[c as usize]);
                (b - a).cross(c - a).z * 0.5
            })
            .sum()
    }

    #[test]
    fn single_square() {
        let p = grid(1);
        let ring = vec![id(1, 0, 0), id(1, 1, 0), id(1, 1, 1), id(1, 0, 1)];
        let tris = triangulate_surface(&p, &[ring], DVec3::Z, 1e-9);
        assert_eq!(tris.len(), 2);
        assert!((total_area(&p, &tris) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ring_of_fragments_leaves_a_hole() {
        // Eight unit squares around the centre of a 3x3 grid.
        let n = 3;
        let p = grid(n);
        let mut rings = Vec::new();
        for y in 0..n {
            for x in 0..n {
                if x == 1 && y == 1 {
                    continue;
                }
                rings.push(vec![id(n, x, y), id(n, x + 1, y), id(n, x + 1, y + 1), id(n, x, y + 1)]);
            }
        }
        let tris = triangulate_surface(&p, &rings, DVec3::Z, 1e-9);
        assert!((total_area(&p, &tris) - 8.0).abs() < 1e-9);
        assert!(
            tris.iter().all(|t| t.iter().all(|&v| p[v as usize].z == 0.0)),
            "all corners stay on the plane"
        );
        // Every triangle faces +Z.
        for &[a, b, c] in &tris {
            let n = (p[b as usize] - p[a as usize]).cross(p[c as usize] - p[a as usize]);
            assert!(n.z > 0.0);
        }
    }

    #[test]
    fn t_junctions_are_split() {
        // A 2x1 rectangle next to two unit squares: the midpoint of the
        // rectangle's long edge is a corner of the squares.
        let n = 2;
        let p = grid(n);
        let rect = vec![id(n, 0, 0), id(n, 2, 0), id(n, 2, 1), id(n, 0, 1)];
        let a = vec![id(n, 0, 1), id(n, 1, 1), id(n, 1, 2), id(n, 0, 2)];
        let b = vec![id(n, 1, 1), id(n, 2, 1), id(n, 2, 2), id(n, 1, 2)];
        let tris = triangulate_surface(&p, &[rect, a, b], DVec3::Z, 1e-9);
        assert!((total_area(&p, &tris) - 4.0).abs() < 1e-9);
        // Merged into one outline: the middle vertex between the squares is interior.
        let mid = id(n, 1, 1);
        assert!(tris.iter().all(|t| !t.contains(&mid)), "interior vertex needs no triangle");
    }

    #[test]
    fn fragments_touching_at_a_corner_stay_separate() {
        let n = 2;
        let p = grid(n);
        let a = vec![id(n, 0, 0), id(n, 1, 0), id(n, 1, 1), id(n, 0, 1)];
        let b = vec![id(n, 1, 1), id(n, 2, 1), id(n, 2, 2), id(n, 1, 2)];
        let tris = triangulate_surface(&p, &[a, b], DVec3::Z, 1e-9);
        assert_eq!(tris.len(), 4);
        assert!((total_area(&p, &tris) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn facing_down_keeps_the_winding() {
        let p = grid(1);
        // Counter-clockwise seen from -Z.
        let ring = vec![id(1, 0, 0), id(1, 0, 1), id(1, 1, 1), id(1, 1, 0)];
        let tris = triangulate_surface(&p, &[ring], DVec3::NEG_Z, 1e-9);
        assert_eq!(tris.len(), 2);
        assert!((total_area(&p, &tris) + 1.0).abs() < 1e-12, "triangles face -Z");
    }
}
