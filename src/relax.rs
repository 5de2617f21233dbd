//! Distance-constraint relaxation on the lane layout.
//!
//! A relaxation pass visits every interior point and pulls each of its four links
//! back toward rest length, moving both endpoints. The pass runs in three phases,
//! one per `y mod 3`. Inside a phase every center row owns the three-row window
//! `y-1..=y+1` and windows of one phase never overlap, so they can run on separate
//! threads. Inside a window the row is walked lane group by lane group; lanes of
//! a group have disjoint footprints (see `layout`), so they can run in lockstep.
//!
//! Sequential, lane and parallel execution follow this same schedule and give
//! bit-identical results.

use rayon::prelude::*;

use crate::config::RelaxMode;
use crate::layout::{IndexMap, LaneLayout};

/// Pull a stretched link back toward `rest`. Links are one-sided: compressed
/// links are left alone. A non-finite distance means the cloth has exploded
/// locally; the link is skipped for this pass.
#[inline]
pub fn relax_link(px: &mut f32, py: &mut f32, nx: &mut f32, ny: &mut f32, rest: f32) {
    let dx = *nx - *px;
    let dy = *ny - *py;
    let d = (dx * dx + dy * dy).sqrt();
    if !d.is_finite() {
        return;
    }
    if d > rest {
        let extra = d / rest - 1.0;
        let cx = extra * dx * 0.5;
        let cy = extra * dy * 0.5;
        *px += cx;
        *py += cy;
        *nx -= cx;
        *ny -= cy;
    }
}

/// One relaxation pass over all interior points.
pub fn relax(layout: &mut LaneLayout, mode: RelaxMode) {
    let LaneLayout {
        map,
        pos_x,
        pos_y,
        rest,
        ..
    } = layout;
    let map: &IndexMap = map;
    let rest: &[Vec<f32>; 4] = rest;
    let (w, h) = (map.width, map.height);
    if w < 3 || h < 3 {
        return;
    }

    for phase in 0..3 {
        // Row 0 is never a center row.
        let first = if phase == 0 { 3 } else { phase };
        if first + 1 >= h {
            continue;
        }
        let skip = (first - 1) * w;
        let window = 3 * w;
        let wx = &mut pos_x[skip..];
        let wy = &mut pos_y[skip..];

        let run = |k: usize, cx: &mut [f32], cy: &mut [f32]| {
            if cx.len() < window {
                return;
            }
            let y = first + 3 * k;
            let rest_row = [
                &rest[0][y * w..(y + 1) * w],
                &rest[1][y * w..(y + 1) * w],
                &rest[2][y * w..(y + 1) * w],
                &rest[3][y * w..(y + 1) * w],
            ];
            match mode {
                RelaxMode::Sequential => relax_window_sequential(map, cx, cy, &rest_row),
                RelaxMode::Lanes | RelaxMode::Parallel => {
                    relax_window_lanes(map, cx, cy, &rest_row)
                }
            }
        };

        match mode {
            RelaxMode::Parallel => wx
                .par_chunks_mut(window)
                .zip(wy.par_chunks_mut(window))
                .enumerate()
                .for_each(|(k, (cx, cy))| run(k, cx, cy)),
            RelaxMode::Sequential | RelaxMode::Lanes => {
                for (k, (cx, cy)) in wx.chunks_mut(window).zip(wy.chunks_mut(window)).enumerate() {
                    run(k, cx, cy);
                }
            }
        }
    }
}

/// Reset every pinned point to its target.
pub fn pin(layout: &mut LaneLayout) {
    let LaneLayout {
        pos_x,
        pos_y,
        fix_x,
        fix_y,
        pinned,
        ..
    } = layout;
    for (s, _) in pinned.iter().enumerate().filter(|(_, p)| **p) {
        pos_x[s] = fix_x[s];
        pos_y[s] = fix_y[s];
    }
}

/// Window-local slots of the four neighbors of column `x` in the center row.
#[inline]
fn neighbor_slots(map: &IndexMap, x: usize) -> [usize; 4] {
    let w = map.width;
    let own = map.row_slot(x);
    [
        w + map.row_slot(x + 1),
        w + map.row_slot(x - 1),
        2 * w + own,
        own,
    ]
}

fn relax_window_sequential(map: &IndexMap, wx: &mut [f32], wy: &mut [f32], rest: &[&[f32]; 4]) {
    let w = map.width;
    for group in 0..map.stride {
        for lane in 0..map.lanes {
            let x = map.group_x(group, lane);
            if x == 0 || x + 1 >= w {
                continue;
            }
            let own = map.row_slot(x);
            let nb = neighbor_slots(map, x);
            let mut px = wx[w + own];
            let mut py = wy[w + own];
            for link in 0..4 {
                let n = nb[link];
                relax_link(&mut px, &mut py, &mut wx[n], &mut wy[n], rest[link][own]);
            }
            wx[w + own] = px;
            wy[w + own] = py;
        }
    }
}

fn relax_window_lanes(map: &IndexMap, wx: &mut [f32], wy: &mut [f32], rest: &[&[f32]; 4]) {
    match map.lanes {
        1 => relax_groups::<1>(map, wx, wy, rest),
        2 => relax_groups::<2>(map, wx, wy, rest),
        4 => relax_groups::<4>(map, wx, wy, rest),
        8 => relax_groups::<8>(map, wx, wy, rest),
        16 => relax_groups::<16>(map, wx, wy, rest),
        _ => relax_window_sequential(map, wx, wy, rest),
    }
}

/// Lockstep over the lanes of each group: load all points, apply link 0 for
/// every lane, then link 1, and so on, then store.
fn relax_groups<const L: usize>(map: &IndexMap, wx: &mut [f32], wy: &mut [f32], rest: &[&[f32]; 4]) {
    let w = map.width;
    debug_assert_eq!(map.lanes, L);
    for group in 0..map.stride {
        let mut active = [false; L];
        let mut own = [0usize; L];
        let mut nb = [[0usize; 4]; L];
        for k in 0..L {
            let x = map.group_x(group, k);
            if x == 0 || x + 1 >= w {
                continue;
            }
            active[k] = true;
            own[k] = map.row_slot(x);
            nb[k] = neighbor_slots(map, x);
        }

        let mut px = [0.0f32; L];
        let mut py = [0.0f32; L];
        for k in 0..L {
            if active[k] {
                px[k] = wx[w + own[k]];
                py[k] = wy[w + own[k]];
            }
        }

        for link in 0..4 {
            for k in 0..L {
                if !active[k] {
                    continue;
                }
                let n = nb[k][link];
                relax_link(&mut px[k], &mut py[k], &mut wx[n], &mut wy[n], rest[link][own[k]]);
            }
        }

        for k in 0..L {
            if active[k] {
                wx[w + own[k]] = px[k];
                wy[w + own[k]] = py[k];
            }
        }
    }
}
