use rayon::prelude::*;

use crate::config::{Backend, Params};
use crate::layout::LaneLayout;
use crate::rng::PointRng;

/// Force constants for one macro-step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Forces {
    pub gravity: f32,
    pub wind_threshold: f32,
    pub wind_roll_range: f32,
    pub wind_range_x: f32,
    pub wind_range_y: f32,
}

impl Forces {
    /// Forces at the given drift. The horizontal wind range widens with drift.
    pub fn new(params: &Params, drift: f32) -> Self {
        Self {
            gravity: params.gravity,
            wind_threshold: params.wind_threshold,
            wind_roll_range: params.wind_roll_range,
            wind_range_x: params.wind_base_x + drift,
            wind_range_y: params.wind_range_y,
        }
    }

    pub fn wind_probability(&self) -> f32 {
        (self.wind_threshold / self.wind_roll_range).clamp(0.0, 1.0)
    }
}

#[inline]
pub fn verlet(cur: f32, prev: f32, accel: f32) -> f32 {
    cur + (cur - prev) + accel
}

/// Draw this step's gust. Always consumes three values so every execution
/// path advances the stream identically.
#[inline]
pub fn wind(rng: &mut PointRng, forces: &Forces) -> Option<[f32; 2]> {
    let roll = rng.uniform(forces.wind_roll_range);
    let dx = rng.uniform(forces.wind_range_x);
    let dy = rng.uniform(forces.wind_range_y);
    (roll < forces.wind_threshold).then_some([dx, dy])
}

/// Advance one point. Reads only that point's own state.
#[inline]
pub fn integrate_point(pos: &mut [f32; 2], prev: &mut [f32; 2], seed: &mut u32, forces: &Forces) {
    let cur = *pos;
    let mut next = [
        verlet(cur[0], prev[0], 0.0),
        verlet(cur[1], prev[1], forces.gravity),
    ];
    *prev = cur;

    let mut rng = PointRng::new(*seed);
    if let Some([dx, dy]) = wind(&mut rng, forces) {
        next[0] += dx;
        next[1] += dy;
    }
    *seed = rng.state;
    *pos = next;
}

/// Mutable view of the columns the integrator touches.
pub struct Columns<'a> {
    pub pos_x: &'a mut [f32],
    pub pos_y: &'a mut [f32],
    pub prev_x: &'a mut [f32],
    pub prev_y: &'a mut [f32],
    pub seeds: &'a mut [u32],
}

impl<'a> Columns<'a> {
    pub fn of(layout: &'a mut LaneLayout) -> Self {
        Self {
            pos_x: &mut layout.pos_x,
            pos_y: &mut layout.pos_y,
            prev_x: &mut layout.prev_x,
            prev_y: &mut layout.prev_y,
            seeds: &mut layout.seeds,
        }
    }
}

/// Integrate every point of the layout on the host. `Backend::Offload` is
/// served by the offload gateway; here it falls back to the parallel path.
pub fn integrate(layout: &mut LaneLayout, forces: &Forces, backend: Backend) {
    let lanes = layout.map.lanes;
    let width = layout.map.width;
    let cols = Columns::of(layout);
    match backend {
        Backend::Scalar => integrate_scalar(cols, forces),
        Backend::Lanes => integrate_block(lanes, cols, forces),
        Backend::Parallel | Backend::Offload => integrate_parallel(width, lanes, cols, forces),
    }
}

pub fn integrate_scalar(c: Columns<'_>, forces: &Forces) {
    for i in 0..c.pos_x.len() {
        let mut pos = [c.pos_x[i], c.pos_y[i]];
        let mut prev = [c.prev_x[i], c.prev_y[i]];
        integrate_point(&mut pos, &mut prev, &mut c.seeds[i], forces);
        c.pos_x[i] = pos[0];
        c.pos_y[i] = pos[1];
        c.prev_x[i] = prev[0];
        c.prev_y[i] = prev[1];
    }
}

/// Rows are independent, so each row is handed to rayon and walked in lane blocks.
pub fn integrate_parallel(width: usize, lanes: usize, c: Columns<'_>, forces: &Forces) {
    c.pos_x
        .par_chunks_mut(width)
        .zip(c.pos_y.par_chunks_mut(width))
        .zip(c.prev_x.par_chunks_mut(width))
        .zip(c.prev_y.par_chunks_mut(width))
        .zip(c.seeds.par_chunks_mut(width))
        .for_each(|((((pos_x, pos_y), prev_x), prev_y), seeds)| {
            let row = Columns {
                pos_x,
                pos_y,
                prev_x,
                prev_y,
                seeds,
            };
            integrate_block(lanes, row, forces);
        });
}

/// Walk the columns `lanes` points at a time.
pub fn integrate_block(lanes: usize, c: Columns<'_>, forces: &Forces) {
    match lanes {
        1 => integrate_lanes::<1>(c, forces),
        2 => integrate_lanes::<2>(c, forces),
        4 => integrate_lanes::<4>(c, forces),
        8 => integrate_lanes::<8>(c, forces),
        16 => integrate_lanes::<16>(c, forces),
        _ => integrate_scalar(c, forces),
    }
}

fn integrate_lanes<const L: usize>(c: Columns<'_>, forces: &Forces) {
    debug_assert_eq!(c.pos_x.len() % L, 0);
    let blocks = c
        .pos_x
        .chunks_exact_mut(L)
        .zip(c.pos_y.chunks_exact_mut(L))
        .zip(c.prev_x.chunks_exact_mut(L))
        .zip(c.prev_y.chunks_exact_mut(L))
        .zip(c.seeds.chunks_exact_mut(L));

    for ((((px, py), qx), qy), seeds) in blocks {
        let mut nx = [0.0f32; L];
        let mut ny = [0.0f32; L];
        for k in 0..L {
            nx[k] = verlet(px[k], qx[k], 0.0);
            ny[k] = verlet(py[k], qy[k], forces.gravity);
        }
        qx.copy_from_slice(px);
        qy.copy_from_slice(py);

        let mut fire = [false; L];
        let mut gust = [[0.0f32; 2]; L];
        for k in 0..L {
            let mut rng = PointRng::new(seeds[k]);
            if let Some(g) = wind(&mut rng, forces) {
                fire[k] = true;
                gust[k] = g;
            }
            seeds[k] = rng.state;
        }

        for k in 0..L {
            px[k] = if fire[k] { nx[k] + gust[k][0] } else { nx[k] };
            py[k] = if fire[k] { ny[k] + gust[k][1] } else { ny[k] };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::to_lane_layout;
    use crate::model::initialize;

    fn layout(n: usize, lanes: usize) -> (Params, LaneLayout) {
        let params = Params {
            grid_size: n,
            lanes,
            ..Params::default()
        };
        let grid = initialize(&params).unwrap();
        let layout = to_lane_layout(&grid, params.effective_lanes()).unwrap();
        (params, layout)
    }

    fn calm(params: &Params) -> Forces {
        Forces {
            wind_threshold: 0.0,
            ..Forces::new(params, 0.0)
        }
    }

    #[test]
    fn gravity_only_moves_down_by_exactly_g() {
        let (params, mut l) = layout(4, 1);
        let before = l.clone();
        let f = calm(&params);
        integrate(&mut l, &f, Backend::Scalar);
        for s in 0..l.len() {
            assert_eq!(l.pos_x[s], before.pos_x[s]);
            assert_eq!(l.pos_y[s], before.pos_y[s] + f.gravity);
            assert_eq!(l.prev_x[s], before.pos_x[s]);
            assert_eq!(l.prev_y[s], before.pos_y[s]);
        }
    }

    #[test]
    fn velocity_carries_over() {
        let mut pos = [10.0, 20.0];
        let mut prev = [9.0, 21.0];
        let mut seed = 1;
        let f = Forces {
            gravity: 0.5,
            wind_threshold: 0.0,
            wind_roll_range: 10.0,
            wind_range_x: 1.0,
            wind_range_y: 1.0,
        };
        integrate_point(&mut pos, &mut prev, &mut seed, &f);
        assert_eq!(pos, [11.0, 19.5]);
        assert_eq!(prev, [10.0, 20.0]);
    }

    #[test]
    fn certain_wind_stays_in_range() {
        let f = Forces {
            gravity: 0.0,
            wind_threshold: 1.0,
            wind_roll_range: 1.0,
            wind_range_x: 0.25,
            wind_range_y: 0.12,
        };
        assert_eq!(f.wind_probability(), 1.0);
        let mut seed = 99;
        for _ in 0..200 {
            let mut pos = [0.0, 0.0];
            let mut prev = [0.0, 0.0];
            integrate_point(&mut pos, &mut prev, &mut seed, &f);
            assert!((0.0..0.25).contains(&pos[0]));
            assert!((0.0..0.12).contains(&pos[1]));
        }
    }

    #[test]
    fn default_wind_fires_rarely() {
        let f = Forces::new(&Params::default(), 0.11);
        let mut rng = PointRng::new(5);
        let fired = (0..100_000).filter(|_| wind(&mut rng, &f).is_some()).count();
        // threshold 0.03 on a roll in [0, 10)
        assert!((150..=450).contains(&fired), "fired {}", fired);
    }

    #[test]
    fn every_backend_matches_scalar_bit_for_bit() {
        let (params, base) = layout(24, 8);
        let mut f = Forces::new(&params, 0.11);
        f.wind_threshold = 3.0;

        let mut reference = base.clone();
        for _ in 0..5 {
            integrate(&mut reference, &f, Backend::Scalar);
        }
        for backend in [Backend::Lanes, Backend::Parallel] {
            let mut other = base.clone();
            for _ in 0..5 {
                integrate(&mut other, &f, backend);
            }
            assert_eq!(other.seeds, reference.seeds, "{:?}", backend);
            for s in 0..base.len() {
                assert_eq!(other.pos_x[s].to_bits(), reference.pos_x[s].to_bits());
                assert_eq!(other.pos_y[s].to_bits(), reference.pos_y[s].to_bits());
                assert_eq!(other.prev_y[s].to_bits(), reference.prev_y[s].to_bits());
            }
        }
    }

    #[test]
    fn points_do_not_see_each_other() {
        let (params, base) = layout(12, 4);
        let f = Forces::new(&params, 0.11);
        let mut a = base.clone();
        let mut b = base.clone();
        b.pos_x[7] += 100.0;
        b.seeds[7] ^= 0xFFFF;
        integrate(&mut a, &f, Backend::Parallel);
        integrate(&mut b, &f, Backend::Parallel);
        for s in (0..base.len()).filter(|&s| s != 7) {
            assert_eq!(a.pos_x[s], b.pos_x[s]);
            assert_eq!(a.pos_y[s], b.pos_y[s]);
            assert_eq!(a.seeds[s], b.seeds[s]);
        }
    }
}
