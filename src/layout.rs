//! Column-oriented, lane-grouped storage of the cloth.
//!
//! Every attribute lives in its own array. Within a row, slots are regrouped so
//! that one lane group holds the points `x = c, c + s, c + 2s, ...` where
//! `s = width / lanes` is the stride:
//!
//! ```text
//! logical row:  x0 x1 x2 x3 x4 x5 x6 x7 x8 x9 x10 x11     (width 12, 4 lanes, stride 3)
//! slots:       [x0 x3 x6 x9][x1 x4 x7 x10][x2 x5 x8 x11]
//! ```
//!
//! Neighbors differ by exactly 1 in x or y, so with a stride of at least 3 no two
//! lanes of a group touch the same point, even through a shared neighbor. Rows stay
//! contiguous (`slot / width == y`), which the relaxation schedule relies on.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::grid::{Grid, neighbors4};
use crate::model::{Point, PointGrid};
use crate::rng::PointRng;

pub const LAYOUT_VERSION: u32 = 1;

/// Stable mapping between logical (x, y) and physical slots. Fixed after
/// initialisation; consumers such as the renderer read positions through it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMap {
    pub version: u32,
    pub width: usize,
    pub height: usize,
    pub lanes: usize,
    pub stride: usize,
    slot_of: Vec<u32>,
    logical_of: Vec<u32>,
}

impl IndexMap {
    pub fn new(width: usize, height: usize, lanes: usize) -> SimResult<Self> {
        if lanes == 0 || width % lanes != 0 {
            return Err(SimError::config(format!(
                "lane width {} does not divide grid width {}",
                lanes, width
            )));
        }
        if lanes > 1 && width / lanes < 3 {
            return Err(SimError::config(format!(
                "lane stride {} is below 3; lanes would share neighbors",
                width / lanes
            )));
        }
        Ok(Self::build(width, height, lanes))
    }

    fn build(width: usize, height: usize, lanes: usize) -> Self {
        let stride = width / lanes;
        let n = width * height;
        let mut slot_of = vec![0u32; n];
        let mut logical_of = vec![0u32; n];
        for y in 0..height {
            for x in 0..width {
                let logical = y * width + x;
                let slot = y * width + (x % stride) * lanes + x / stride;
                slot_of[logical] = slot as u32;
                logical_of[slot] = logical as u32;
            }
        }
        Self {
            version: LAYOUT_VERSION,
            width,
            height,
            lanes,
            stride,
            slot_of,
            logical_of,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slot_of.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slot_of.is_empty()
    }

    /// Physical slot of logical (x, y).
    #[inline]
    pub fn slot(&self, x: usize, y: usize) -> usize {
        self.slot_of[y * self.width + x] as usize
    }

    /// Logical (x, y) stored in `slot`.
    #[inline]
    pub fn logical(&self, slot: usize) -> (usize, usize) {
        let l = self.logical_of[slot] as usize;
        (l % self.width, l / self.width)
    }

    /// Offset of column `x` inside its row.
    #[inline]
    pub fn row_slot(&self, x: usize) -> usize {
        (x % self.stride) * self.lanes + x / self.stride
    }

    /// Logical x of `lane` in lane group `group` of a row.
    #[inline]
    pub fn group_x(&self, group: usize, lane: usize) -> usize {
        group + lane * self.stride
    }

    /// Check that within every lane group the relaxation footprints (the point
    /// plus its four neighbors) of the interior lanes are pairwise disjoint.
    pub fn verify_hazard_free(&self) -> SimResult<()> {
        let (w, h) = (self.width, self.height);
        for y in 1..h.saturating_sub(1) {
            for group in 0..self.stride {
                // Footprints only span rows y-1..=y+1; track columns per row.
                let mut touched: [Vec<usize>; 3] = [Vec::new(), Vec::new(), Vec::new()];
                for lane in 0..self.lanes {
                    let x = self.group_x(group, lane);
                    if x == 0 || x + 1 >= w {
                        continue;
                    }
                    let mut footprint = vec![(x, y)];
                    footprint.extend(neighbors4(x, y, w, h));
                    for (fx, fy) in footprint {
                        let row = fy + 1 - y;
                        if touched[row].contains(&fx) {
                            return Err(SimError::config(format!(
                                "lane group {} of row {} touches ({}, {}) twice",
                                group, y, fx, fy
                            )));
                        }
                        touched[row].push(fx);
                    }
                }
            }
        }
        Ok(())
    }
}

/// The cloth in column-oriented, lane-grouped form. All arrays are indexed by slot.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneLayout {
    pub map: IndexMap,
    pub pos_x: Vec<f32>,
    pub pos_y: Vec<f32>,
    pub prev_x: Vec<f32>,
    pub prev_y: Vec<f32>,
    pub fix_x: Vec<f32>,
    pub fix_y: Vec<f32>,
    pub pinned: Vec<bool>,
    /// Rest lengths, one array per link (+x, -x, +y, -y).
    pub rest: [Vec<f32>; 4],
    /// Per-point wind generator states.
    pub seeds: Vec<u32>,
}

impl LaneLayout {
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn position(&self, x: usize, y: usize) -> [f32; 2] {
        let s = self.map.slot(x, y);
        [self.pos_x[s], self.pos_y[s]]
    }

    /// Current positions in logical row-major order.
    pub fn positions(&self) -> Grid<[f32; 2]> {
        let mut out = Grid::new(self.map.width, self.map.height);
        for (slot, (&px, &py)) in self.pos_x.iter().zip(&self.pos_y).enumerate() {
            let (x, y) = self.map.logical(slot);
            *out.get_mut(x, y) = [px, py];
        }
        out
    }
}

/// Relocate a row-major grid into lane-grouped column buffers. Values are
/// copied bit for bit.
pub fn to_lane_layout(grid: &PointGrid, lanes: usize) -> SimResult<LaneLayout> {
    let map = IndexMap::new(grid.w, grid.h, lanes)?;
    debug_assert!(map.verify_hazard_free().is_ok());
    let n = map.len();
    let mut layout = LaneLayout {
        pos_x: vec![0.0; n],
        pos_y: vec![0.0; n],
        prev_x: vec![0.0; n],
        prev_y: vec![0.0; n],
        fix_x: vec![0.0; n],
        fix_y: vec![0.0; n],
        pinned: vec![false; n],
        rest: [vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]],
        seeds: vec![0; n],
        map,
    };

    for y in 0..grid.h {
        for x in 0..grid.w {
            let p = grid.get(x, y);
            let s = layout.map.slot(x, y);
            layout.pos_x[s] = p.pos[0];
            layout.pos_y[s] = p.pos[1];
            layout.prev_x[s] = p.prev[0];
            layout.prev_y[s] = p.prev[1];
            layout.fix_x[s] = p.fix[0];
            layout.fix_y[s] = p.fix[1];
            layout.pinned[s] = p.pinned;
            for link in 0..4 {
                layout.rest[link][s] = p.rest[link];
            }
            layout.seeds[s] = p.rng.state;
        }
    }

    log::debug!(
        "lane layout v{}: {}x{}, {} lanes, stride {}",
        layout.map.version,
        layout.map.width,
        layout.map.height,
        layout.map.lanes,
        layout.map.stride
    );
    Ok(layout)
}

/// Inverse of [`to_lane_layout`].
pub fn from_lane_layout(layout: &LaneLayout) -> PointGrid {
    let map = &layout.map;
    let mut grid: PointGrid = Grid::new(map.width, map.height);
    for s in 0..map.len() {
        let (x, y) = map.logical(s);
        *grid.get_mut(x, y) = Point {
            pos: [layout.pos_x[s], layout.pos_y[s]],
            prev: [layout.prev_x[s], layout.prev_y[s]],
            fix: [layout.fix_x[s], layout.fix_y[s]],
            pinned: layout.pinned[s],
            rest: [
                layout.rest[0][s],
                layout.rest[1][s],
                layout.rest[2][s],
                layout.rest[3][s],
            ],
            rng: PointRng::new(layout.seeds[s]),
        };
    }
    grid
}
