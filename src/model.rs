use crate::config::Params;
use crate::error::SimResult;
use crate::grid::{Grid, neighbor};
use crate::rng::{PointRng, SetupRng};

const SALT_JITTER: u64 = 0x0C10_7A11_0000_0001;
const SALT_WIND: u64 = 0x0C10_7A11_0000_0002;

/// One point mass, in the row-major layout used for setup and snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub pos: [f32; 2],
    pub prev: [f32; 2],
    /// Pinned target; meaningful only when `pinned`.
    pub fix: [f32; 2],
    pub pinned: bool,
    /// Rest length per link (+x, -x, +y, -y). Zero on the outer ring.
    pub rest: [f32; 4],
    pub rng: PointRng,
}

pub type PointGrid = Grid<Point>;

#[inline]
pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Unjittered position of (x, y): evenly spread over the canvas with a
/// per-row shear so the cloth hangs at a slight angle.
pub fn base_position(x: usize, y: usize, params: &Params) -> [f32; 2] {
    let [sx, sy] = params.spacing();
    [
        10.0 + x as f32 * sx as f32 + y as f32 * 0.9,
        10.0 + y as f32 * sy as f32,
    ]
}

/// Build the cloth: jittered positions at rest, a pinned top row, per-point
/// wind generators and rest lengths taken from the initial shape.
pub fn initialize(params: &Params) -> SimResult<PointGrid> {
    params.validate()?;
    let n = params.grid_size;
    let mut grid: PointGrid = Grid::new(n, n);
    let mut rng = SetupRng::new(params.seed ^ SALT_JITTER);

    for y in 0..n {
        for x in 0..n {
            let mut pos = base_position(x, y, params);
            if y > 0 {
                pos[0] += rng.uniform(params.jitter);
                pos[1] += rng.uniform(params.jitter);
            }
            let p = grid.get_mut(x, y);
            p.pos = pos;
            p.prev = pos;
            p.pinned = y == 0;
            if p.pinned {
                p.fix = pos;
            }
            p.rng = PointRng::for_point(x, y, params.seed ^ SALT_WIND);
        }
    }

    compute_rest_lengths(&mut grid, params.rest_slack);
    log::debug!(
        "initialized {}x{} cloth (seed={}, jitter={})",
        n,
        n,
        params.seed,
        params.jitter
    );
    Ok(grid)
}

/// Rest length of every link of every interior point: current distance to
/// the neighbor times `slack`. Outer-ring points are never relaxed and keep zeros.
pub fn compute_rest_lengths(grid: &mut PointGrid, slack: f32) {
    let (w, h) = (grid.w, grid.h);
    for y in 0..h {
        for x in 0..w {
            if !grid.is_interior(x, y) {
                grid.get_mut(x, y).rest = [0.0; 4];
                continue;
            }
            let pos = grid.get(x, y).pos;
            let mut rest = [0.0; 4];
            for (link, r) in rest.iter_mut().enumerate() {
                if let Some((nx, ny)) = neighbor(x, y, link, w, h) {
                    *r = distance(pos, grid.get(nx, ny).pos) * slack;
                }
            }
            grid.get_mut(x, y).rest = rest;
        }
    }
}
