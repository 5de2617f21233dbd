use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

// Physical feel of the cloth. Step and iteration counts are tuning constants,
// changing them changes how the cloth behaves.
pub const GRID_SIZE: usize = 256;
pub const MACRO_STEPS: usize = 3;
pub const RELAX_ITERATIONS: usize = 4;
pub const GRAVITY: f32 = 0.003;
pub const REST_SLACK: f32 = 1.15;

// Wind: fires when uniform(0, WIND_ROLL_RANGE) < WIND_THRESHOLD.
pub const WIND_THRESHOLD: f32 = 0.03;
pub const WIND_ROLL_RANGE: f32 = 10.0;
pub const WIND_BASE_X: f32 = 0.02;
pub const WIND_RANGE_Y: f32 = 0.12;
pub const WIND_DRIFT_START: f32 = 0.11;
pub const WIND_DRIFT_STEP: f32 = 0.0002;

// Initial layout.
pub const JITTER: f32 = 2.0;
pub const CANVAS_WIDTH: usize = 1280;
pub const CANVAS_HEIGHT: usize = 720;

pub const DEFAULT_LANES: usize = 8;
pub const MAX_LANES: usize = 16;
pub const MAX_GRID_SIZE: usize = 4096;

// Canvas margins around the cloth's initial spread.
pub const MARGIN_X: usize = 100;
pub const MARGIN_Y: usize = 180;

/// How the integration step is executed. All variants produce identical positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Scalar,
    Lanes,
    Parallel,
    Offload,
}

/// How the relaxation pass is executed. All variants follow the same schedule
/// and produce identical positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxMode {
    Sequential,
    Lanes,
    Parallel,
}

/// All tunable parameters. Defaults reproduce the reference cloth.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub seed: u64,
    pub grid_size: usize,

    // Frame structure
    pub macro_steps: usize,
    pub relax_iterations: usize,

    // Forces
    pub gravity: f32,
    pub wind_threshold: f32,
    pub wind_roll_range: f32,
    pub wind_base_x: f32,
    pub wind_range_y: f32,
    pub wind_drift_start: f32,
    pub wind_drift_step: f32,

    // Geometry
    pub rest_slack: f32,
    pub jitter: f32,
    pub canvas_width: usize,
    pub canvas_height: usize,

    // Execution
    pub lanes: usize,
    pub backend: Backend,
    pub relax_mode: RelaxMode,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            seed: 42,
            grid_size: GRID_SIZE,
            macro_steps: MACRO_STEPS,
            relax_iterations: RELAX_ITERATIONS,
            gravity: GRAVITY,
            wind_threshold: WIND_THRESHOLD,
            wind_roll_range: WIND_ROLL_RANGE,
            wind_base_x: WIND_BASE_X,
            wind_range_y: WIND_RANGE_Y,
            wind_drift_start: WIND_DRIFT_START,
            wind_drift_step: WIND_DRIFT_STEP,
            rest_slack: REST_SLACK,
            jitter: JITTER,
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
            lanes: DEFAULT_LANES,
            backend: Backend::Parallel,
            relax_mode: RelaxMode::Parallel,
        }
    }
}

impl Params {
    /// Load parameters from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let params: Params = serde_json::from_str(&text)
            .map_err(|e| SimError::config(format!("cannot parse {}: {}", path.display(), e)))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.grid_size < 3 {
            return Err(SimError::config(format!(
                "grid_size must be at least 3, got {}",
                self.grid_size
            )));
        }
        if self.grid_size > MAX_GRID_SIZE {
            return Err(SimError::config(format!(
                "grid_size must be at most {}, got {}",
                MAX_GRID_SIZE, self.grid_size
            )));
        }
        let [sx, sy] = self.spacing();
        if sx == 0 || sy == 0 {
            // Zero spacing collapses links to zero rest length.
            return Err(SimError::config(format!(
                "a {}x{} canvas leaves no room between {} points per row",
                self.canvas_width, self.canvas_height, self.grid_size
            )));
        }
        if self.macro_steps == 0 {
            return Err(SimError::config("macro_steps must be positive"));
        }
        if self.relax_iterations == 0 {
            return Err(SimError::config("relax_iterations must be positive"));
        }
        if self.lanes == 0 || !self.lanes.is_power_of_two() || self.lanes > MAX_LANES {
            return Err(SimError::config(format!(
                "lanes must be a power of two in 1..={}, got {}",
                MAX_LANES, self.lanes
            )));
        }
        if !(self.rest_slack.is_finite() && self.rest_slack > 0.0) {
            return Err(SimError::config("rest_slack must be finite and positive"));
        }
        if self.wind_roll_range <= 0.0 {
            return Err(SimError::config("wind_roll_range must be positive"));
        }
        let finite = [
            self.gravity,
            self.wind_threshold,
            self.wind_base_x,
            self.wind_range_y,
            self.wind_drift_start,
            self.wind_drift_step,
            self.jitter,
            self.wind_roll_range,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(SimError::config("force and jitter constants must be finite"));
        }
        Ok(())
    }

    /// Whole-unit distance between neighboring points in the unjittered cloth.
    pub fn spacing(&self) -> [usize; 2] {
        let n = self.grid_size.max(1);
        [
            self.canvas_width.saturating_sub(MARGIN_X) / n,
            self.canvas_height.saturating_sub(MARGIN_Y) / n,
        ]
    }

    /// Largest lane width not above `self.lanes` whose groups are hazard free
    /// on this grid: the width divides the grid and leaves a stride of at least 3.
    pub fn effective_lanes(&self) -> usize {
        let mut lanes = self.lanes.max(1);
        while lanes > 1 {
            if self.grid_size % lanes == 0 && self.grid_size / lanes >= 3 {
                break;
            }
            lanes /= 2;
        }
        lanes
    }
}
