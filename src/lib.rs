pub mod config;
pub mod error;
pub mod grid;
pub mod integrate;
pub mod layout;
pub mod model;
pub mod offload;
pub mod relax;
pub mod render;
pub mod rng;

use std::time::Instant;

use config::{Backend, Params};
use error::SimResult;
use grid::Grid;
use integrate::{Forces, integrate};
use layout::{IndexMap, LaneLayout, from_lane_layout, to_lane_layout};
use model::{PointGrid, initialize};
use offload::{Device, HostDevice, OffloadGateway};
use relax::{pin, relax};

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Hooks into the stages of a frame. Every callback sees the layout after the
/// stage has completed; the default implementations do nothing.
pub trait StepObserver {
    fn on_integrate(&mut self, _step: usize, _layout: &LaneLayout) {}

    /// Called after each relaxation iteration, once the top row is pinned again.
    fn on_relax_iteration(&mut self, _step: usize, _iteration: usize, _layout: &LaneLayout) {}

    fn on_macro_step(&mut self, _step: usize, _layout: &LaneLayout) {}
}

pub struct NoObserver;

impl StepObserver for NoObserver {}

/// One cloth and everything needed to advance it.
pub struct Simulation {
    params: Params,
    layout: LaneLayout,
    gateway: Option<OffloadGateway>,
    drift: f32,
    frame: u64,
}

impl Simulation {
    /// Build the cloth. With [`Backend::Offload`] the integration step runs on
    /// an emulated host device.
    pub fn new(params: Params) -> SimResult<Self> {
        let device: Option<Box<dyn Device>> = match params.backend {
            Backend::Offload => Some(Box::new(HostDevice::new(Forces::new(&params, 0.0)))),
            _ => None,
        };
        Self::build(params, device)
    }

    /// Build the cloth and integrate on `device`.
    pub fn with_device(mut params: Params, device: Box<dyn Device>) -> SimResult<Self> {
        params.backend = Backend::Offload;
        Self::build(params, Some(device))
    }

    fn build(params: Params, device: Option<Box<dyn Device>>) -> SimResult<Self> {
        let layout = Self::fresh_layout(&params)?;
        let gateway = match device {
            Some(device) => Some(OffloadGateway::new(device, &layout)?),
            None => None,
        };
        Ok(Self {
            drift: params.wind_drift_start,
            params,
            layout,
            gateway,
            frame: 0,
        })
    }

    fn fresh_layout(params: &Params) -> SimResult<LaneLayout> {
        let grid = initialize(params)?;
        let lanes = params.effective_lanes();
        if lanes != params.lanes {
            log::warn!(
                "{} lanes do not fit a {}-wide grid, using {}",
                params.lanes,
                params.grid_size,
                lanes
            );
        }
        to_lane_layout(&grid, lanes)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Current state. While integrating on a device, previous positions lag
    /// until [`Simulation::sync`].
    pub fn layout(&self) -> &LaneLayout {
        &self.layout
    }

    pub fn index_map(&self) -> &IndexMap {
        &self.layout.map
    }

    pub fn positions(&self) -> Grid<[f32; 2]> {
        self.layout.positions()
    }

    pub fn drift(&self) -> f32 {
        self.drift
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn step_frame(&mut self) -> SimResult<Vec<Timing>> {
        self.step_frame_observed(&mut NoObserver)
    }

    /// Advance one frame: each macro-step integrates once, then relaxes the
    /// links `relax_iterations` times, re-pinning the top row after every pass.
    pub fn step_frame_observed(
        &mut self,
        observer: &mut dyn StepObserver,
    ) -> SimResult<Vec<Timing>> {
        let total_start = Instant::now();
        let mut integrate_ms = 0.0;
        let mut relax_ms = 0.0;

        for step in 0..self.params.macro_steps {
            let t = Instant::now();
            match self.gateway.as_mut() {
                Some(gateway) => gateway.integrate(&mut self.layout, self.drift)?,
                None => integrate(
                    &mut self.layout,
                    &Forces::new(&self.params, self.drift),
                    self.params.backend,
                ),
            }
            integrate_ms += t.elapsed().as_secs_f64() * 1000.0;
            observer.on_integrate(step, &self.layout);
            self.drift += self.params.wind_drift_step;

            let t = Instant::now();
            for iteration in 0..self.params.relax_iterations {
                relax(&mut self.layout, self.params.relax_mode);
                pin(&mut self.layout);
                observer.on_relax_iteration(step, iteration, &self.layout);
            }
            relax_ms += t.elapsed().as_secs_f64() * 1000.0;
            observer.on_macro_step(step, &self.layout);
        }
        self.frame += 1;

        let timings = vec![
            Timing {
                name: "integrate",
                ms: integrate_ms,
            },
            Timing {
                name: "relax",
                ms: relax_ms,
            },
            Timing {
                name: "TOTAL",
                ms: total_start.elapsed().as_secs_f64() * 1000.0,
            },
        ];
        for t in &timings {
            log::trace!("frame {} {}: {:.3} ms", self.frame, t.name, t.ms);
        }
        Ok(timings)
    }

    /// Bring device-resident state back to the host.
    pub fn sync(&mut self) -> SimResult<()> {
        match self.gateway.as_mut() {
            Some(gateway) => gateway.sync_previous(&mut self.layout),
            None => Ok(()),
        }
    }

    /// Full row-major copy of the cloth.
    pub fn snapshot(&mut self) -> SimResult<PointGrid> {
        self.sync()?;
        Ok(from_lane_layout(&self.layout))
    }

    /// Start over from the initial cloth with the same parameters.
    pub fn reset(&mut self) -> SimResult<()> {
        self.layout = Self::fresh_layout(&self.params)?;
        if let Some(gateway) = self.gateway.as_mut() {
            gateway.invalidate();
        }
        self.drift = self.params.wind_drift_start;
        self.frame = 0;
        log::debug!("simulation reset (seed={})", self.params.seed);
        Ok(())
    }
}
