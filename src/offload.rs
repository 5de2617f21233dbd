//! Offload of the integration step to an accelerator.
//!
//! The gateway owns the transfer contract: positions and per-point seeds go to
//! the device every macro-step, the kernel runs once per grid cell, positions and
//! seeds come back. Previous positions stay resident on the device between steps
//! because the host never modifies them; they are copied back only when the host
//! asks for a full snapshot.
//!
//! Buffers cross the boundary as raw bytes. Positions travel interleaved
//! (`[x, y]` per cell), seeds as `u32`.

use rayon::prelude::*;

use crate::error::{SimError, SimResult};
use crate::integrate::{Forces, integrate_point};
use crate::layout::LaneLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Positions,
    PrevPositions,
    Seeds,
}

impl Binding {
    pub fn element_size(self) -> usize {
        match self {
            Binding::Positions | Binding::PrevPositions => std::mem::size_of::<[f32; 2]>(),
            Binding::Seeds => std::mem::size_of::<u32>(),
        }
    }
}

/// An accelerator able to hold the three integration buffers and run the
/// integration kernel over a 2D grid. Every call is synchronous.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn allocate(&mut self, dims: [u32; 2]) -> SimResult<()>;

    fn write(&mut self, binding: Binding, bytes: &[u8]) -> SimResult<()>;

    fn read(&mut self, binding: Binding, out: &mut [u8]) -> SimResult<()>;

    fn dispatch_integrate(&mut self, dims: [u32; 2], drift: f32) -> SimResult<()>;

    fn stats(&self) -> TransferStats {
        TransferStats::default()
    }
}

/// Integration kernel: one work-item per grid cell `(x, y)`, addressing
/// `x + y * dims[0]`. Same arithmetic as the host integrator; the horizontal
/// wind range is `constants.wind_range_x + drift`.
pub fn integrate_kernel(
    dims: [u32; 2],
    drift: f32,
    constants: &Forces,
    pos: &mut [[f32; 2]],
    prev: &mut [[f32; 2]],
    seeds: &mut [u32],
) {
    let w = dims[0] as usize;
    let forces = Forces {
        wind_range_x: constants.wind_range_x + drift,
        ..*constants
    };
    pos.par_chunks_mut(w)
        .zip(prev.par_chunks_mut(w))
        .zip(seeds.par_chunks_mut(w))
        .for_each(|((pos, prev), seeds)| {
            for x in 0..w {
                integrate_point(&mut pos[x], &mut prev[x], &mut seeds[x], &forces);
            }
        });
}

/// Byte counters for one device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploads: usize,
    pub downloads: usize,
    pub bytes_up: usize,
    pub bytes_down: usize,
    pub dispatches: usize,
}

/// Emulated accelerator: device memory is host memory owned by this struct and
/// the kernel runs on the rayon pool.
pub struct HostDevice {
    constants: Forces,
    dims: [u32; 2],
    pos: Vec<[f32; 2]>,
    prev: Vec<[f32; 2]>,
    seeds: Vec<u32>,
    stats: TransferStats,
}

impl HostDevice {
    /// `constants` are the forces at zero drift, fixed for the device's lifetime.
    pub fn new(constants: Forces) -> Self {
        Self {
            constants,
            dims: [0, 0],
            pos: Vec::new(),
            prev: Vec::new(),
            seeds: Vec::new(),
            stats: TransferStats::default(),
        }
    }

    fn bytes_mut(&mut self, binding: Binding) -> &mut [u8] {
        match binding {
            Binding::Positions => bytemuck::cast_slice_mut(&mut self.pos),
            Binding::PrevPositions => bytemuck::cast_slice_mut(&mut self.prev),
            Binding::Seeds => bytemuck::cast_slice_mut(&mut self.seeds),
        }
    }

    fn check(&self, binding: Binding, actual: usize) -> SimResult<()> {
        let expected = self.dims[0] as usize * self.dims[1] as usize * binding.element_size();
        if expected != actual {
            return Err(SimError::BufferSize {
                binding,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn allocate(&mut self, dims: [u32; 2]) -> SimResult<()> {
        let n = dims[0] as usize * dims[1] as usize;
        self.dims = dims;
        self.pos = vec![[0.0; 2]; n];
        self.prev = vec![[0.0; 2]; n];
        self.seeds = vec![0; n];
        Ok(())
    }

    fn write(&mut self, binding: Binding, bytes: &[u8]) -> SimResult<()> {
        self.check(binding, bytes.len())?;
        self.bytes_mut(binding).copy_from_slice(bytes);
        self.stats.uploads += 1;
        self.stats.bytes_up += bytes.len();
        Ok(())
    }

    fn read(&mut self, binding: Binding, out: &mut [u8]) -> SimResult<()> {
        self.check(binding, out.len())?;
        out.copy_from_slice(self.bytes_mut(binding));
        self.stats.downloads += 1;
        self.stats.bytes_down += out.len();
        Ok(())
    }

    fn dispatch_integrate(&mut self, dims: [u32; 2], drift: f32) -> SimResult<()> {
        if dims != self.dims {
            return Err(SimError::Dispatch {
                message: format!("dispatch {:?} on buffers sized {:?}", dims, self.dims),
            });
        }
        integrate_kernel(
            dims,
            drift,
            &self.constants,
            &mut self.pos,
            &mut self.prev,
            &mut self.seeds,
        );
        self.stats.dispatches += 1;
        Ok(())
    }

    fn stats(&self) -> TransferStats {
        self.stats
    }
}

/// Moves the lane layout's integration state to and from a [`Device`].
pub struct OffloadGateway {
    device: Box<dyn Device>,
    dims: [u32; 2],
    staging: Vec<[f32; 2]>,
    prev_on_device: bool,
    host_prev_stale: bool,
    /// Set by a failed step; device state is unknown until `invalidate`.
    failed: bool,
}

impl OffloadGateway {
    pub fn new(mut device: Box<dyn Device>, layout: &LaneLayout) -> SimResult<Self> {
        let dims = [layout.map.width as u32, layout.map.height as u32];
        device.allocate(dims)?;
        log::debug!("offload gateway on '{}' device, dims {:?}", device.name(), dims);
        Ok(Self {
            device,
            dims,
            staging: vec![[0.0; 2]; layout.len()],
            prev_on_device: false,
            host_prev_stale: false,
            failed: false,
        })
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    /// True while the host copy of previous positions lags the device.
    pub fn host_prev_stale(&self) -> bool {
        self.host_prev_stale
    }

    /// True after a failed step, until [`OffloadGateway::invalidate`].
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// One integration macro-step on the device. Blocks until the results are
    /// back on the host. A transfer failure is returned as is with no retry, and
    /// every later call fails until the host state is uploaded afresh.
    pub fn integrate(&mut self, layout: &mut LaneLayout, drift: f32) -> SimResult<()> {
        self.ensure_usable()?;
        let result = self.round_trip(layout, drift);
        self.failed = result.is_err();
        result
    }

    fn round_trip(&mut self, layout: &mut LaneLayout, drift: f32) -> SimResult<()> {
        pack(&mut self.staging, &layout.pos_x, &layout.pos_y);
        self.device
            .write(Binding::Positions, bytemuck::cast_slice(&self.staging))?;
        if !self.prev_on_device {
            pack(&mut self.staging, &layout.prev_x, &layout.prev_y);
            self.device
                .write(Binding::PrevPositions, bytemuck::cast_slice(&self.staging))?;
            self.prev_on_device = true;
        }
        self.device
            .write(Binding::Seeds, bytemuck::cast_slice(&layout.seeds))?;

        self.device.dispatch_integrate(self.dims, drift)?;
        // The device has moved on; host previous positions lag from here.
        self.host_prev_stale = true;

        self.device
            .read(Binding::Positions, bytemuck::cast_slice_mut(&mut self.staging))?;
        unpack(&self.staging, &mut layout.pos_x, &mut layout.pos_y);
        self.device
            .read(Binding::Seeds, bytemuck::cast_slice_mut(&mut layout.seeds))?;
        Ok(())
    }

    /// Copy previous positions back to the host if they are stale.
    pub fn sync_previous(&mut self, layout: &mut LaneLayout) -> SimResult<()> {
        self.ensure_usable()?;
        if !self.host_prev_stale {
            return Ok(());
        }
        let result = self
            .device
            .read(Binding::PrevPositions, bytemuck::cast_slice_mut(&mut self.staging));
        if let Err(e) = result {
            self.failed = true;
            return Err(e);
        }
        unpack(&self.staging, &mut layout.prev_x, &mut layout.prev_y);
        self.host_prev_stale = false;
        Ok(())
    }

    /// Forget device-resident state after the host rewrote the layout.
    pub fn invalidate(&mut self) {
        self.prev_on_device = false;
        self.host_prev_stale = false;
        self.failed = false;
    }

    fn ensure_usable(&self) -> SimResult<()> {
        if self.failed {
            return Err(SimError::Transfer {
                message: format!(
                    "'{}' device failed an earlier step; reset before stepping again",
                    self.device.name()
                ),
            });
        }
        Ok(())
    }
}

fn pack(out: &mut [[f32; 2]], xs: &[f32], ys: &[f32]) {
    for (o, (&x, &y)) in out.iter_mut().zip(xs.iter().zip(ys)) {
        *o = [x, y];
    }
}

fn unpack(src: &[[f32; 2]], xs: &mut [f32], ys: &mut [f32]) {
    for (&[x, y], (ox, oy)) in src.iter().zip(xs.iter_mut().zip(ys.iter_mut())) {
        *ox = x;
        *oy = y;
    }
}
