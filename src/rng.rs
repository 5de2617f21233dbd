//! Deterministic random streams. Per-point streams are plain `u32` states so
//! they can live in column buffers and cross the device boundary.
use serde::{Deserialize, Serialize};

const GOLDEN_32: u32 = 0x9E3779B9;

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[inline]
fn mix32(mut z: u32) -> u32 {
    z = (z ^ (z >> 16)).wrapping_mul(0x7FEB352D);
    z = (z ^ (z >> 15)).wrapping_mul(0x846CA68B);
    z ^ (z >> 16)
}

/// 24 high bits to `[0, 1)`.
#[inline]
fn unit_f32(bits: u32) -> f32 {
    (bits >> 8) as f32 / 16777216.0
}

/// One sequential stream for building the cloth. Never used in the frame loop.
pub struct SetupRng {
    state: u64,
}

impl SetupRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Uniform in `[0, range)`.
    pub fn uniform(&mut self, range: f32) -> f32 {
        self.state = splitmix64(self.state);
        unit_f32(self.state as u32) * range
    }
}

/// Persistent per-point generator. Each point owns one for the lifetime of the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRng {
    pub state: u32,
}

impl PointRng {
    #[inline]
    pub fn new(state: u32) -> Self {
        Self { state }
    }

    /// Independent starting state for point (x, y) of a run seeded with `seed`.
    pub fn for_point(x: usize, y: usize, seed: u64) -> Self {
        let cell = ((y as u64) << 32) | x as u64;
        Self::new(splitmix64(seed ^ splitmix64(cell)) as u32)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(GOLDEN_32);
        mix32(self.state)
    }

    /// Uniform in `[0, range)`.
    #[inline]
    pub fn uniform(&mut self, range: f32) -> f32 {
        unit_f32(self.next_u32()) * range
    }
}
