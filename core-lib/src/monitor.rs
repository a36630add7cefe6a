/// core-lib/src/monitor.rs
//!
//! Optional x-y scope raster: an opaque square byte buffer a host can
//! render for user diagnosis. The decoder plots the calibrated incoming
//! signal into it every sample; rendering itself is entirely external.

use crate::error::MonitorError;

pub const MONITOR_DECAY_EVERY: u32 = 512;

/// Square byte raster, one byte per pixel.
pub struct Monitor {
    size: usize,
    pixels: Vec<u8>,
    counter: u32,
}

impl Monitor {
    /// Allocate a `size * size` raster, zero-initialized.
    ///
    /// # Errors
    /// Returns [`MonitorError::AllocationFailed`] if the buffer cannot be
    /// allocated; the caller keeps its decoder usable without a monitor.
    pub fn new(size: usize) -> Result<Self, MonitorError> {
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(size * size)
            .map_err(|_| MonitorError::AllocationFailed { size })?;
        pixels.resize(size * size, 0);
        Ok(Self {
            size,
            pixels,
            counter: 0,
        })
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The raw raster, row-major, one byte per pixel.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.iter_mut().for_each(|p| *p = 0);
        self.counter = 0;
    }

    /// Advance the age-out clock and decay every pixel every
    /// `MONITOR_DECAY_EVERY` samples.
    pub fn tick(&mut self) {
        self.counter += 1;
        if self.counter >= MONITOR_DECAY_EVERY {
            self.counter = 0;
            for p in &mut self.pixels {
                *p -= *p / 8;
            }
        }
    }

    /// Plot one (x, y) sample pair, scaled by the tracked reference level
    /// (or, for offset-modulation formats, by the discrete derivatives of
    /// the raw channels scaled by `MK2_OFFSET_FACTOR`; the caller picks
    /// which to pass in).
    pub fn plot(&mut self, x: i32, y: i32, ref_level: i32) {
        if ref_level <= 0 {
            return;
        }
        let half = self.size as i32 / 2;
        let scale = ref_level.max(1) * 8;
        let px = half + (x * self.size as i32) / scale;
        let py = half + (y * self.size as i32) / scale;
        if px >= 0 && py >= 0 && (px as usize) < self.size && (py as usize) < self.size {
            self.pixels[py as usize * self.size + px as usize] = 0xff;
        }
    }
}
