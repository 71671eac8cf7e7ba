//! Time sources and the per-frame scheduling contract.
//!
//! Playback position is always derived from a [`Clock`] reading rather than
//! accumulated, so every clock here must be monotonic and independent of the
//! playback state.

use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Monotonically increasing time source, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`], starting at zero on construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Externally driven clock. Clones share the same reading, which lets a host
/// (or a test) hold one handle while the playback engine owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start_seconds.to_bits())),
        }
    }

    /// Moves the clock to `seconds`. Readings never go backwards; earlier
    /// values are ignored.
    pub fn set(&self, seconds: f64) {
        if seconds.is_finite() && seconds >= self.now() {
            self.bits.store(seconds.to_bits(), Ordering::Release);
        }
    }

    pub fn advance(&self, delta_seconds: f64) {
        if delta_seconds > 0.0 {
            self.set(self.now() + delta_seconds);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Information handed to the per-frame callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    pub now: f64,
}

/// Host mechanism that invokes the registered update logic once per displayed
/// frame. The callback must return promptly; returning
/// [`ControlFlow::Break`] stops the driver.
pub trait FrameDriver {
    fn run(&mut self, callback: &mut dyn FnMut(FrameTick) -> ControlFlow<()>);
}

/// Deterministic driver that steps a [`ManualClock`] by a fixed interval
/// before every frame, for a bounded number of frames.
#[derive(Debug, Clone)]
pub struct FixedStepDriver {
    clock: ManualClock,
    step_seconds: f64,
    frames: u64,
}

impl FixedStepDriver {
    pub fn new(clock: ManualClock, fps: u32, frames: u64) -> Self {
        let step_seconds = if fps == 0 { 0.0 } else { 1.0 / f64::from(fps) };
        Self {
            clock,
            step_seconds,
            frames,
        }
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }
}

impl FrameDriver for FixedStepDriver {
    fn run(&mut self, callback: &mut dyn FnMut(FrameTick) -> ControlFlow<()>) {
        for index in 0..self.frames {
            self.clock.advance(self.step_seconds);
            let tick = FrameTick {
                index,
                now: self.clock.now(),
            };
            if callback(tick).is_break() {
                tracing::debug!(frame = index, "frame driver stopped by callback");
                break;
            }
        }
    }
}
