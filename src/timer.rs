use std::time::Instant;

use parking_lot::Mutex;

/// Monotonic millisecond tick source.
pub trait Clock {
    fn ticks(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn ticks(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock advanced by hand, used by headless runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            ticks: Mutex::new(start),
        }
    }

    pub fn advance(&self, millis: f64) {
        *self.ticks.lock() += millis.max(0.0);
    }

    pub fn set(&self, ticks: f64) {
        let mut current = self.ticks.lock();
        *current = current.max(ticks);
    }
}

impl Clock for ManualClock {
    fn ticks(&self) -> f64 {
        *self.ticks.lock()
    }
}

/// Frame timer holding the current and previous tick and the delta between
/// them in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTimer {
    pub current: f64,
    pub previous: f64,
    pub delta: f32,
}

impl FrameTimer {
    /// Starts the timer at `clock`'s current tick with no previous frame.
    pub fn start(clock: &dyn Clock) -> Self {
        Self {
            current: clock.ticks(),
            previous: 0.0,
            delta: 0.0,
        }
    }

    /// Shifts current into previous, samples the clock and returns the
    /// elapsed seconds.
    pub fn step(&mut self, clock: &dyn Clock) -> f32 {
        self.previous = self.current;
        self.current = clock.ticks().max(self.previous);
        self.delta = ((self.current - self.previous) / 1000.0) as f32;
        self.delta
    }
}
