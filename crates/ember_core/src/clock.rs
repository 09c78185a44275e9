//! # Frame Clock
//!
//! Measures frame times and optionally holds a loop to a target rate.

use std::time::{Duration, Instant};

/// Running timer with an average over every recorded tick.
#[derive(Clone, Debug)]
pub struct FrameClock {
    total: Duration,
    iterations: u64,
    last: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Creates a started clock with an empty average.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total: Duration::ZERO,
            iterations: 0,
            last: Instant::now(),
        }
    }

    /// Clears the average and restarts the timing period.
    pub fn reset(&mut self) {
        self.total = Duration::ZERO;
        self.iterations = 0;
        self.start();
    }

    /// Starts a new timing period.
    #[inline]
    pub fn start(&mut self) {
        self.last = Instant::now();
    }

    /// Seconds since the period started. Does not restart or record.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.last.elapsed().as_secs_f64()
    }

    /// Records the elapsed time, restarts the period and returns the seconds.
    pub fn tick(&mut self) -> f64 {
        let elapsed = self.last.elapsed();
        self.record(elapsed);
        self.start();
        elapsed.as_secs_f64()
    }

    /// Like [`tick`](Self::tick), then spins until `1 / framerate` seconds have
    /// passed since the period started.
    ///
    /// Does not hold when `1 / framerate` is not a valid [`Duration`].
    pub fn tick_framerate(&mut self, framerate: f64) {
        let elapsed = self.last.elapsed();
        self.record(elapsed);

        if let Ok(budget) = Duration::try_from_secs_f64(1.0 / framerate) {
            while self.last.elapsed() < budget {
                std::hint::spin_loop();
            }
        }
        self.start();
    }

    /// Average recorded tick in seconds, `None` before the first tick.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        if self.iterations == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.total.as_secs_f64() / self.iterations as f64)
    }

    /// Number of recorded ticks.
    #[inline]
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.iterations += 1;
    }
}
