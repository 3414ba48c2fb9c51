//! Fixed-rate tick scheduling on the authority's session clock.
//!
//! Wall-clock frame time is clamped and fed to one [`TickSchedule`] per
//! schedule (network, session). Each schedule turns accumulated time into a
//! whole number of ticks and reports the session time of each tick it owes.

use tracing::warn;

/// Default cap on one frame's contribution, in seconds.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Caps a frame's duration so a stall cannot queue an unbounded burst of
/// ticks. Negative or non-finite input counts as zero.
pub fn clamp_frame_time(frame_time: f64, max_frame_time: f64) -> f64 {
    if !frame_time.is_finite() || frame_time < 0.0 {
        return 0.0;
    }
    if frame_time > max_frame_time {
        warn!(
            "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
            frame_time * 1000.0,
            max_frame_time * 1000.0
        );
        return max_frame_time;
    }
    frame_time
}

/// Fixed-timestep accumulator for one schedule.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    dt: f64,
    accumulator: f64,
    total_ticks: u64,
}

impl TickSchedule {
    /// A schedule ticking `rate_hz` times per second. A zero rate is treated
    /// as 1 Hz.
    pub fn with_tick_rate(rate_hz: u32) -> Self {
        Self {
            dt: 1.0 / f64::from(rate_hz.max(1)),
            accumulator: 0.0,
            total_ticks: 0,
        }
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Ticks run so far.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Adds `frame_time` (already clamped) and returns the session times of
    /// the ticks now due, oldest first.
    pub fn advance(&mut self, frame_time: f64) -> impl Iterator<Item = f64> + use<> {
        self.accumulator += frame_time;
        let first = self.total_ticks + 1;
        let mut due = 0u64;
        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            due += 1;
        }
        self.total_ticks += due;
        let dt = self.dt;
        (first..first + due).map(move |tick| tick as f64 * dt)
    }
}
