//! # Wall Clock and Deterministic Time Budgets

use std::time::{Duration, Instant};

/// A time budget with a wall clock and a deterministic component
///
/// The deterministic clock is advanced explicitly by the optimizers with a
/// load independent estimate of the work they did.
#[derive(Clone, Debug)]
pub struct TimeLimit {
    start: Instant,
    wall_limit: Option<Duration>,
    det_limit: f64,
    det_elapsed: f64,
}

impl TimeLimit {
    pub fn new(max_time_in_seconds: f64, max_deterministic_time: f64) -> Self {
        TimeLimit {
            start: Instant::now(),
            wall_limit: if max_time_in_seconds.is_finite() {
                Some(Duration::from_secs_f64(max_time_in_seconds.max(0.)))
            } else {
                None
            },
            det_limit: max_deterministic_time,
            det_elapsed: 0.,
        }
    }

    pub fn infinite() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY)
    }

    pub fn limit_reached(&self) -> bool {
        self.det_elapsed >= self.det_limit
            || self
                .wall_limit
                .is_some_and(|lim| self.start.elapsed() >= lim)
    }

    /// Remaining wall clock time in seconds
    pub fn time_left(&self) -> f64 {
        match self.wall_limit {
            Some(lim) => lim.saturating_sub(self.start.elapsed()).as_secs_f64(),
            None => f64::INFINITY,
        }
    }

    pub fn deterministic_time_left(&self) -> f64 {
        (self.det_limit - self.det_elapsed).max(0.)
    }

    pub fn elapsed_deterministic_time(&self) -> f64 {
        self.det_elapsed
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn advance_deterministic_time(&mut self, dtime: f64) {
        debug_assert!(dtime >= 0.);
        self.det_elapsed += dtime;
    }

    /// A budget for a single optimizer call that may use `ratio` of what is
    /// left of this one
    pub fn sub_limit(&self, ratio: f64) -> TimeLimit {
        let ratio = ratio.clamp(0., 1.);
        TimeLimit::new(
            self.time_left() * ratio,
            self.deterministic_time_left() * ratio,
        )
    }
}
