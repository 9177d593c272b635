//! Clock utilities: wall-clock timestamps anchored to the monotonic clock.
//!
//! Devices act on absolute wall-clock timestamps (seconds since the Unix
//! epoch, as `f64`). The coordinator samples the system wall clock once,
//! at construction, and derives every later wall timestamp from the
//! monotonic clock. Wall timestamps therefore never jump when the system
//! clock is adjusted, and deadlines computed from them map back onto
//! monotonic instants exactly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall clock anchored to a monotonic origin.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    /// Monotonic instant at construction.
    origin: Instant,
    /// Wall-clock seconds since the Unix epoch at `origin`.
    origin_wall: f64,
}

impl Clock {
    /// Create a clock anchored at the current system time.
    pub fn new() -> Self {
        Self::with_wall_origin(unix_now())
    }

    /// Create a clock whose current wall time is `wall_secs`.
    pub fn with_wall_origin(wall_secs: f64) -> Self {
        Self {
            origin: Instant::now(),
            origin_wall: wall_secs,
        }
    }

    /// Current wall-clock time in seconds since the Unix epoch.
    pub fn now_wall(&self) -> f64 {
        self.wall_at(Instant::now())
    }

    /// Wall-clock time corresponding to a monotonic instant.
    pub fn wall_at(&self, instant: Instant) -> f64 {
        if instant >= self.origin {
            self.origin_wall + (instant - self.origin).as_secs_f64()
        } else {
            self.origin_wall - (self.origin - instant).as_secs_f64()
        }
    }

    /// Monotonic instant at which the wall clock reads `wall_secs`.
    ///
    /// Timestamps before the clock's origin map to the origin.
    pub fn instant_at(&self, wall_secs: f64) -> Instant {
        let delta = wall_secs - self.origin_wall;
        if delta >= 0.0 {
            self.origin + secs_to_duration(delta)
        } else {
            self.origin
                .checked_sub(secs_to_duration(-delta))
                .unwrap_or(self.origin)
        }
    }

    /// Seconds elapsed since `wall_secs`; negative if it lies in the future.
    pub fn since(&self, wall_secs: f64) -> f64 {
        self.now_wall() - wall_secs
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Current system wall-clock time in seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// Convert seconds to a `Duration`, clamping negative and non-finite input to zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
