//! Timing utilities for export progress reporting.
//!
//! Every export is anchored to an [`ExportClock`] started when the export
//! begins. Frame renders are measured individually with [`FrameTimer`] so
//! progress callbacks can report per-frame render cost alongside an ETA.

use std::time::{Duration, Instant};

/// Monotonic clock for one export, with the wall-clock start recorded.
#[derive(Debug, Clone)]
pub struct ExportClock {
    /// The instant the export started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl ExportClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the export started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at export start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Estimated seconds remaining given completed work in `[0.0, 1.0]`.
    pub fn eta_secs(&self, progress: f64) -> f64 {
        eta_secs(self.elapsed_secs(), progress)
    }
}

/// Linear ETA extrapolation. Returns 0 until some progress is made.
pub fn eta_secs(elapsed_secs: f64, progress: f64) -> f64 {
    if progress <= 0.0 {
        return 0.0;
    }
    let progress = progress.min(1.0);
    ((elapsed_secs / progress) - elapsed_secs).max(0.0)
}

/// Measures a single frame render.
#[derive(Debug)]
pub struct FrameTimer {
    started: Instant,
}

impl FrameTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds since the timer started.
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

/// Exponential backoff schedule: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = ExportClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_eta_extrapolates_linearly() {
        assert!((eta_secs(10.0, 0.5) - 10.0).abs() < 1e-9);
        assert!((eta_secs(10.0, 0.25) - 30.0).abs() < 1e-9);
        assert_eq!(eta_secs(10.0, 0.0), 0.0);
        assert_eq!(eta_secs(10.0, 1.0), 0.0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let max = Duration::from_secs(3);
        assert_eq!(backoff_delay(0, base, max), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base, max), Duration::from_secs(3));
        assert_eq!(backoff_delay(40, base, max), Duration::from_secs(3));
    }

    #[test]
    fn test_frame_timer_is_monotonic() {
        let timer = FrameTimer::start();
        let first = timer.elapsed_ms();
        let second = timer.elapsed_ms();
        assert!(second >= first);
    }
}
