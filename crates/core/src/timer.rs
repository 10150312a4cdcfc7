//! Frame clock for animation time and FPS reporting.

use std::time::{Duration, Instant};

use tracing::debug;

/// How often the average frame rate is logged.
const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks time since start, per-frame deltas and a rolling FPS counter.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    report_start: Instant,
    frames_since_report: u32,
    total_frames: u64,
}

impl FrameClock {
    /// Create a new clock, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            report_start: now,
            frames_since_report: 0,
            total_frames: 0,
        }
    }

    /// Total elapsed time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in seconds; this drives the model animation.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Number of frames counted by [`FrameClock::tick`].
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Mark the end of a frame and return the time since the previous one.
    ///
    /// Once per second the average frame rate over that window is logged
    /// at debug level and returned.
    pub fn tick(&mut self) -> (Duration, Option<f64>) {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.total_frames += 1;
        self.frames_since_report += 1;

        let window = now - self.report_start;
        if window < FPS_REPORT_INTERVAL {
            return (delta, None);
        }

        let fps = f64::from(self.frames_since_report) / window.as_secs_f64();
        debug!(
            "{:.1} fps ({:.2} ms/frame, {} frames total)",
            fps,
            1000.0 / fps,
            self.total_frames
        );
        self.report_start = now;
        self.frames_since_report = 0;
        (delta, Some(fps))
    }

    /// Reset the clock to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut clock = FrameClock::new();
        for _ in 0..5 {
            clock.tick();
        }
        assert_eq!(clock.total_frames(), 5);
    }

    #[test]
    fn test_fps_reported_after_interval() {
        let mut clock = FrameClock::new();
        let (_, fps) = clock.tick();
        assert!(fps.is_none());

        clock.report_start -= FPS_REPORT_INTERVAL;
        let (_, fps) = clock.tick();
        let fps = fps.expect("fps should be reported after one interval");
        assert!(fps > 0.0);
        assert_eq!(clock.frames_since_report, 0);
    }

    #[test]
    fn test_reset_clears_frames() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.reset();
        assert_eq!(clock.total_frames(), 0);
        assert!(clock.elapsed_secs() < 1.0);
    }
}
