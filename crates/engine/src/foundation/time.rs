//! Time management utilities

use std::time::{Duration, Instant};

/// Wall-clock frame timer.
///
/// Produces the per-frame delta fed to the scheduler. Deltas are clamped so a
/// stall (debugger break, window drag) does not turn into one enormous step.
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f64,
    frame_count: u64,
    max_delta: f32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(0.25)
    }
}

impl Timer {
    /// Create a new timer with the given delta clamp (seconds)
    pub fn new(max_delta: f32) -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            max_delta,
        }
    }

    /// Advance the timer; call once per frame. Returns the clamped delta.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame).as_secs_f32();
        self.delta_time = elapsed.min(self.max_delta);
        self.total_time += f64::from(self.delta_time);
        self.last_frame = now;
        self.frame_count += 1;
        self.delta_time
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total simulated time since timer creation
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        let running = self.start_time.map_or(Duration::ZERO, |start| start.elapsed());
        self.elapsed + running
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_clamps_delta() {
        let mut timer = Timer::new(0.0);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(timer.tick(), 0.0);
        assert_eq!(timer.frame_count(), 1);
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut watch = Stopwatch::start_new();
        std::thread::sleep(Duration::from_millis(1));
        watch.stop();
        let first = watch.elapsed();
        assert!(first > Duration::ZERO);
        assert_eq!(watch.elapsed(), first);
    }
}
