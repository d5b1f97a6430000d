use std::time::{Duration, Instant};

/// Accumulates active time across any number of start/stop intervals.
///
/// Purely a measurement: nothing in a match waits on or expires from it.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin or resume timing. No-op while already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Fold the running interval into the total. No-op while stopped.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self.accumulated + started_at.elapsed(),
            None => self.accumulated,
        }
    }

    /// Elapsed seconds rounded to milliseconds, as reported in telemetry.
    pub fn elapsed_secs(&self) -> f64 {
        (self.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
    }
}
