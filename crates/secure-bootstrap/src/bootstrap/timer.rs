//! [`StartupTimer`]: deadline and retry interval for bring-up.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct StartupTimer {
    start: Instant,
    duration: Duration,
    interval: Duration,
}

impl StartupTimer {
    /// Start a timer now that allows `duration` in total, retrying every `interval`.
    pub fn new(duration: Duration, interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            duration,
            interval,
        }
    }

    pub fn has_not_elapsed(&self) -> bool {
        self.start.elapsed() < self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.start.elapsed())
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Sleep between attempts. Never sleeps past the deadline.
    pub fn retry_delay(&self) -> Duration {
        self.interval.min(self.remaining())
    }
}
