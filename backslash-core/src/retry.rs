//! Retry window for transient failures.
//!
//! Failed attempts are retried for as long as the window is open, sleeping a
//! uniformly random duration in `[min_sleep, max_sleep)` between attempts.
//! There is no exponential growth: every sleep is drawn from the same range.

use backon::BackoffBuilder;
use rand::Rng;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;

/// [`BackoffBuilder`] producing a deadline-bounded random backoff.
#[derive(Debug, Clone)]
pub struct RetryWindow {
    window: Duration,
    min_sleep: Duration,
    max_sleep: Duration,
}

impl RetryWindow {
    pub fn new(window: Duration, min_sleep: Duration, max_sleep: Duration) -> RetryWindow {
        RetryWindow {
            window,
            min_sleep,
            max_sleep,
        }
    }
}

impl From<&RetryConfig> for RetryWindow {
    fn from(cfg: &RetryConfig) -> Self {
        RetryWindow::new(cfg.window, cfg.min_sleep, cfg.max_sleep)
    }
}

impl BackoffBuilder for RetryWindow {
    type Backoff = WindowBackoff;

    fn build(self) -> Self::Backoff {
        WindowBackoff {
            deadline: Instant::now() + self.window,
            min_sleep: self.min_sleep,
            max_sleep: self.max_sleep,
        }
    }
}

/// Yields sleep durations until the deadline passes.
#[derive(Debug)]
pub struct WindowBackoff {
    deadline: Instant,
    min_sleep: Duration,
    max_sleep: Duration,
}

impl Iterator for WindowBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if Instant::now() >= self.deadline {
            return None;
        }
        Some(random_between(self.min_sleep, self.max_sleep))
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
    if hi <= lo {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..hi))
}
