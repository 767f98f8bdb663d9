use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Idle keys are swept once the map grows past this many callers.
const SWEEP_THRESHOLD: usize = 4_096;

/// Per-caller request budget checked before any authentication work.
pub trait RequestLimiter: Send + Sync + std::fmt::Debug {
    /// Record one request for `key`; `false` when the caller is over budget.
    fn check_and_record(&self, key: &str) -> bool;
}

/// Sliding-window limiter keyed by caller (normally the peer IP).
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_per_window: u32,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            max_per_window,
            window,
        }
    }

    pub fn check_and_record_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, times| {
                times
                    .back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
            });
        }

        let times = hits.entry(key.to_string()).or_default();
        while times
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= usize::try_from(self.max_per_window).unwrap_or(usize::MAX) {
            return false;
        }
        times.push_back(now);
        true
    }

    /// Requests counted for `key` in the current window.
    pub fn count(&self, key: &str) -> usize {
        let now = Instant::now();
        let hits = self
            .hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        hits.get(key).map_or(0, |times| {
            times
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < self.window)
                .count()
        })
    }
}

impl RequestLimiter for SlidingWindowLimiter {
    fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }
}
