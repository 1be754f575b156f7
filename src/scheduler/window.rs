//! Exact sliding-window dispatch counter.
//!
//! Holds one timestamp per dispatch that is still inside the trailing window. A timestamp `t`
//! is retained while `now - window < t`, so a slot frees at exactly `t + window`. Old records
//! are pruned lazily, on every admission check, never by a background task.

use std::collections::VecDeque;
use std::time::Duration;

/// Result of an admission check against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    /// A slot is free; `active` dispatches remain in the window.
    Open { active: usize },
    /// At quota; the oldest record frees a slot after `wait`.
    Full { active: usize, wait: Duration },
}

impl WindowVerdict {
    pub fn is_open(&self) -> bool {
        matches!(self, WindowVerdict::Open { .. })
    }
}

/// Whole milliseconds, rounded up so the counted window is never shorter than configured.
fn ceil_millis(window: Duration) -> u64 {
    let whole = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    if window.subsec_nanos() % 1_000_000 == 0 {
        whole
    } else {
        whole.saturating_add(1)
    }
}

/// Trailing-window counter. Timestamps are pushed in non-decreasing order.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    window_ms: u64,
    max_requests: usize,
    timestamps: VecDeque<u64>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window_ms: ceil_millis(window),
            max_requests: max_requests as usize,
            timestamps: VecDeque::with_capacity((max_requests as usize).min(1024)),
        }
    }

    /// Drop records that have aged out as of `now_ms`.
    pub fn prune(&mut self, now_ms: u64) {
        let floor = now_ms.saturating_sub(self.window_ms);
        while self.timestamps.front().is_some_and(|&t| t <= floor && now_ms >= self.window_ms) {
            self.timestamps.pop_front();
        }
    }

    /// Prune, then report whether a dispatch may happen at `now_ms`.
    pub fn check(&mut self, now_ms: u64) -> WindowVerdict {
        self.prune(now_ms);
        let active = self.timestamps.len();
        if active < self.max_requests {
            return WindowVerdict::Open { active };
        }
        let oldest = self.timestamps.front().copied().unwrap_or(now_ms);
        let frees_at = oldest.saturating_add(self.window_ms);
        WindowVerdict::Full { active, wait: Duration::from_millis(frees_at.saturating_sub(now_ms)) }
    }

    /// Record a dispatch at `now_ms`.
    pub fn record(&mut self, now_ms: u64) {
        let at = self.timestamps.back().map_or(now_ms, |&last| now_ms.max(last));
        self.timestamps.push_back(at);
    }

    /// Dispatches still inside the window at `now_ms`, without pruning.
    pub fn active_at(&self, now_ms: u64) -> usize {
        if now_ms < self.window_ms {
            return self.timestamps.len();
        }
        let floor = now_ms - self.window_ms;
        self.timestamps.iter().filter(|&&t| t > floor).count()
    }

    /// Records currently retained (may include expired ones until the next prune).
    pub fn retained(&self) -> usize {
        self.timestamps.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}
