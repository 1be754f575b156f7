//! Pacing jitter inserted before every dispatch.
//!
//! Each dispatch waits a delay drawn uniformly from `[min, max]` (inclusive, millisecond
//! resolution). Randomizing the gap keeps dispatch timing from lining up with quota
//! boundaries: when a window slot frees up, the next send still lands at an unpredictable
//! offset rather than the instant the slot opens.
//!
//! Notes:
//! - RNG: uses `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//!   [`PacingJitter::sample_with_rng`].
//! - Precision: millisecond conversions saturate to `u64::MAX` to avoid panics on very large
//!   durations.
//! - `min == max` yields a fixed delay, handy for tests that assert exact dispatch times.
//!
//! Example:
//! ```rust
//! use pacekeeper::PacingJitter;
//! use std::time::Duration;
//!
//! let jitter = PacingJitter::new(Duration::from_millis(1200), Duration::from_millis(10_000)).unwrap();
//! let delay = jitter.sample();
//! assert!(delay >= Duration::from_millis(1200) && delay <= Duration::from_millis(10_000));
//! ```

use rand::{rng, Rng};
use std::time::Duration;

/// Uniform delay bounds for inter-dispatch pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingJitter {
    min: Duration,
    max: Duration,
}

impl PacingJitter {
    /// Create a jitter range; errors if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, &'static str> {
        if min > max {
            return Err("pacing jitter: min must not exceed max");
        }
        Ok(Self { min, max })
    }

    /// Fixed delay with no randomness.
    pub fn fixed(delay: Duration) -> Self {
        Self { min: delay, max: delay }
    }

    /// No pacing at all.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a delay using the thread-local RNG.
    pub fn sample(&self) -> Duration {
        let mut rng = rng();
        self.sample_with_rng(&mut rng)
    }

    /// Draw a delay with a custom RNG (for testing).
    pub fn sample_with_rng<R: Rng>(&self, rng: &mut R) -> Duration {
        let lower = Self::as_millis_saturated(self.min);
        let upper = Self::as_millis_saturated(self.max);
        if lower == upper {
            return self.min;
        }
        // Millisecond truncation must not undercut a sub-millisecond floor.
        Duration::from_millis(rng.random_range(lower..=upper)).clamp(self.min, self.max)
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX) // Saturate extremely large durations
    }
}
