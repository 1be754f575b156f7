//! Construction-time configuration for the scheduler and the command dispatcher.
//!
//! Both types deserialize from the camelCase JSON shape bots usually keep in their config file
//! and validate on the way in, so an invalid document never produces a value.
//!
//! ```rust
//! use pacekeeper::SchedulerConfig;
//! use std::time::Duration;
//!
//! let cfg = SchedulerConfig::from_json_str(
//!     r#"{ "maxRequests": 2, "windowMs": 1000, "minDelay": 100, "maxDelay": 100 }"#,
//! )
//! .unwrap();
//! assert_eq!(cfg.max_requests(), 2);
//! assert_eq!(cfg.window(), Duration::from_secs(1));
//! ```

use crate::error::ConfigError;
use crate::jitter::PacingJitter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_REQUESTS: u32 = 25;
const DEFAULT_WINDOW_MS: u64 = 60_000;
const DEFAULT_MIN_DELAY_MS: u64 = 1_200;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Validated quota and pacing configuration. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedulerConfig", into = "RawSchedulerConfig")]
pub struct SchedulerConfig {
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    max_delay: Duration,
}

impl SchedulerConfig {
    /// Create a config with validation.
    pub fn new(
        max_requests: u32,
        window: Duration,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::InvalidMaxRequests { provided: max_requests });
        }
        // The window counter works in whole milliseconds.
        if window.as_millis() == 0 {
            return Err(ConfigError::InvalidWindow(window));
        }
        if min_delay > max_delay {
            return Err(ConfigError::InvertedDelay { min: min_delay, max: max_delay });
        }
        Ok(Self { max_requests, window, min_delay, max_delay })
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Dispatches allowed inside one window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the trailing quota window.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Jitter range drawn before every dispatch.
    pub fn jitter(&self) -> PacingJitter {
        // Bounds were validated at construction.
        PacingJitter::new(self.min_delay, self.max_delay)
            .unwrap_or_else(|_| PacingJitter::fixed(self.min_delay))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_millis(DEFAULT_WINDOW_MS),
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedulerConfig {
    #[serde(default = "default_max_requests")]
    max_requests: u32,
    #[serde(default = "default_window_ms")]
    window_ms: u64,
    #[serde(default = "default_min_delay_ms", alias = "minDelay")]
    min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms", alias = "maxDelay")]
    max_delay_ms: u64,
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}
fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}
fn default_min_delay_ms() -> u64 {
    DEFAULT_MIN_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSchedulerConfig) -> Result<Self, Self::Error> {
        SchedulerConfig::new(
            raw.max_requests,
            Duration::from_millis(raw.window_ms),
            Duration::from_millis(raw.min_delay_ms),
            Duration::from_millis(raw.max_delay_ms),
        )
    }
}

impl From<SchedulerConfig> for RawSchedulerConfig {
    fn from(cfg: SchedulerConfig) -> Self {
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_requests: cfg.max_requests,
            window_ms: millis(cfg.window),
            min_delay_ms: millis(cfg.min_delay),
            max_delay_ms: millis(cfg.max_delay),
        }
    }
}

/// Command-surface configuration: prefix, owner accounts, and notice behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    /// Prefix that marks a message as a command, unless a conversation overrides it.
    pub prefix: String,
    /// Caller ids resolved to [`crate::PrivilegeLevel::Owner`].
    #[serde(alias = "adminBot")]
    pub owners: Vec<String>,
    /// Reply when a prefixed message names no known command.
    pub notify_unknown_command: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { prefix: "!".into(), owners: Vec::new(), notify_unknown_command: true }
    }
}

impl DispatcherConfig {
    /// Parse a JSON document; an empty prefix is rejected.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: DispatcherConfig =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if cfg.prefix.trim().is_empty() {
            return Err(ConfigError::Parse("prefix must not be empty".into()));
        }
        Ok(cfg)
    }
}
