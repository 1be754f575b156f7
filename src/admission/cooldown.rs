use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Last accepted invocation per (caller, command).
///
/// Entries are overwritten on every accepted invocation and never removed; the key space is
/// bounded by callers times commands.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last: Mutex<HashMap<(String, String), u64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept and record `now_ms`, or return the time left on the cooldown.
    ///
    /// Check and record happen under one lock, so two racing invocations of the same key cannot
    /// both be accepted.
    pub fn try_acquire(
        &self,
        caller: &str,
        command: &str,
        cool_down: Duration,
        now_ms: u64,
    ) -> Result<(), Duration> {
        let cool_down_ms = u64::try_from(cool_down.as_millis()).unwrap_or(u64::MAX);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let key = (caller.to_string(), command.to_string());
        if let Some(&previous) = last.get(&key) {
            let elapsed = now_ms.saturating_sub(previous);
            if elapsed < cool_down_ms {
                return Err(Duration::from_millis(cool_down_ms - elapsed));
            }
        }
        last.insert(key, now_ms);
        Ok(())
    }

    /// Time left for `caller` on `command` at `now_ms`, without recording anything.
    pub fn remaining(&self, caller: &str, command: &str, cool_down: Duration, now_ms: u64) -> Duration {
        let cool_down_ms = u64::try_from(cool_down.as_millis()).unwrap_or(u64::MAX);
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.get(&(caller.to_string(), command.to_string()))
            .map(|&previous| {
                let elapsed = now_ms.saturating_sub(previous);
                Duration::from_millis(cool_down_ms.saturating_sub(elapsed))
            })
            .unwrap_or_default()
    }

    /// Number of tracked (caller, command) pairs.
    pub fn len(&self) -> usize {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
