use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

/// Events emitted by the dispatch loop.
///
/// The loop is the only producer, so events arrive in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The window is full; the loop suspends until the oldest slot ages out.
    Throttled {
        /// Dispatches inside the window when the check ran
        active: usize,
        /// How long the loop will wait before re-checking
        wait: Duration,
    },
    /// An action was invoked and has completed.
    Dispatched {
        /// Destination key the request was enqueued with
        target: String,
        /// Priority the request was enqueued with
        priority: u8,
        /// Time between enqueue and invocation
        queued_for: Duration,
        /// Whether the action itself succeeded
        outcome: DispatchOutcome,
    },
    /// The scheduler stopped; `abandoned` requests were rejected with `ShuttingDown`.
    Drained {
        abandoned: usize,
    },
}

/// Success or failure of a dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    Failed,
}

impl fmt::Display for SchedulerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerEvent::Throttled { active, wait } => {
                write!(f, "Throttled(active={}, wait={:?})", active, wait)
            }
            SchedulerEvent::Dispatched { target, priority, queued_for, outcome } => write!(
                f,
                "Dispatched(target={}, priority={}, queued={:?}, {})",
                target, priority, queued_for, outcome
            ),
            SchedulerEvent::Drained { abandoned } => write!(f, "Drained(abandoned={})", abandoned),
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Succeeded => write!(f, "ok"),
            DispatchOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[cfg_attr(not(feature = "telemetry-json"), allow(dead_code))]
#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert a SchedulerEvent into a JSON value for sinks.
#[cfg(feature = "telemetry-json")]
pub fn event_to_json(event: &SchedulerEvent) -> serde_json::Value {
    match event {
        SchedulerEvent::Throttled { active, wait } => json!({
            "kind": "throttled",
            "active": *active,
            "wait_ms": clamp_u64(wait.as_millis()),
        }),
        SchedulerEvent::Dispatched { target, priority, queued_for, outcome } => json!({
            "kind": "dispatched",
            "target": target,
            "priority": *priority,
            "queued_ms": clamp_u64(queued_for.as_millis()),
            "ok": *outcome == DispatchOutcome::Succeeded,
        }),
        SchedulerEvent::Drained { abandoned } => json!({
            "kind": "drained",
            "abandoned": *abandoned,
        }),
    }
}
