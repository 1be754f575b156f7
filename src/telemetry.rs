//! Telemetry for the dispatch loop.
//!
//! The loop emits a [`SchedulerEvent`] whenever it suspends on a full window, finishes a
//! dispatch, or drains at shutdown. Sinks are `tower::Service<SchedulerEvent>` values, so
//! anything that can consume a request can consume events.
//!
//! ```rust
//! use pacekeeper::telemetry::{MemorySink, SchedulerEvent};
//! use tower::Service;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut sink = MemorySink::new();
//! sink.call(SchedulerEvent::Drained { abandoned: 0 }).await.unwrap();
//! assert_eq!(sink.len(), 1);
//! # }
//! ```
//!
//! Load is observed by polling rather than by events: see [`StatsReporter`].

pub mod events;
pub mod sinks;
pub mod stats;

#[cfg(feature = "telemetry-json")]
pub use events::event_to_json;
pub use events::{DispatchOutcome, SchedulerEvent};
pub use sinks::{
    emit_best_effort, LogSink, MemorySink, NonBlockingSink, NullSink, StreamingSink,
    TelemetrySink,
};
pub use stats::{format_uptime, StatsReporter, StatsSnapshot};
