#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # pacekeeper
//!
//! Admission control for chat-automation agents that share one session with a remote platform.
//!
//! ## Features
//!
//! - **Sliding-window quota**: never more than `max_requests` dispatches in any trailing window
//! - **Jittered pacing** between consecutive dispatches
//! - **Priority dispatch** through a single serialized loop
//! - **Per-command cooldowns and privilege levels** for inbound commands
//! - **Pluggable persistence** for user and group records
//! - **Telemetry** as `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use pacekeeper::{Scheduler, SchedulerConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let config = SchedulerConfig::new(
//!     25,
//!     Duration::from_secs(60),
//!     Duration::from_millis(1200),
//!     Duration::from_secs(10),
//! )
//! .unwrap();
//! let scheduler = Scheduler::builder(config).build();
//!
//! let sent = scheduler
//!     .enqueue(|| async { Ok::<_, std::io::Error>(()) }, "chat-1", 5)
//!     .await;
//! assert!(sent.is_ok());
//! scheduler.shutdown().await;
//! # }
//! ```

pub mod admission;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod jitter;
pub mod prelude;
pub mod scheduler;
pub mod sleeper;
pub mod store;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use admission::{
    AdmissionGate, CommandSpec, ConversationContext, CooldownTracker, Denial, GroupMember,
    OwnerListResolver, PermissionResolver, PrivilegeLevel, Verdict,
};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock, TokioClock};
pub use command::{
    CommandDispatcher, CommandHandler, HandlerError, HelpCommand, InboundMessage, Invocation,
    Outcome, PrefixCommand, PrefixTable,
};
pub use config::{DispatcherConfig, SchedulerConfig};
pub use error::{ConfigError, DispatchError};
pub use jitter::PacingJitter;
pub use scheduler::{
    Priority, Scheduler, SchedulerBuilder, SchedulerMonitor, SchedulerStats, Ticket,
    DEFAULT_PRIORITY,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use store::{
    GroupPatch, GroupRecord, JsonFileStore, MemoryStore, StoreError, StoreStats, UserPatch,
    UserRecord, UserStore,
};
pub use transport::{Outbox, Transport, TransportError, REMOTE_THROTTLE_STATUS};
