//! Convenient re-exports for common pacekeeper types.
pub use crate::{
    admission::{AdmissionGate, CommandSpec, ConversationContext, Denial, PrivilegeLevel, Verdict},
    command::{CommandDispatcher, CommandHandler, HandlerError, InboundMessage, Invocation, Outcome},
    config::{DispatcherConfig, SchedulerConfig},
    error::{ConfigError, DispatchError},
    scheduler::{Priority, Scheduler, Ticket, DEFAULT_PRIORITY},
    store::{UserPatch, UserStore},
    telemetry::{SchedulerEvent, TelemetrySink},
    transport::{Outbox, Transport, TransportError},
};
