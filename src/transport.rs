//! The outbound side of the session and the scheduler-backed outbox in front of it.
//!
//! A [`Transport`] is the only thing that talks to the remote platform. [`Outbox`] wraps every
//! send into a scheduler action, so callers share the quota window and pacing no matter which
//! task they run on.

use crate::error::DispatchError;
use crate::scheduler::{Priority, Scheduler, Ticket, DEFAULT_PRIORITY};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Status the remote side uses when it is throttling this session.
pub const REMOTE_THROTTLE_STATUS: u16 = 429;

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.status, .message))]
pub struct TransportError {
    /// Platform status code, when the transport has one.
    pub status: Option<u16>,
    pub message: String,
}

fn render(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("transport error {}: {}", code, message),
        None => format!("transport error: {}", message),
    }
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into() }
    }

    /// The remote platform is throttling us; re-enqueue at the same or lower priority.
    pub fn is_remote_throttle(&self) -> bool {
        self.status == Some(REMOTE_THROTTLE_STATUS)
    }
}

/// Sends one payload to one destination over the shared session.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &str, payload: &str) -> Result<(), TransportError>;
}

/// Rate-limited front door for a [`Transport`].
#[derive(Clone)]
pub struct Outbox {
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("scheduler", &self.scheduler).finish()
    }
}

impl Outbox {
    pub fn new(scheduler: Scheduler, transport: Arc<dyn Transport>) -> Self {
        Self { scheduler, transport }
    }

    /// Send at [`DEFAULT_PRIORITY`].
    pub fn send(
        &self,
        target: impl Into<String>,
        payload: impl Into<String>,
    ) -> Ticket<(), TransportError> {
        self.send_with_priority(target, payload, DEFAULT_PRIORITY)
    }

    pub fn send_with_priority(
        &self,
        target: impl Into<String>,
        payload: impl Into<String>,
        priority: Priority,
    ) -> Ticket<(), TransportError> {
        let target = target.into();
        let payload = payload.into();
        let transport = self.transport.clone();
        let key = target.clone();
        self.scheduler.enqueue(
            move || async move { transport.send(&target, &payload).await },
            key,
            priority,
        )
    }

    /// Send, and on a remote-throttle failure queue the same payload once more at `priority`.
    ///
    /// Any other failure, or a second throttle, is returned as is.
    pub async fn send_requeue_on_throttle(
        &self,
        target: impl Into<String>,
        payload: impl Into<String>,
        priority: Priority,
    ) -> Result<(), DispatchError<TransportError>> {
        let target = target.into();
        let payload = payload.into();
        match self.send_with_priority(target.clone(), payload.clone(), priority).await {
            Err(DispatchError::ActionFailed(e)) if e.is_remote_throttle() => {
                tracing::warn!(dest = %target, "remote throttled send; queuing again");
                self.send_with_priority(target, payload, priority).await
            }
            other => other,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
