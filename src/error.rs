//! Error types surfaced by the scheduler and its configuration.
//!
//! Admission denials live in [`crate::admission::Denial`]; they are resolved by the command layer
//! and never travel through the scheduler. A full quota window is not an error at all: the
//! dispatch loop waits it out internally, so callers only ever see the outcome of their own
//! action or a shutdown.
use std::fmt;
use std::time::Duration;

/// Outcome delivered to an `enqueue` caller when its action did not succeed.
#[derive(Debug, Clone)]
pub enum DispatchError<E> {
    /// The action was dispatched and returned an error; passed through verbatim.
    ActionFailed(E),
    /// The scheduler stopped before the action could complete.
    ShuttingDown,
}

impl<E: fmt::Display> fmt::Display for DispatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionFailed(e) => write!(f, "action failed: {}", e),
            Self::ShuttingDown => write!(f, "scheduler is shutting down"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for DispatchError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ActionFailed(e) => Some(e),
            Self::ShuttingDown => None,
        }
    }
}

impl<E> DispatchError<E> {
    /// Check if the scheduler was shutting down.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
    /// Check if the action itself failed.
    pub fn is_action_failed(&self) -> bool {
        matches!(self, Self::ActionFailed(_))
    }
    /// Get the action's error if this is an ActionFailed variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::ActionFailed(e) => Some(e),
            Self::ShuttingDown => None,
        }
    }
    /// Borrow the action's error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::ActionFailed(e) => Some(e),
            Self::ShuttingDown => None,
        }
    }
    /// Map the action error type.
    pub fn map_inner<F, O>(self, f: O) -> DispatchError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::ActionFailed(e) => DispatchError::ActionFailed(f(e)),
            Self::ShuttingDown => DispatchError::ShuttingDown,
        }
    }
}

/// Errors produced when validating scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_requests` must be > 0.
    #[error("max_requests must be > 0 (got {provided})")]
    InvalidMaxRequests {
        /// Value provided by caller.
        provided: u32,
    },
    /// Window must be at least one millisecond.
    #[error("window must be at least 1ms (got {0:?})")]
    InvalidWindow(Duration),
    /// Jitter bounds are inverted.
    #[error("min_delay ({min:?}) must not exceed max_delay ({max:?})")]
    InvertedDelay { min: Duration, max: Duration },
    /// The configuration document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);
    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}

    #[test]
    fn action_failed_display_and_source() {
        let err = DispatchError::ActionFailed(DummyError("send rejected"));
        assert_eq!(err.to_string(), "action failed: send rejected");
        assert_eq!(err.source().unwrap().to_string(), "send rejected");
        assert!(err.is_action_failed());
        assert!(!err.is_shutting_down());
    }

    #[test]
    fn shutting_down_has_no_source() {
        let err: DispatchError<DummyError> = DispatchError::ShuttingDown;
        assert!(err.source().is_none());
        assert!(err.is_shutting_down());
        assert!(err.as_inner().is_none());
        assert!(err.into_inner().is_none());
    }

    #[test]
    fn map_inner_preserves_variant() {
        let err = DispatchError::ActionFailed(DummyError("x")).map_inner(|e| e.0.len());
        assert_eq!(err.into_inner(), Some(1));
        let err: DispatchError<usize> =
            DispatchError::<DummyError>::ShuttingDown.map_inner(|e| e.0.len());
        assert!(err.is_shutting_down());
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::InvalidMaxRequests { provided: 0 }.to_string(),
            "max_requests must be > 0 (got 0)"
        );
        let msg = ConfigError::InvertedDelay {
            min: Duration::from_millis(5),
            max: Duration::from_millis(1),
        }
        .to_string();
        assert!(msg.contains("min_delay"));
    }
}
