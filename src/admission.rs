//! Inbound admission: privilege and per-caller cooldown checks that run before a command
//! handler is allowed to produce any outbound work.
//!
//! - [`PermissionResolver`]: maps caller + conversation to a [`PrivilegeLevel`].
//! - [`CooldownTracker`]: last accepted invocation per (caller, command).
//! - [`AdmissionGate`]: combines both into an [`Verdict`].
//!
//! Denials are rendered into user-facing text by the command layer and never reach the
//! scheduler.

pub mod cooldown;
pub mod permission;

pub use cooldown::CooldownTracker;
pub use permission::{
    ConversationContext, GroupMember, OwnerListResolver, PermissionResolver, PrivilegeLevel,
    UnknownPrivilege,
};

use crate::clock::{Clock, MonotonicClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What a command declares about itself to the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Primary name, matched case-insensitively.
    pub name: String,
    /// Alternative names routed to the same handler.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Minimum caller level.
    #[serde(default, alias = "role")]
    pub required_level: PrivilegeLevel,
    /// Minimum gap between accepted invocations by one caller.
    #[serde(default, with = "secs")]
    pub cool_down: Duration,
    /// One-line description for help listings.
    #[serde(default)]
    pub description: String,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            aliases: Vec::new(),
            required_level: PrivilegeLevel::Member,
            cool_down: Duration::ZERO,
            description: String::new(),
        }
    }

    pub fn required_level(mut self, level: PrivilegeLevel) -> Self {
        self.required_level = level;
        self
    }

    pub fn cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    pub fn cool_down_secs(self, secs: u64) -> Self {
        self.cool_down(Duration::from_secs(secs))
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Why an invocation was refused. `Display` is the text shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("You need {required} permission to use this command.")]
    InsufficientPrivilege { required: PrivilegeLevel, actual: PrivilegeLevel },
    #[error("Please wait {:.1} seconds before using this command again.", .remaining.as_secs_f64())]
    OnCooldown { remaining: Duration },
}

impl Denial {
    pub fn is_privilege(&self) -> bool {
        matches!(self, Denial::InsufficientPrivilege { .. })
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, Denial::OnCooldown { .. })
    }

    /// Time left before the caller may retry, for cooldown denials.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Denial::OnCooldown { remaining } => Some(*remaining),
            Denial::InsufficientPrivilege { .. } => None,
        }
    }
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Denied(Denial),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn into_result(self) -> Result<(), Denial> {
        match self {
            Verdict::Accepted => Ok(()),
            Verdict::Denied(denial) => Err(denial),
        }
    }
}

/// Privilege check, then cooldown check-and-record.
///
/// The cooldown timestamp is written on every accepted decision and only then, which makes the
/// cooldown a rolling window per (caller, command).
pub struct AdmissionGate {
    resolver: Arc<dyn PermissionResolver>,
    cooldowns: CooldownTracker,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("tracked", &self.cooldowns.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl AdmissionGate {
    pub fn new(resolver: impl PermissionResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            cooldowns: CooldownTracker::new(),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Use `clock` for cooldown timestamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn resolve(&self, caller: &str, context: &ConversationContext) -> PrivilegeLevel {
        self.resolver.resolve(caller, context)
    }

    /// Decide on an invocation by `caller` already resolved to `resolved`.
    pub fn authorize(&self, caller: &str, spec: &CommandSpec, resolved: PrivilegeLevel) -> Verdict {
        if let Verdict::Denied(denial) = self.authorize_privilege(spec, resolved) {
            return Verdict::Denied(denial);
        }
        let now = self.clock.now_millis();
        match self.cooldowns.try_acquire(caller, &spec.name, spec.cool_down, now) {
            Ok(()) => Verdict::Accepted,
            Err(remaining) => {
                tracing::debug!(caller, command = %spec.name, remaining_ms = remaining.as_millis() as u64, "on cooldown");
                Verdict::Denied(Denial::OnCooldown { remaining })
            }
        }
    }

    /// Privilege check alone; records nothing.
    pub fn authorize_privilege(&self, spec: &CommandSpec, resolved: PrivilegeLevel) -> Verdict {
        if resolved < spec.required_level {
            tracing::debug!(command = %spec.name, required = %spec.required_level, actual = %resolved, "insufficient privilege");
            return Verdict::Denied(Denial::InsufficientPrivilege {
                required: spec.required_level,
                actual: resolved,
            });
        }
        Verdict::Accepted
    }

    /// Resolve the caller's level, then [`AdmissionGate::authorize`].
    pub fn admit(&self, caller: &str, context: &ConversationContext, spec: &CommandSpec) -> Verdict {
        let level = self.resolve(caller, context);
        self.authorize(caller, spec, level)
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }
}
