//! Persistence for user and group records.
//!
//! Every backend honours the same two rules:
//!
//! - reads create: `get_user`/`get_group` on an unknown id insert and return the default record;
//! - updates patch: only the fields set in a [`UserPatch`]/[`GroupPatch`] change, and updating an
//!   unknown id creates the default record first.
//!
//! Backends shipped here are [`MemoryStore`] and [`JsonFileStore`]; an embedded SQL backend lives
//! in the `pacekeeper-sqlite` crate.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-user state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub coins: i64,
    #[serde(default)]
    pub exp: i64,
    #[serde(default = "first_level")]
    pub level: u32,
    /// Epoch millis of the last tracked command.
    #[serde(default)]
    pub last_active: u64,
    #[serde(default)]
    pub command_count: u64,
    #[serde(default)]
    pub last_daily_reward: Option<String>,
    /// Epoch millis of record creation.
    #[serde(default)]
    pub join_date: u64,
}

fn first_level() -> u32 {
    1
}

impl UserRecord {
    /// The record created on first access.
    pub fn new(id: impl Into<String>, name: Option<&str>, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            name: name.unwrap_or_default().to_string(),
            coins: 0,
            exp: 0,
            level: 1,
            last_active: now_ms,
            command_count: 0,
            last_daily_reward: None,
            join_date: now_ms,
        }
    }

    /// Adopt `hint` as the stored name when it is non-empty and differs. Returns whether it changed.
    pub fn refresh_name(&mut self, hint: Option<&str>) -> bool {
        match hint {
            Some(name) if !name.is_empty() && name != self.name => {
                self.name = name.to_string();
                true
            }
            _ => false,
        }
    }
}

/// Per-group state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub command_count: u64,
    #[serde(default)]
    pub members: Vec<String>,
}

impl GroupRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), settings: Map::new(), command_count: 0, members: Vec::new() }
    }
}

/// Partial update for a [`UserRecord`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub coins: Option<i64>,
    pub exp: Option<i64>,
    pub level: Option<u32>,
    pub last_active: Option<u64>,
    pub command_count: Option<u64>,
    /// `Some(None)` clears the field.
    pub last_daily_reward: Option<Option<String>>,
}

impl UserPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn coins(mut self, coins: i64) -> Self {
        self.coins = Some(coins);
        self
    }

    pub fn exp(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn last_active(mut self, millis: u64) -> Self {
        self.last_active = Some(millis);
        self
    }

    pub fn command_count(mut self, count: u64) -> Self {
        self.command_count = Some(count);
        self
    }

    pub fn last_daily_reward(mut self, value: Option<String>) -> Self {
        self.last_daily_reward = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, user: &mut UserRecord) {
        if let Some(v) = self.name {
            user.name = v;
        }
        if let Some(v) = self.coins {
            user.coins = v;
        }
        if let Some(v) = self.exp {
            user.exp = v;
        }
        if let Some(v) = self.level {
            user.level = v;
        }
        if let Some(v) = self.last_active {
            user.last_active = v;
        }
        if let Some(v) = self.command_count {
            user.command_count = v;
        }
        if let Some(v) = self.last_daily_reward {
            user.last_daily_reward = v;
        }
    }
}

/// Partial update for a [`GroupRecord`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPatch {
    /// Replaces the whole settings map.
    pub settings: Option<Map<String, Value>>,
    pub command_count: Option<u64>,
    pub members: Option<Vec<String>>,
}

impl GroupPatch {
    pub fn settings(mut self, settings: Map<String, Value>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn command_count(mut self, count: u64) -> Self {
        self.command_count = Some(count);
        self
    }

    pub fn members(mut self, members: Vec<String>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn apply(self, group: &mut GroupRecord) {
        if let Some(v) = self.settings {
            group.settings = v;
        }
        if let Some(v) = self.command_count {
            group.command_count = v;
        }
        if let Some(v) = self.members {
            group.members = v;
        }
    }
}

/// Record counts, for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub user_count: usize,
    pub group_count: usize,
}

/// Errors surfaced by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Create-on-read, patch-on-write persistence for users and groups.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user, creating the default record on first access and refreshing the stored name
    /// from `name_hint`.
    async fn get_user(&self, id: &str, name_hint: Option<&str>) -> Result<UserRecord, StoreError>;

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError>;

    async fn get_group(&self, id: &str) -> Result<GroupRecord, StoreError>;

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupRecord, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Count one executed command for `id` and stamp `last_active`.
    ///
    /// The provided body reads then writes in two calls, so concurrent tracking can lose
    /// increments. The bundled backends override it with a single atomic update.
    async fn track_command(
        &self,
        id: &str,
        name_hint: Option<&str>,
        now_ms: u64,
    ) -> Result<UserRecord, StoreError> {
        let user = self.get_user(id, name_hint).await?;
        let patch = UserPatch::default()
            .command_count(user.command_count.saturating_add(1))
            .last_active(now_ms);
        self.update_user(id, patch).await
    }
}
