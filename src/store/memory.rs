use super::{GroupPatch, GroupRecord, StoreError, StoreStats, UserPatch, UserRecord, UserStore};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Users and groups keyed by id. Shared by the in-memory and flat-file backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupRecord>,
}

impl Tables {
    /// Returns the user and whether anything was written.
    pub fn get_user(&mut self, id: &str, name_hint: Option<&str>, now_ms: u64) -> (UserRecord, bool) {
        if let Some(user) = self.users.get_mut(id) {
            let renamed = user.refresh_name(name_hint);
            return (user.clone(), renamed);
        }
        let user = UserRecord::new(id, name_hint, now_ms);
        self.users.insert(id.to_string(), user.clone());
        (user, true)
    }

    pub fn update_user(&mut self, id: &str, patch: UserPatch, now_ms: u64) -> UserRecord {
        let user = self
            .users
            .entry(id.to_string())
            .or_insert_with(|| UserRecord::new(id, None, now_ms));
        patch.apply(user);
        user.clone()
    }

    /// Get-or-create, refresh the name, bump `command_count`, stamp `last_active`. One step.
    pub fn track_command(
        &mut self,
        id: &str,
        name_hint: Option<&str>,
        created_ms: u64,
        now_ms: u64,
    ) -> UserRecord {
        let user = self
            .users
            .entry(id.to_string())
            .or_insert_with(|| UserRecord::new(id, name_hint, created_ms));
        user.refresh_name(name_hint);
        user.command_count = user.command_count.saturating_add(1);
        user.last_active = now_ms;
        user.clone()
    }

    pub fn get_group(&mut self, id: &str) -> (GroupRecord, bool) {
        if let Some(group) = self.groups.get(id) {
            return (group.clone(), false);
        }
        let group = GroupRecord::new(id);
        self.groups.insert(id.to_string(), group.clone());
        (group, true)
    }

    pub fn update_group(&mut self, id: &str, patch: GroupPatch) -> GroupRecord {
        let group = self.groups.entry(id.to_string()).or_insert_with(|| GroupRecord::new(id));
        patch.apply(group);
        group.clone()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats { user_count: self.users.len(), group_count: self.groups.len() }
    }
}

/// Process-local store. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { tables: Arc::new(Mutex::new(Tables::default())), clock: Arc::new(SystemClock) }
    }

    /// Timestamp new records with `clock`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &str, name_hint: Option<&str>) -> Result<UserRecord, StoreError> {
        let now = self.clock.now_millis();
        Ok(self.tables().get_user(id, name_hint, now).0)
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let now = self.clock.now_millis();
        Ok(self.tables().update_user(id, patch, now))
    }

    async fn get_group(&self, id: &str) -> Result<GroupRecord, StoreError> {
        Ok(self.tables().get_group(id).0)
    }

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupRecord, StoreError> {
        Ok(self.tables().update_group(id, patch))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.tables().stats())
    }

    async fn track_command(
        &self,
        id: &str,
        name_hint: Option<&str>,
        now_ms: u64,
    ) -> Result<UserRecord, StoreError> {
        let created = self.clock.now_millis();
        Ok(self.tables().track_command(id, name_hint, created, now_ms))
    }
}
