use super::memory::Tables;
use super::{GroupPatch, GroupRecord, StoreError, StoreStats, UserPatch, UserRecord, UserStore};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Single JSON document `{ "users": {..}, "groups": {..} }`, rewritten after every mutation.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the original, so a crash leaves
/// either the old or the new document. A document that fails to parse on open is logged and
/// replaced by an empty one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl JsonFileStore {
    /// Load `path`, creating parent directories and an empty document when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, SystemClock).await
    }

    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        clock: impl Clock + 'static,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<Tables>(&text) {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable store document; starting fresh");
                    Tables::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            path = %path.display(),
            users = tables.users.len(),
            groups = tables.groups.len(),
            "store loaded"
        );

        let store = Self { path, tables: Mutex::new(tables), clock: Arc::new(clock) };
        {
            let tables = store.tables.lock().await;
            store.persist(&tables).await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `change` against a copy of the tables under the lock. When it reports a write, the
    /// copy is persisted and only then swapped in, so a failed write changes nothing.
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut Tables) -> (R, bool),
    ) -> Result<R, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        let (out, changed) = change(&mut next);
        if changed {
            self.persist(&next).await?;
            *tables = next;
        }
        Ok(out)
    }

    async fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(tables)?;
        let mut tmp: OsString = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn get_user(&self, id: &str, name_hint: Option<&str>) -> Result<UserRecord, StoreError> {
        if let Some(user) = self.tables.lock().await.users.get(id) {
            if !user.clone().refresh_name(name_hint) {
                return Ok(user.clone());
            }
        }
        let now = self.clock.now_millis();
        self.commit(|tables| tables.get_user(id, name_hint, now)).await
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let now = self.clock.now_millis();
        self.commit(|tables| (tables.update_user(id, patch, now), true)).await
    }

    async fn get_group(&self, id: &str) -> Result<GroupRecord, StoreError> {
        if let Some(group) = self.tables.lock().await.groups.get(id) {
            return Ok(group.clone());
        }
        self.commit(|tables| tables.get_group(id)).await
    }

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupRecord, StoreError> {
        self.commit(|tables| (tables.update_group(id, patch), true)).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.tables.lock().await.stats())
    }

    async fn track_command(
        &self,
        id: &str,
        name_hint: Option<&str>,
        now_ms: u64,
    ) -> Result<UserRecord, StoreError> {
        let created = self.clock.now_millis();
        self.commit(|tables| (tables.track_command(id, name_hint, created, now_ms), true)).await
    }
}
