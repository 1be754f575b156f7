//! SQLite backend for [`pacekeeper::UserStore`].
//!
//! Two tables, `users` and `groups`; group settings and members are stored as JSON text.
//! Every call runs on the blocking pool and holds the connection for one transaction.

use async_trait::async_trait;
use pacekeeper::clock::{Clock, SystemClock};
use pacekeeper::store::{
    GroupPatch, GroupRecord, StoreError, StoreStats, UserPatch, UserRecord, UserStore,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id                TEXT PRIMARY KEY,
    name              TEXT    NOT NULL DEFAULT '',
    coins             INTEGER NOT NULL DEFAULT 0,
    exp               INTEGER NOT NULL DEFAULT 0,
    level             INTEGER NOT NULL DEFAULT 1,
    last_active       INTEGER NOT NULL,
    command_count     INTEGER NOT NULL DEFAULT 0,
    last_daily_reward TEXT,
    join_date         INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS groups (
    id            TEXT PRIMARY KEY,
    settings      TEXT    NOT NULL DEFAULT '{}',
    command_count INTEGER NOT NULL DEFAULT 0,
    members       TEXT    NOT NULL DEFAULT '[]'
);
";

const USER_COLUMNS: &str =
    "id, name, coins, exp, level, last_active, command_count, last_daily_reward, join_date";

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// [`UserStore`] on an embedded SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let conn = Connection::open(&path).map_err(backend)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
                .map_err(backend)?;
            Ok(conn)
        })
        .await
        .map_err(backend)??;
        Self::from_connection(conn)
    }

    /// Private in-memory database, for tests and throwaway agents.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL).map_err(backend)?;
        tracing::debug!("sqlite store ready");
        Ok(Self { conn: Arc::new(Mutex::new(conn)), clock: Arc::new(SystemClock) })
    }

    /// Timestamp new records with `clock`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Run `f` inside one transaction on the blocking pool.
    async fn with_tx<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let tx = conn.transaction().map_err(backend)?;
            let out = f(&tx)?;
            tx.commit().map_err(backend)?;
            Ok(out)
        })
        .await
        .map_err(backend)?
    }
}

/// SQLite integers are signed; unsigned fields above `i64::MAX` are refused, not wrapped.
fn to_sql_int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(backend)
}

fn unsigned_column<T: TryFrom<i64>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: i64 = row.get(idx)?;
    T::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        coins: row.get(2)?,
        exp: row.get(3)?,
        level: unsigned_column(row, 4)?,
        last_active: unsigned_column(row, 5)?,
        command_count: unsigned_column(row, 6)?,
        last_daily_reward: row.get(7)?,
        join_date: unsigned_column(row, 8)?,
    })
}

fn load_user(tx: &Transaction<'_>, id: &str) -> Result<Option<UserRecord>, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    tx.query_row(&sql, params![id], user_from_row).optional().map_err(backend)
}

fn save_user(tx: &Transaction<'_>, user: &UserRecord) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT OR REPLACE INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        USER_COLUMNS
    );
    tx.execute(
        &sql,
        params![
            user.id,
            user.name,
            user.coins,
            user.exp,
            i64::from(user.level),
            to_sql_int(user.last_active)?,
            to_sql_int(user.command_count)?,
            user.last_daily_reward,
            to_sql_int(user.join_date)?,
        ],
    )
    .map_err(backend)?;
    Ok(())
}

fn load_group(tx: &Transaction<'_>, id: &str) -> Result<Option<GroupRecord>, StoreError> {
    let raw = tx
        .query_row(
            "SELECT settings, command_count, members FROM groups WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    unsigned_column::<u64>(row, 1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(backend)?;
    let Some((settings, command_count, members)) = raw else {
        return Ok(None);
    };
    Ok(Some(GroupRecord {
        id: id.to_string(),
        settings: serde_json::from_str(&settings)?,
        command_count,
        members: serde_json::from_str(&members)?,
    }))
}

fn save_group(tx: &Transaction<'_>, group: &GroupRecord) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR REPLACE INTO groups (id, settings, command_count, members) VALUES (?1, ?2, ?3, ?4)",
        params![
            group.id,
            serde_json::to_string(&group.settings)?,
            to_sql_int(group.command_count)?,
            serde_json::to_string(&group.members)?,
        ],
    )
    .map_err(backend)?;
    Ok(())
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, id: &str, name_hint: Option<&str>) -> Result<UserRecord, StoreError> {
        let now = self.clock.now_millis();
        let id = id.to_string();
        let hint = name_hint.map(str::to_string);
        self.with_tx(move |tx| match load_user(tx, &id)? {
            Some(mut user) => {
                if user.refresh_name(hint.as_deref()) {
                    save_user(tx, &user)?;
                }
                Ok(user)
            }
            None => {
                let user = UserRecord::new(id.as_str(), hint.as_deref(), now);
                save_user(tx, &user)?;
                tracing::debug!(user = %id, "user created");
                Ok(user)
            }
        })
        .await
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let now = self.clock.now_millis();
        let id = id.to_string();
        self.with_tx(move |tx| {
            let mut user =
                load_user(tx, &id)?.unwrap_or_else(|| UserRecord::new(id.as_str(), None, now));
            patch.apply(&mut user);
            save_user(tx, &user)?;
            Ok(user)
        })
        .await
    }

    async fn get_group(&self, id: &str) -> Result<GroupRecord, StoreError> {
        let id = id.to_string();
        self.with_tx(move |tx| match load_group(tx, &id)? {
            Some(group) => Ok(group),
            None => {
                let group = GroupRecord::new(id.as_str());
                save_group(tx, &group)?;
                Ok(group)
            }
        })
        .await
    }

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupRecord, StoreError> {
        let id = id.to_string();
        self.with_tx(move |tx| {
            let mut group = load_group(tx, &id)?.unwrap_or_else(|| GroupRecord::new(id.as_str()));
            patch.apply(&mut group);
            save_group(tx, &group)?;
            Ok(group)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.with_tx(|tx| {
            let count = |table: &str| -> Result<usize, StoreError> {
                let sql = format!("SELECT COUNT(*) FROM {}", table);
                let n: i64 = tx.query_row(&sql, [], |row| row.get(0)).map_err(backend)?;
                Ok(n.max(0) as usize)
            };
            Ok(StoreStats { user_count: count("users")?, group_count: count("groups")? })
        })
        .await
    }

    async fn track_command(
        &self,
        id: &str,
        name_hint: Option<&str>,
        now_ms: u64,
    ) -> Result<UserRecord, StoreError> {
        let created = self.clock.now_millis();
        let id = id.to_string();
        let hint = name_hint.map(str::to_string);
        self.with_tx(move |tx| {
            let mut user = load_user(tx, &id)?
                .unwrap_or_else(|| UserRecord::new(id.as_str(), hint.as_deref(), created));
            user.refresh_name(hint.as_deref());
            user.command_count = user.command_count.saturating_add(1);
            user.last_active = now_ms;
            save_user(tx, &user)?;
            Ok(user)
        })
        .await
    }
}
