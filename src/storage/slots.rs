use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{schema, SlotError};
use crate::config::StorageOptions;

/// Identifies one execution context attached to the shared database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A slot modified by some other context since the last poll. `value` is
/// `None` when the slot was removed or holds NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub key: String,
    pub value: Option<String>,
}

/// Shared key-value slots backed by a SQLite table.
///
/// Each instance owns a single connection. `PRAGMA data_version` on that
/// connection only moves when *another* connection commits, and every row
/// records the context that wrote it, so a context never observes its own
/// writes as changes.
pub struct SlotStore {
    conn: Connection,
    context: ContextId,
    data_version: i64,
    seen: HashMap<String, i64>,
}

impl fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore")
            .field("context", &self.context)
            .field("data_version", &self.data_version)
            .field("seen", &self.seen)
            .finish_non_exhaustive()
    }
}

impl SlotStore {
    pub fn open(options: &StorageOptions) -> Result<Self> {
        let db_path = &options.database_path;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;

        let mut store = Self {
            conn,
            context: ContextId::random(),
            data_version: 0,
            seen: HashMap::new(),
        };
        store.data_version = store
            .current_data_version()
            .context("reading initial data_version")?;
        for (key, revision) in store.revisions().context("reading slot revisions")? {
            store.seen.insert(key, revision);
        }
        tracing::debug!(
            context = %store.context,
            path = %db_path.display(),
            slots = store.seen.len(),
            "opened slot store"
        );
        Ok(store)
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn read(&self, key: &str) -> Result<Option<String>, SlotError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_slots WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Overwrites `key` unconditionally and returns its new revision.
    pub fn write(&mut self, key: &str, value: &str) -> Result<i64, SlotError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let revision: i64 = self.conn.query_row(
            "INSERT INTO kv_slots (key, value, revision, writer, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = kv_slots.revision + 1,
                writer = excluded.writer,
                updated_at = excluded.updated_at
             RETURNING revision",
            params![key, value, self.context.to_string(), now],
            |row| row.get(0),
        )?;
        self.seen.insert(key.to_string(), revision);
        Ok(revision)
    }

    pub fn revision(&self, key: &str) -> Result<Option<i64>, SlotError> {
        let revision = self
            .conn
            .query_row(
                "SELECT revision FROM kv_slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision)
    }

    /// Returns the slots other contexts changed since the previous poll.
    pub fn poll_changes(&mut self) -> Result<Vec<SlotChange>, SlotError> {
        let version = self.current_data_version()?;
        if version == self.data_version {
            return Ok(Vec::new());
        }
        self.data_version = version;

        let mut stmt = self
            .conn
            .prepare("SELECT key, value, revision, writer FROM kv_slots")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let own = self.context.to_string();
        let mut present = HashSet::with_capacity(rows.len());
        let mut changes = Vec::new();
        for (key, value, revision, writer) in rows {
            present.insert(key.clone());
            if self.seen.insert(key.clone(), revision) == Some(revision) {
                continue;
            }
            if writer == own {
                tracing::trace!(%key, revision, "ignoring own slot write");
                continue;
            }
            changes.push(SlotChange { key, value });
        }

        let removed = self
            .seen
            .keys()
            .filter(|key| !present.contains(*key))
            .cloned()
            .collect::<Vec<_>>();
        for key in removed {
            self.seen.remove(&key);
            changes.push(SlotChange { key, value: None });
        }
        Ok(changes)
    }

    fn current_data_version(&self) -> Result<i64, SlotError> {
        Ok(self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn revisions(&self) -> Result<Vec<(String, i64)>, SlotError> {
        let mut stmt = self.conn.prepare("SELECT key, revision FROM kv_slots")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy_timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
