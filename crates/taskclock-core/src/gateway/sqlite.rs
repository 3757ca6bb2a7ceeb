//! SQLite-based time-entry storage.
//!
//! Provides persistent storage for:
//! - Time entries (open and closed)
//! - The status of each task that has been worked on

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{
    EntryId, NewTimeEntry, OpenTimeEntry, PersistenceGateway, TaskStatus, TimeEntry, UserId,
};
use crate::error::{CoreError, DatabaseError, Result};
use crate::storage::{data_dir, migrations};
use crate::timer::{whole_secs, TaskId};

/// SQLite database for time entries.
///
/// The connection sits behind a mutex so the gateway can be shared with the
/// tracker; statements are short and never held across an await.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open the database at `<data_dir>/taskclock.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("taskclock.db");
        Self::open_at(&path)
    }

    /// Open (creating if needed) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All entries for a task, newest first.
    pub fn entries_for_task(&self, task_id: &TaskId) -> Result<Vec<TimeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, user_id, started_at, ended_at, estimated_secs
             FROM time_entries
             WHERE task_id = ?1
             ORDER BY started_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![task_id.as_str()], row_to_entry)?;
        let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Single entry by id.
    pub fn entry(&self, id: EntryId) -> Result<Option<TimeEntry>> {
        let conn = self.conn();
        let entry = conn
            .query_row(
                "SELECT id, task_id, user_id, started_at, ended_at, estimated_secs
                 FROM time_entries WHERE id = ?1",
                params![id.0],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Last status written for a task.
    pub fn task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>> {
        let conn = self.conn();
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM task_status WHERE task_id = ?1",
                params![task_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        status
            .map(|s| s.parse::<TaskStatus>().map_err(CoreError::from))
            .transpose()
    }
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimeEntry> {
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    let estimated_secs: Option<i64> = row.get(5)?;
    Ok(TimeEntry {
        id: EntryId(row.get(0)?),
        task_id: TaskId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        started_at: parse_ts(3, &started_at)?,
        ended_at: ended_at.as_deref().map(|s| parse_ts(4, s)).transpose()?,
        estimated_secs: estimated_secs.map(|s| s.max(0) as u64),
    })
}

/// RFC 3339 with millisecond precision; sorts lexically in UTC.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl PersistenceGateway for SqliteGateway {
    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<EntryId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO time_entries (task_id, user_id, started_at, estimated_secs)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.task_id.as_str(),
                entry.user_id.as_str(),
                ts(entry.started_at),
                entry.estimated_target.map(|d| whole_secs(d) as i64),
            ],
        )?;
        Ok(EntryId(conn.last_insert_rowid()))
    }

    async fn finalize_time_entry(&self, entry_id: EntryId, ended_at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE time_entries SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
            params![ts(ended_at), entry_id.0],
        )?;
        if updated == 0 {
            return Err(CoreError::NotFound { entry_id });
        }
        Ok(())
    }

    async fn list_open_time_entries(&self, user_id: &UserId) -> Result<Vec<OpenTimeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, user_id, started_at, ended_at, estimated_secs
             FROM time_entries
             WHERE user_id = ?1 AND ended_at IS NULL
             ORDER BY started_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.as_str()], row_to_entry)?;
        let mut open = Vec::new();
        for row in rows {
            open.push(row?.to_open());
        }
        Ok(open)
    }

    async fn update_task_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<()> {
        self.conn().execute(
            "INSERT INTO task_status (task_id, status, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(task_id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![task_id.as_str(), status.as_str(), ts(Utc::now())],
        )?;
        Ok(())
    }
}
