//! Durable store for time entries and task status.
//!
//! The engine only talks to storage through [`PersistenceGateway`]. Two
//! implementations ship with the crate: [`SqliteGateway`] for real use and
//! [`MemoryGateway`] for tests and embedders that bring their own store.

mod memory;
mod sqlite;

pub use memory::{GatewayCall, GatewayOp, MemoryGateway};
pub use sqlite::SqliteGateway;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ValidationError};
use crate::timer::{whole_secs, TaskId};

/// Identifier of a durable time-entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identifier supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status written to the external task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                message: format!("unknown task status '{other}'"),
            }),
        }
    }
}

/// Arguments for opening a time entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimeEntry {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub estimated_target: Option<Duration>,
}

/// A time entry with no close time, as returned for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTimeEntry {
    pub entry_id: EntryId,
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub estimated_target: Option<Duration>,
}

/// A stored time entry, open or closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntryId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub estimated_secs: Option<u64>,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Wall-clock span of a closed entry.
    pub fn duration_secs(&self) -> Option<u64> {
        self.ended_at
            .map(|end| whole_secs(end.signed_duration_since(self.started_at)))
    }

    pub fn to_open(&self) -> OpenTimeEntry {
        OpenTimeEntry {
            entry_id: self.id,
            task_id: self.task_id.clone(),
            started_at: self.started_at,
            estimated_target: self.estimated_secs.map(|s| Duration::seconds(s as i64)),
        }
    }
}

/// Abstract store backing the timers.
///
/// Implementations report store failures as `CoreError::Persistence` and a
/// finalize against a missing or closed entry as `CoreError::NotFound`.
#[allow(async_fn_in_trait)]
pub trait PersistenceGateway {
    /// Open a time entry and return its id.
    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<EntryId>;

    /// Close an open time entry.
    async fn finalize_time_entry(&self, entry_id: EntryId, ended_at: DateTime<Utc>) -> Result<()>;

    /// Entries for `user_id` that have no close time.
    async fn list_open_time_entries(&self, user_id: &UserId) -> Result<Vec<OpenTimeEntry>>;

    /// Side-effect status update on the external task record.
    async fn update_task_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_parses_its_own_output() {
        for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("running".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn closed_entry_reports_duration() {
        let start = Utc::now();
        let entry = TimeEntry {
            id: EntryId(1),
            task_id: TaskId::from("a"),
            user_id: UserId::from("u"),
            started_at: start,
            ended_at: Some(start + Duration::seconds(95)),
            estimated_secs: Some(600),
        };
        assert!(!entry.is_open());
        assert_eq!(entry.duration_secs(), Some(95));
        assert_eq!(entry.to_open().estimated_target, Some(Duration::minutes(10)));
    }
}
