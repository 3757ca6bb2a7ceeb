//! Core error types for taskclock-core.
//!
//! The engine distinguishes caller mistakes (validation), store failures
//! (persistence), vanished time entries (not found), operations rejected
//! because another start/stop for the same task is still in flight, and
//! results that arrived after the signed-in user changed.

use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::EntryId;
use crate::timer::{PendingOp, TaskId};

/// Core error type for taskclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller supplied something the engine cannot act on
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The durable store failed or rejected the write
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Finalize was called against a time entry that no longer exists
    #[error("Time entry {entry_id} not found or already closed")]
    NotFound { entry_id: EntryId },

    /// A start or stop for the same task has not resolved yet
    #[error("Task '{task_id}' is busy: {op} still in flight")]
    Pending { task_id: TaskId, op: PendingOp },

    /// A different user signed in while a store call was in flight; its
    /// result was not applied to the new session
    #[error("Signed-in user changed before the store call resolved")]
    SessionChanged,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `start` was invoked with nobody signed in
    #[error("No current user; sign in before starting a timer")]
    NoCurrentUser,

    /// Task reference is blank or otherwise unusable
    #[error("Invalid task reference: {0:?}")]
    InvalidTask(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Store-level failures surfaced by a [`crate::gateway::PersistenceGateway`].
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// SQLite-backed store failure
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown key or value that does not fit the key's type
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(PersistenceError::Database(err.into()))
    }
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        CoreError::Persistence(PersistenceError::Database(err))
    }
}

impl CoreError {
    /// True for failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Pending { .. }
                | CoreError::Persistence(PersistenceError::Unavailable(_))
                | CoreError::Persistence(PersistenceError::Database(DatabaseError::Locked))
        )
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }

    #[test]
    fn retryable_classification() {
        let pending = CoreError::Pending {
            task_id: TaskId::from("t-1"),
            op: PendingOp::Starting,
        };
        assert!(pending.is_retryable());

        let not_found = CoreError::NotFound {
            entry_id: EntryId(7),
        };
        assert!(!not_found.is_retryable());

        let validation = CoreError::from(ValidationError::NoCurrentUser);
        assert!(!validation.is_retryable());
    }

    #[test]
    fn messages_name_the_task() {
        let err = CoreError::Pending {
            task_id: TaskId::from("deploy"),
            op: PendingOp::Stopping,
        };
        assert_eq!(err.to_string(), "Task 'deploy' is busy: stop still in flight");
    }
}
