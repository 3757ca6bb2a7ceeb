use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::EntryId;
use crate::timer::{TaskId, TimerSnapshot};

/// Every timer transition produces an Event.
/// Callers get it back from the operation; live displays subscribe to the
/// tracker's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        task_id: TaskId,
        entry_id: EntryId,
        estimated_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        task_id: TaskId,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        task_id: TaskId,
        /// Length of the pause that just ended.
        paused_secs: u64,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        task_id: TaskId,
        entry_id: EntryId,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Rebuilt from an open time entry at sign-in.
    TimerRestored {
        task_id: TaskId,
        entry_id: EntryId,
        started_at: DateTime<Utc>,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Dropped from memory without finalizing its time entry.
    TimerDiscarded {
        task_id: TaskId,
        entry_id: EntryId,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Periodic refresh of every timer while at least one is running.
    Tick {
        timers: Vec<TimerSnapshot>,
        at: DateTime<Utc>,
    },
}
