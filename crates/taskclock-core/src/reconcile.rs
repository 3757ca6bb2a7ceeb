//! Sign-in reconciliation of open time entries.
//!
//! When a user signs in, any time entry of theirs with no close time is work
//! that was still being timed when an earlier process went away. Each such
//! entry becomes a running timer measured from the entry's original start,
//! so the elapsed time survives the restart.
//!
//! Pause history from before the restart is not stored anywhere, so a
//! restored timer counts every second since `started_at` as work.
//!
//! ## Usage
//! ```rust,ignore
//! let entries = gateway.list_open_time_entries(&user).await?;
//! let (events, summary) = Reconciler::reconcile(&mut registry, &user, entries, clock.now());
//! println!("{}", summary.message());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::gateway::{EntryId, OpenTimeEntry, UserId};
use crate::timer::{whole_secs, TaskId, TimerRegistry, TimerState};

/// A timer rebuilt from an open entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredTimer {
    pub task_id: TaskId,
    pub entry_id: EntryId,
    pub started_at: DateTime<Utc>,
    /// Elapsed at the moment of reconciliation.
    pub elapsed_secs: u64,
}

/// An open entry that was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub task_id: TaskId,
    pub entry_id: EntryId,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub user_id: UserId,
    /// Open entries the store returned.
    pub total_open: usize,
    pub restored: Vec<RestoredTimer>,
    /// Entries whose task was already tracked, in flight, or listed twice.
    pub skipped: Vec<SkippedEntry>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationSummary {
    pub fn has_restored(&self) -> bool {
        !self.restored.is_empty()
    }

    /// Human-readable summary.
    pub fn message(&self) -> String {
        match (self.total_open, self.restored.len()) {
            (0, _) => "No open time entries.".to_string(),
            (_, 0) => format!(
                "Found {} open time entry(ies), all already tracked.",
                self.total_open
            ),
            (_, n) => format!("Restored {n} running timer(s) from open time entries."),
        }
    }
}

/// Rebuilds running timers from open time entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Restore every entry whose task is not already present or pending.
    ///
    /// Pure with respect to storage: the caller fetched `entries` and owns the
    /// registry lock. Returns one [`Event::TimerRestored`] per restored timer.
    pub fn reconcile(
        registry: &mut TimerRegistry,
        user_id: &UserId,
        entries: Vec<OpenTimeEntry>,
        now: DateTime<Utc>,
    ) -> (Vec<Event>, ReconciliationSummary) {
        let total_open = entries.len();
        let mut events = Vec::new();
        let mut restored = Vec::new();
        let mut skipped = Vec::new();

        for entry in entries {
            let state = TimerState::restored(
                entry.task_id.clone(),
                entry.entry_id,
                entry.started_at,
                now,
                entry.estimated_target,
            );
            let elapsed_secs = whole_secs(state.elapsed_at(now));

            match registry.restore(state, now) {
                Some(event) => {
                    restored.push(RestoredTimer {
                        task_id: entry.task_id,
                        entry_id: entry.entry_id,
                        started_at: entry.started_at,
                        elapsed_secs,
                    });
                    events.push(event);
                }
                None => skipped.push(SkippedEntry {
                    task_id: entry.task_id,
                    entry_id: entry.entry_id,
                }),
            }
        }

        let summary = ReconciliationSummary {
            user_id: user_id.clone(),
            total_open,
            restored,
            skipped,
            reconciled_at: now,
        };
        (events, summary)
    }
}
