//! Per-task timer state and the anchor arithmetic behind it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::display;
use crate::gateway::EntryId;

/// Opaque identifier of the task being timed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Phase of a timer that is present in the registry.
///
/// Idle and stopped timers are not represented: an idle task has no entry,
/// and a stopped timer is removed once its time entry is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Running,
    Paused,
}

/// A persistence call that is in flight for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOp {
    Starting,
    Stopping,
}

impl fmt::Display for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOp::Starting => f.write_str("start"),
            PendingOp::Stopping => f.write_str("stop"),
        }
    }
}

/// In-memory record tracking one task's active or paused work.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerState {
    pub(crate) task_id: TaskId,
    pub(crate) phase: TimerPhase,
    /// Instant the current running segment is measured from.
    pub(crate) start_anchor: DateTime<Utc>,
    /// Set only while paused.
    pub(crate) pause_anchor: Option<DateTime<Utc>>,
    pub(crate) accumulated_paused: Duration,
    /// Cached length of the current running segment.
    pub(crate) current_session: Duration,
    /// Sum of closed running segments.
    pub(crate) total: Duration,
    pub(crate) estimated_target: Option<Duration>,
    pub(crate) entry_ref: EntryId,
}

impl TimerState {
    /// A fresh timer anchored at `now`.
    pub fn running(
        task_id: TaskId,
        entry_ref: EntryId,
        now: DateTime<Utc>,
        estimated_target: Option<Duration>,
    ) -> Self {
        Self {
            task_id,
            phase: TimerPhase::Running,
            start_anchor: now,
            pause_anchor: None,
            accumulated_paused: Duration::zero(),
            current_session: Duration::zero(),
            total: Duration::zero(),
            estimated_target,
            entry_ref,
        }
    }

    /// A timer rebuilt from an open time entry left by an earlier process.
    /// Pause history from before the restart is unknown and treated as zero.
    pub fn restored(
        task_id: TaskId,
        entry_ref: EntryId,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
        estimated_target: Option<Duration>,
    ) -> Self {
        let mut state = Self::running(task_id, entry_ref, started_at, estimated_target);
        state.refresh(now);
        state
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn is_paused(&self) -> bool {
        self.phase == TimerPhase::Paused
    }

    pub fn start_anchor(&self) -> DateTime<Utc> {
        self.start_anchor
    }

    pub fn pause_anchor(&self) -> Option<DateTime<Utc>> {
        self.pause_anchor
    }

    pub fn accumulated_paused(&self) -> Duration {
        self.accumulated_paused
    }

    pub fn current_session(&self) -> Duration {
        self.current_session
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn estimated_target(&self) -> Option<Duration> {
        self.estimated_target
    }

    pub fn entry_ref(&self) -> EntryId {
        self.entry_ref
    }

    /// Length of the current running segment as of `now`.
    ///
    /// Paused timers report the frozen cache instead of reading the clock.
    pub fn session_at(&self, now: DateTime<Utc>) -> Duration {
        match self.phase {
            TimerPhase::Running => since(self.start_anchor, now),
            TimerPhase::Paused => self.current_session,
        }
    }

    /// Total counted work time as of `now`.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        self.total + self.session_at(now)
    }

    /// Pause time including the still-open pause interval, if any.
    pub fn paused_at(&self, now: DateTime<Utc>) -> Duration {
        match self.pause_anchor {
            Some(anchor) => self.accumulated_paused + since(anchor, now),
            None => self.accumulated_paused,
        }
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        display::remaining(self.estimated_target, self.elapsed_at(now))
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Recompute the cached session length from the anchor.
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) {
        if self.phase == TimerPhase::Running {
            self.current_session = since(self.start_anchor, now);
        }
    }

    /// Close the running segment. Returns false when not running.
    pub(crate) fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase != TimerPhase::Running {
            return false;
        }
        self.refresh(now);
        self.total += self.current_session;
        self.current_session = Duration::zero();
        self.phase = TimerPhase::Paused;
        self.pause_anchor = Some(now);
        true
    }

    /// Open a new running segment. Returns the length of the pause that
    /// just ended, or `None` when not paused.
    pub(crate) fn resume(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if self.phase != TimerPhase::Paused {
            return None;
        }
        let pause_len = self
            .pause_anchor
            .take()
            .map(|anchor| since(anchor, now))
            .unwrap_or_else(Duration::zero);
        self.accumulated_paused += pause_len;
        self.start_anchor = now;
        self.current_session = Duration::zero();
        self.phase = TimerPhase::Running;
        Some(pause_len)
    }

    /// Serializable view for displays.
    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let elapsed = self.elapsed_at(now);
        TimerSnapshot {
            task_id: self.task_id.clone(),
            entry_id: self.entry_ref,
            phase: self.phase,
            elapsed: display::format_hms(elapsed),
            elapsed_secs: display::whole_secs(elapsed),
            paused_secs: display::whole_secs(self.paused_at(now)),
            estimated_secs: self.estimated_target.map(display::whole_secs),
            remaining_secs: self.remaining_at(now).map(display::whole_secs),
        }
    }
}

/// Point-in-time view of a timer, safe to hand to a UI or print as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub task_id: TaskId,
    pub entry_id: EntryId,
    pub phase: TimerPhase,
    /// `HH:MM:SS`
    pub elapsed: String,
    pub elapsed_secs: u64,
    pub paused_secs: u64,
    pub estimated_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
}

/// `now - anchor`, clamped at zero if the wall clock stepped backwards.
fn since(anchor: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let delta = now.signed_duration_since(anchor);
    if delta < Duration::zero() {
        Duration::zero()
    } else {
        delta
    }
}
