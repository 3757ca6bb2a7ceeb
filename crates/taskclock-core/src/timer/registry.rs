//! Timer registry implementation.
//!
//! The registry is a purely in-memory, wall-clock-based collection of
//! per-task state machines. It never reads a clock or touches storage on its
//! own: every command takes `now`, and persistence is the caller's job.
//!
//! ## State Transitions
//!
//! ```text
//! Absent -> Running -> (Paused <-> Running) -> Absent
//! ```
//!
//! Commands return `Some(Event)` when a transition happened and `None` for a
//! no-op, so repeating a command is always harmless.

use chrono::{DateTime, Duration, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use super::display::whole_secs;
use super::state::{PendingOp, TaskId, TimerSnapshot, TimerState};
use crate::events::Event;
use crate::gateway::EntryId;

#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: BTreeMap<TaskId, TimerState>,
    /// Tasks with a start or stop awaiting the store.
    pending: BTreeMap<TaskId, PendingOp>,
    /// Bumped by [`TimerRegistry::clear`]; in-flight work from an older
    /// session must not touch this one.
    session: u64,
    /// Reconciliations currently waiting on the store.
    reconciling: usize,
    /// Entries finalized while a reconciliation was waiting. Its list of open
    /// entries may predate the finalize, so they must not be restored.
    finalized: BTreeSet<EntryId>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, task_id: &TaskId) -> Option<&TimerState> {
        self.timers.get(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.timers.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.timers.values().filter(|t| t.is_running()).count()
    }

    pub fn pending(&self, task_id: &TaskId) -> Option<PendingOp> {
        self.pending.get(task_id).copied()
    }

    /// Snapshots of every timer, ordered by task id.
    pub fn snapshots(&self, now: DateTime<Utc>) -> Vec<TimerSnapshot> {
        self.timers.values().map(|t| t.snapshot(now)).collect()
    }

    // ── In-flight bookkeeping ────────────────────────────────────────

    /// Mark `op` as in flight for `task_id`.
    ///
    /// Fails with the operation already in flight, if any.
    pub fn begin(&mut self, task_id: &TaskId, op: PendingOp) -> Result<(), PendingOp> {
        match self.pending.entry(task_id.clone()) {
            Entry::Occupied(existing) => Err(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(op);
                Ok(())
            }
        }
    }

    pub fn finish(&mut self, task_id: &TaskId) {
        self.pending.remove(task_id);
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Note that a reconciliation is about to read the open entries.
    pub fn begin_reconcile(&mut self) {
        self.reconciling += 1;
    }

    pub fn finish_reconcile(&mut self) {
        self.reconciling = self.reconciling.saturating_sub(1);
        if self.reconciling == 0 {
            self.finalized.clear();
        }
    }

    /// Drop every timer and in-flight marker and start a new session.
    ///
    /// Returns how many timers were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.timers.len();
        self.timers.clear();
        self.pending.clear();
        self.finalized.clear();
        self.reconciling = 0;
        self.session += 1;
        dropped
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Insert a freshly started timer. Returns `None` if one already exists.
    pub fn insert(&mut self, state: TimerState, at: DateTime<Utc>) -> Option<Event> {
        match self.timers.entry(state.task_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let event = Event::TimerStarted {
                    task_id: state.task_id.clone(),
                    entry_id: state.entry_ref,
                    estimated_secs: state.estimated_target.map(whole_secs),
                    at,
                };
                slot.insert(state);
                Some(event)
            }
        }
    }

    /// Insert a timer rebuilt from the store. Returns `None` if the task is
    /// already tracked, has an operation in flight, or its entry was
    /// finalized after the store was read.
    pub fn restore(&mut self, state: TimerState, now: DateTime<Utc>) -> Option<Event> {
        if self.pending.contains_key(&state.task_id) || self.finalized.contains(&state.entry_ref) {
            return None;
        }
        match self.timers.entry(state.task_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let event = Event::TimerRestored {
                    task_id: state.task_id.clone(),
                    entry_id: state.entry_ref,
                    started_at: state.start_anchor,
                    elapsed_secs: whole_secs(state.elapsed_at(now)),
                    at: now,
                };
                slot.insert(state);
                Some(event)
            }
        }
    }

    pub fn pause(&mut self, task_id: &TaskId, now: DateTime<Utc>) -> Option<Event> {
        let timer = self.timers.get_mut(task_id)?;
        if !timer.pause(now) {
            return None;
        }
        Some(Event::TimerPaused {
            task_id: task_id.clone(),
            elapsed_secs: whole_secs(timer.elapsed_at(now)),
            at: now,
        })
    }

    pub fn resume(&mut self, task_id: &TaskId, now: DateTime<Utc>) -> Option<Event> {
        let timer = self.timers.get_mut(task_id)?;
        let paused = timer.resume(now)?;
        Some(Event::TimerResumed {
            task_id: task_id.clone(),
            paused_secs: whole_secs(paused),
            elapsed_secs: whole_secs(timer.elapsed_at(now)),
            at: now,
        })
    }

    /// Remove a timer after its entry has been finalized at `ended_at`.
    pub fn remove_stopped(&mut self, task_id: &TaskId, ended_at: DateTime<Utc>) -> Option<Event> {
        let timer = self.timers.remove(task_id)?;
        if self.reconciling > 0 {
            self.finalized.insert(timer.entry_ref);
        }
        Some(Event::TimerStopped {
            task_id: task_id.clone(),
            entry_id: timer.entry_ref,
            elapsed_secs: whole_secs(timer.elapsed_at(ended_at)),
            at: ended_at,
        })
    }

    /// Forget an entry finalized without going through `remove_stopped`, so
    /// neither a restored timer nor a pending reconciliation keeps it alive.
    pub fn forget_finalized(&mut self, entry_id: EntryId) {
        self.timers.retain(|_, t| t.entry_ref != entry_id);
        if self.reconciling > 0 {
            self.finalized.insert(entry_id);
        }
    }

    /// Remove a timer without any store involvement.
    pub fn discard(&mut self, task_id: &TaskId, now: DateTime<Utc>) -> Option<Event> {
        let timer = self.timers.remove(task_id)?;
        Some(Event::TimerDiscarded {
            task_id: task_id.clone(),
            entry_id: timer.entry_ref,
            elapsed_secs: whole_secs(timer.elapsed_at(now)),
            at: now,
        })
    }

    /// Recompute the session length of every running timer from its anchor.
    ///
    /// Returns how many timers were refreshed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let mut refreshed = 0;
        for timer in self.timers.values_mut().filter(|t| t.is_running()) {
            timer.refresh(now);
            refreshed += 1;
        }
        refreshed
    }

    /// Total elapsed for a task as of `now`, if tracked.
    pub fn elapsed(&self, task_id: &TaskId, now: DateTime<Utc>) -> Option<Duration> {
        self.timers.get(task_id).map(|t| t.elapsed_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(registry: &mut TimerRegistry, task: &str, entry: i64, t0: DateTime<Utc>) {
        let state = TimerState::running(TaskId::from(task), EntryId(entry), t0, None);
        assert!(registry.insert(state, t0).is_some());
    }

    #[test]
    fn insert_is_idempotent_per_task() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        started(&mut registry, "a", 1, t0);

        let again = TimerState::running(TaskId::from("a"), EntryId(2), t0, None);
        assert!(registry.insert(again, t0).is_none());
        assert_eq!(registry.get(&TaskId::from("a")).unwrap().entry_ref(), EntryId(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pause_and_resume_are_noops_in_wrong_phase() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        let a = TaskId::from("a");
        started(&mut registry, "a", 1, t0);

        assert!(registry.resume(&a, t0).is_none());
        assert!(registry.pause(&a, t0 + Duration::seconds(5)).is_some());
        assert!(registry.pause(&a, t0 + Duration::seconds(9)).is_none());
        assert!(registry.resume(&a, t0 + Duration::seconds(10)).is_some());
        assert!(registry.resume(&a, t0 + Duration::seconds(11)).is_none());

        // Absent task
        assert!(registry.pause(&TaskId::from("zz"), t0).is_none());
    }

    #[test]
    fn tick_only_touches_running_timers() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        started(&mut registry, "a", 1, t0);
        started(&mut registry, "b", 2, t0);
        registry.pause(&TaskId::from("b"), t0 + Duration::seconds(3));

        assert_eq!(registry.tick(t0 + Duration::seconds(7)), 1);
        let a = registry.get(&TaskId::from("a")).unwrap();
        assert_eq!(a.current_session(), Duration::seconds(7));
        let b = registry.get(&TaskId::from("b")).unwrap();
        assert_eq!(b.current_session(), Duration::zero());
        assert_eq!(registry.running_count(), 1);
    }

    #[test]
    fn begin_rejects_second_operation() {
        let mut registry = TimerRegistry::new();
        let a = TaskId::from("a");
        assert!(registry.begin(&a, PendingOp::Starting).is_ok());
        assert_eq!(registry.begin(&a, PendingOp::Stopping), Err(PendingOp::Starting));
        registry.finish(&a);
        assert!(registry.pending(&a).is_none());
        assert!(registry.begin(&a, PendingOp::Stopping).is_ok());
    }

    #[test]
    fn restore_skips_tracked_and_pending() {
        let now = Utc::now();
        let mut registry = TimerRegistry::new();
        started(&mut registry, "a", 1, now);

        let dup = TimerState::restored(TaskId::from("a"), EntryId(9), now, now, None);
        assert!(registry.restore(dup, now).is_none());

        let b = TaskId::from("b");
        registry.begin(&b, PendingOp::Starting).unwrap();
        let pending = TimerState::restored(b.clone(), EntryId(10), now, now, None);
        assert!(registry.restore(pending, now).is_none());
        assert!(!registry.contains(&b));
    }

    #[test]
    fn remove_stopped_reports_final_elapsed() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        let a = TaskId::from("a");
        started(&mut registry, "a", 5, t0);
        registry.pause(&a, t0 + Duration::seconds(10));

        match registry.remove_stopped(&a, t0 + Duration::seconds(100)) {
            Some(Event::TimerStopped {
                entry_id,
                elapsed_secs,
                ..
            }) => {
                assert_eq!(entry_id, EntryId(5));
                assert_eq!(elapsed_secs, 10);
            }
            other => panic!("Expected TimerStopped, got {other:?}"),
        }
        assert!(registry.is_empty());
        assert!(registry.remove_stopped(&a, t0).is_none());
    }

    #[test]
    fn restore_skips_entries_finalized_during_reconcile() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        let a = TaskId::from("a");
        started(&mut registry, "a", 1, t0);

        registry.begin_reconcile();
        // The stop lands after the open entries were read.
        assert!(registry.remove_stopped(&a, t0 + Duration::seconds(5)).is_some());
        let stale = TimerState::restored(a.clone(), EntryId(1), t0, t0, None);
        assert!(registry.restore(stale, t0 + Duration::seconds(6)).is_none());
        registry.finish_reconcile();
        assert!(!registry.contains(&a));

        // Outside a reconciliation nothing is remembered.
        let reopened = TimerState::restored(a.clone(), EntryId(1), t0, t0, None);
        assert!(registry.restore(reopened, t0).is_some());
    }

    #[test]
    fn clear_starts_a_new_session() {
        let t0 = Utc::now();
        let mut registry = TimerRegistry::new();
        started(&mut registry, "a", 1, t0);
        registry.begin(&TaskId::from("b"), PendingOp::Starting).unwrap();
        let before = registry.session();

        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
        assert!(registry.pending(&TaskId::from("b")).is_none());
        assert_ne!(registry.session(), before);
    }
}
