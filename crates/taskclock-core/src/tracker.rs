//! The time-tracking service.
//!
//! [`TimeTracker`] owns the timer registry, the tick driver, the signed-in
//! identity and the persistence gateway. Start and stop await the gateway
//! before touching the registry; pause, resume and every query are purely in
//! memory and never fail.
//!
//! ## Concurrency
//!
//! All methods take `&self`, so a start and a stop for the same task can be
//! in flight together. The registry lock is never held across an `.await`;
//! instead the task carries a pending marker while its gateway call runs, and
//! a conflicting start or stop is rejected with [`CoreError::Pending`].
//!
//! Signing out starts a new registry session. A start, stop or
//! reconciliation that was awaiting the store when the session changed does
//! not apply its result to the new session.

use chrono::Duration;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::gateway::{NewTimeEntry, PersistenceGateway, TaskStatus, UserId};
use crate::reconcile::{ReconciliationSummary, Reconciler};
use crate::scheduler::TickScheduler;
use crate::storage::TrackerConfig;
use crate::timer::{
    self, format_hms, PendingOp, SharedRegistry, TaskId, TimerRegistry, TimerSnapshot,
    TimerState,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct TimeTracker<G: PersistenceGateway> {
    gateway: G,
    clock: Arc<dyn Clock>,
    registry: SharedRegistry,
    scheduler: TickScheduler,
    events: broadcast::Sender<Event>,
    user: Mutex<Option<UserId>>,
}

impl<G: PersistenceGateway> TimeTracker<G> {
    pub fn new(gateway: G, clock: Arc<dyn Clock>, tick_interval: std::time::Duration) -> Self {
        let registry: SharedRegistry = Arc::new(Mutex::new(TimerRegistry::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let scheduler = TickScheduler::new(
            tick_interval,
            Arc::clone(&registry),
            Arc::clone(&clock),
            events.clone(),
        );
        Self {
            gateway,
            clock,
            registry,
            scheduler,
            events,
            user: Mutex::new(None),
        }
    }

    /// Tracker on the system clock with the configured tick period.
    pub fn from_config(gateway: G, config: &TrackerConfig) -> Self {
        Self::new(gateway, Arc::new(SystemClock), config.tick_interval())
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn current_user(&self) -> Option<UserId> {
        self.user.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sign `user` in and restore their open time entries as running timers.
    ///
    /// Signing in as a different user first signs the previous one out. The
    /// user stays signed in even if reconciliation fails, so it can be
    /// retried with [`TimeTracker::reconcile`].
    pub async fn sign_in(&self, user: UserId) -> Result<ReconciliationSummary> {
        if user.as_str().trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "user".to_string(),
                message: "user id is blank".to_string(),
            }
            .into());
        }
        if let Some(previous) = self.current_user() {
            if previous != user {
                self.sign_out();
            }
        }
        *self.user.lock().unwrap_or_else(|e| e.into_inner()) = Some(user.clone());
        tracing::debug!(user = %user, "signed in");
        self.reconcile().await
    }

    /// Forget the current user and drop their in-memory timers.
    ///
    /// Open time entries are left untouched and come back on the next sign-in.
    /// Returns how many timers were dropped.
    pub fn sign_out(&self) -> usize {
        let previous = self.user.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.scheduler.stop();
        let dropped = self.lock().clear();
        if let Some(user) = previous {
            tracing::debug!(user = %user, dropped, "signed out");
        }
        dropped
    }

    /// Restore the current user's open time entries.
    pub async fn reconcile(&self) -> Result<ReconciliationSummary> {
        let (user, session) = {
            let mut registry = self.lock();
            let user = self.require_user()?;
            registry.begin_reconcile();
            (user, registry.session())
        };
        let listed = self.gateway.list_open_time_entries(&user).await;

        let now = self.clock.now();
        let (events, summary) = {
            let mut registry = self.lock();
            if registry.session() != session {
                tracing::warn!(user = %user, "reconciliation dropped, signed-in user changed");
                return Err(CoreError::SessionChanged);
            }
            let entries = match listed {
                Ok(entries) => entries,
                Err(e) => {
                    registry.finish_reconcile();
                    tracing::warn!(user = %user, "reconciliation failed: {e}");
                    return Err(e);
                }
            };
            let outcome = Reconciler::reconcile(&mut registry, &user, entries, now);
            registry.finish_reconcile();
            outcome
        };

        tracing::info!(
            user = %user,
            restored = summary.restored.len(),
            skipped = summary.skipped.len(),
            "{}",
            summary.message()
        );
        for event in events {
            self.publish(&event);
        }
        if summary.has_restored() {
            self.scheduler.start();
        }
        Ok(summary)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start timing `task_id`.
    ///
    /// Returns `Ok(None)` if the task already has a timer. On a store failure
    /// nothing is left behind.
    pub async fn start(&self, task_id: &TaskId, estimate: Option<Duration>) -> Result<Option<Event>> {
        if task_id.as_str().trim().is_empty() {
            return Err(ValidationError::InvalidTask(task_id.to_string()).into());
        }
        if let Some(estimate) = estimate {
            if estimate < Duration::zero() {
                return Err(ValidationError::InvalidValue {
                    field: "estimate".to_string(),
                    message: "estimate cannot be negative".to_string(),
                }
                .into());
            }
        }

        let (user, session) = {
            let mut registry = self.lock();
            if registry.contains(task_id) {
                tracing::debug!(task = %task_id, "start ignored, timer already present");
                return Ok(None);
            }
            let user = self.require_user()?;
            registry
                .begin(task_id, PendingOp::Starting)
                .map_err(|op| self.busy(task_id, op))?;
            (user, registry.session())
        };

        let now = self.clock.now();
        let created = self
            .gateway
            .create_time_entry(NewTimeEntry {
                task_id: task_id.clone(),
                user_id: user,
                started_at: now,
                estimated_target: estimate,
            })
            .await;

        let event = {
            let mut registry = self.lock();
            if registry.session() != session {
                // The entry stays open and comes back when its owner signs in.
                let entry_id = created?;
                tracing::warn!(task = %task_id, entry = %entry_id, "start dropped, signed-in user changed");
                return Err(CoreError::SessionChanged);
            }
            registry.finish(task_id);
            let entry_id = match created {
                Ok(entry_id) => entry_id,
                Err(e) => {
                    tracing::warn!(task = %task_id, "failed to open time entry: {e}");
                    return Err(e);
                }
            };
            tracing::debug!(task = %task_id, entry = %entry_id, "timer started");
            registry.insert(TimerState::running(task_id.clone(), entry_id, now, estimate), now)
        };
        self.scheduler.start();
        if let Some(event) = &event {
            self.publish(event);
        }

        if let Err(e) = self
            .gateway
            .update_task_status(task_id, TaskStatus::InProgress)
            .await
        {
            tracing::warn!(task = %task_id, "failed to mark task in progress: {e}");
        }

        Ok(event)
    }

    /// Stop timing `task_id` and finalize its time entry.
    ///
    /// Returns `Ok(None)` if the task has no timer. On a store failure the
    /// timer is kept as it was so the stop can be retried.
    pub async fn stop(&self, task_id: &TaskId) -> Result<Option<Event>> {
        let (entry_id, session) = {
            let mut registry = self.lock();
            let Some(entry_id) = registry.get(task_id).map(TimerState::entry_ref) else {
                if let Some(op) = registry.pending(task_id) {
                    return Err(self.busy(task_id, op));
                }
                return Ok(None);
            };
            registry
                .begin(task_id, PendingOp::Stopping)
                .map_err(|op| self.busy(task_id, op))?;
            (entry_id, registry.session())
        };

        let ended_at = self.clock.now();
        let finalized = self.gateway.finalize_time_entry(entry_id, ended_at).await;

        let event = {
            let mut registry = self.lock();
            if registry.session() != session {
                finalized?;
                registry.forget_finalized(entry_id);
                tracing::warn!(task = %task_id, entry = %entry_id, "stop dropped, signed-in user changed");
                return Err(CoreError::SessionChanged);
            }
            registry.finish(task_id);
            if let Err(e) = finalized {
                tracing::warn!(task = %task_id, entry = %entry_id, "failed to finalize time entry: {e}");
                return Err(e);
            }
            let event = registry.remove_stopped(task_id, ended_at);
            if event.is_none() {
                // Discarded while the finalize was in flight.
                registry.forget_finalized(entry_id);
            }
            event
        };

        if let Some(event) = &event {
            tracing::debug!(task = %task_id, entry = %entry_id, "timer stopped");
            self.publish(event);
        }
        Ok(event)
    }

    /// Pause a running timer. No-op otherwise.
    pub fn pause(&self, task_id: &TaskId) -> Option<Event> {
        let now = self.clock.now();
        let event = self.lock().pause(task_id, now)?;
        tracing::debug!(task = %task_id, "timer paused");
        self.publish(&event);
        Some(event)
    }

    /// Resume a paused timer. No-op otherwise.
    pub fn resume(&self, task_id: &TaskId) -> Option<Event> {
        let now = self.clock.now();
        let event = self.lock().resume(task_id, now)?;
        tracing::debug!(task = %task_id, "timer resumed");
        self.scheduler.start();
        self.publish(&event);
        Some(event)
    }

    /// Drop a timer without finalizing its time entry.
    ///
    /// For an entry that vanished from the store, where `stop` would keep
    /// failing with `NotFound`.
    pub fn discard(&self, task_id: &TaskId) -> Option<Event> {
        let now = self.clock.now();
        let event = self.lock().discard(task_id, now)?;
        tracing::debug!(task = %task_id, "timer discarded");
        self.publish(&event);
        Some(event)
    }

    /// Recompute every running timer now, outside the periodic driver.
    ///
    /// Returns how many timers were refreshed.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let (refreshed, event) = {
            let mut registry = self.lock();
            let refreshed = registry.tick(now);
            let event = Event::Tick {
                timers: registry.snapshots(now),
                at: now,
            };
            (refreshed, event)
        };
        self.publish(&event);
        refreshed
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Copy of a task's timer with its session refreshed to now.
    pub fn query(&self, task_id: &TaskId) -> Option<TimerState> {
        let now = self.clock.now();
        let mut state = self.lock().get(task_id).cloned()?;
        state.refresh(now);
        Some(state)
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.lock().get(task_id).is_some_and(TimerState::is_running)
    }

    pub fn is_paused(&self, task_id: &TaskId) -> bool {
        self.lock().get(task_id).is_some_and(TimerState::is_paused)
    }

    /// Total counted work time as of now.
    pub fn elapsed(&self, task_id: &TaskId) -> Option<Duration> {
        let now = self.clock.now();
        self.lock().elapsed(task_id, now)
    }

    /// `HH:MM:SS` of the elapsed time, `00:00:00` for an absent task.
    pub fn formatted_elapsed(&self, task_id: &TaskId) -> String {
        format_hms(self.elapsed(task_id).unwrap_or_else(Duration::zero))
    }

    /// Time left against the estimate, floored at zero.
    pub fn remaining(&self, task_id: &TaskId) -> Option<Duration> {
        let now = self.clock.now();
        self.lock().get(task_id)?.remaining_at(now)
    }

    pub fn snapshot(&self, task_id: &TaskId) -> Option<TimerSnapshot> {
        let now = self.clock.now();
        self.lock().get(task_id).map(|t| t.snapshot(now))
    }

    /// Every timer, ordered by task id.
    pub fn snapshots(&self) -> Vec<TimerSnapshot> {
        let now = self.clock.now();
        self.lock().snapshots(now)
    }

    pub fn running_count(&self) -> usize {
        self.lock().running_count()
    }

    pub fn pending(&self, task_id: &TaskId) -> Option<PendingOp> {
        self.lock().pending(task_id)
    }

    /// Receive every transition and tick from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerRegistry> {
        timer::lock(&self.registry)
    }

    fn require_user(&self) -> Result<UserId> {
        self.current_user()
            .ok_or_else(|| ValidationError::NoCurrentUser.into())
    }

    fn busy(&self, task_id: &TaskId, op: PendingOp) -> CoreError {
        tracing::debug!(task = %task_id, %op, "rejected, operation in flight");
        CoreError::Pending {
            task_id: task_id.clone(),
            op,
        }
    }

    fn publish(&self, event: &Event) {
        // Nobody listening is not an error.
        let _ = self.events.send(event.clone());
    }
}
