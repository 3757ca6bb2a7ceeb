//! Shared periodic driver for running timers.
//!
//! One tokio task serves every timer. On each fire it recomputes the session
//! length of each running timer from its anchor and broadcasts an
//! [`Event::Tick`]. When a pass finds nothing running it marks itself
//! inactive and exits; the next start or resume wakes it again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::events::Event;
use crate::timer::{self, SharedRegistry};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct TickScheduler {
    period: Duration,
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    active: Arc<AtomicBool>,
    refreshes: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    pub fn new(
        period: Duration,
        registry: SharedRegistry,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            period,
            registry,
            clock,
            events,
            active: Arc::new(AtomicBool::new(false)),
            refreshes: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Per-timer recomputations performed by the driver since creation.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Ensure the driver is running. Does nothing if it already is.
    ///
    /// Returns false when there is no tokio runtime to run it on.
    pub fn start(&self) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                tracing::warn!("tick scheduler not started: {e}");
                return false;
            }
        };

        let driver = Driver {
            period: self.period,
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            active: Arc::clone(&self.active),
            refreshes: Arc::clone(&self.refreshes),
        };

        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        // A previous driver may still be unwinding after going idle.
        if let Some(old) = handle.take() {
            old.abort();
        }
        *handle = Some(runtime.spawn(driver.run()));
        tracing::debug!(period_ms = self.period.as_millis() as u64, "tick scheduler started");
        true
    }

    /// Stop the driver immediately.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("tick scheduler stopped");
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Driver {
    period: Duration,
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    active: Arc<AtomicBool>,
    refreshes: Arc<AtomicU64>,
}

impl Driver {
    async fn run(self) {
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if !self.active.load(Ordering::SeqCst) {
                break;
            }

            let now = self.clock.now();
            let (event, idle) = {
                let mut registry = timer::lock(&self.registry);
                let refreshed = registry.tick(now);
                self.refreshes.fetch_add(refreshed as u64, Ordering::SeqCst);
                // Flipped under the lock so a concurrent start either sees
                // the driver still active or finds it gone and spawns anew.
                let idle = registry.running_count() == 0;
                if idle {
                    self.active.store(false, Ordering::SeqCst);
                }
                let event = Event::Tick {
                    timers: registry.snapshots(now),
                    at: now,
                };
                (event, idle)
            };

            // No subscribers is fine.
            let _ = self.events.send(event);

            if idle {
                tracing::debug!("no running timers, tick scheduler going idle");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::EntryId;
    use crate::timer::{TaskId, TimerRegistry, TimerState};
    use chrono::Utc;

    fn scheduler() -> (TickScheduler, SharedRegistry, Arc<ManualClock>) {
        let registry: SharedRegistry = Arc::new(Mutex::new(TimerRegistry::new()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (tx, _) = broadcast::channel(16);
        let scheduler = TickScheduler::new(
            DEFAULT_TICK_INTERVAL,
            Arc::clone(&registry),
            clock.clone(),
            tx,
        );
        (scheduler, registry, clock)
    }

    #[test]
    fn start_without_runtime_stays_inactive() {
        let (scheduler, _, _) = scheduler();
        assert!(!scheduler.start());
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn goes_idle_when_nothing_runs() {
        let (scheduler, _, _) = scheduler();
        assert!(scheduler.start());
        assert!(scheduler.is_active());

        time::sleep(Duration::from_millis(1500)).await;
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_each_running_timer_once_per_period() {
        let (scheduler, registry, clock) = scheduler();
        let now = clock.now();
        {
            let mut reg = timer::lock(&registry);
            reg.insert(TimerState::running(TaskId::from("a"), EntryId(1), now, None), now);
            reg.insert(TimerState::running(TaskId::from("b"), EntryId(2), now, None), now);
        }
        scheduler.start();

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(scheduler.refresh_count(), 6);
        assert!(scheduler.is_active());

        scheduler.stop();
        assert!(!scheduler.is_active());
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(scheduler.refresh_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_does_not_double_the_rate() {
        let (scheduler, registry, clock) = scheduler();
        let now = clock.now();
        timer::lock(&registry)
            .insert(TimerState::running(TaskId::from("a"), EntryId(1), now, None), now);

        scheduler.start();
        scheduler.start();
        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(scheduler.refresh_count(), 2);
        scheduler.stop();
    }
}
