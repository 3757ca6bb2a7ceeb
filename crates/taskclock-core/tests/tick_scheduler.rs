//! Integration tests for the shared tick driver.
//!
//! Runs on tokio's paused clock so the periodic driver fires deterministically,
//! while the engine's wall clock is a `ManualClock` moved by hand.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use taskclock_core::{
    Event, ManualClock, MemoryGateway, NewTimeEntry, TaskId, TimeTracker, UserId,
};
use tokio::time::sleep;

async fn signed_in() -> (TimeTracker<MemoryGateway>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tracker = TimeTracker::new(MemoryGateway::new(), clock.clone(), StdDuration::from_secs(1));
    tracker.sign_in(UserId::from("alice")).await.unwrap();
    (tracker, clock)
}

#[tokio::test(start_paused = true)]
async fn test_dormant_until_first_start() {
    let (tracker, _) = signed_in().await;
    assert!(!tracker.scheduler().is_active());

    sleep(StdDuration::from_secs(5)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 0);

    tracker.start(&TaskId::from("a"), None).await.unwrap();
    assert!(tracker.scheduler().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_one_driver_serves_every_timer() {
    let (tracker, _) = signed_in().await;
    tracker.start(&TaskId::from("a"), None).await.unwrap();
    tracker.start(&TaskId::from("b"), None).await.unwrap();
    tracker.start(&TaskId::from("c"), None).await.unwrap();

    sleep(StdDuration::from_millis(2500)).await;
    // Two fires, three timers each
    assert_eq!(tracker.scheduler().refresh_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_goes_idle_after_last_pause_and_wakes_on_resume() {
    let (tracker, _) = signed_in().await;
    let a = TaskId::from("a");
    tracker.start(&a, None).await.unwrap();

    sleep(StdDuration::from_millis(3500)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 3);

    tracker.pause(&a);
    sleep(StdDuration::from_millis(1000)).await;
    assert!(!tracker.scheduler().is_active());

    sleep(StdDuration::from_secs(10)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 3);

    tracker.resume(&a);
    assert!(tracker.scheduler().is_active());
    sleep(StdDuration::from_millis(1500)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_goes_idle_after_last_stop() {
    let (tracker, _) = signed_in().await;
    let a = TaskId::from("a");
    tracker.start(&a, None).await.unwrap();
    sleep(StdDuration::from_millis(1500)).await;

    tracker.stop(&a).await.unwrap();
    sleep(StdDuration::from_millis(1000)).await;
    assert!(!tracker.scheduler().is_active());

    let before = tracker.scheduler().refresh_count();
    sleep(StdDuration::from_secs(10)).await;
    assert_eq!(tracker.scheduler().refresh_count(), before);

    tracker.start(&TaskId::from("b"), None).await.unwrap();
    assert!(tracker.scheduler().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_paused_timer_keeps_driver_alive_only_with_a_running_one() {
    let (tracker, _) = signed_in().await;
    tracker.start(&TaskId::from("a"), None).await.unwrap();
    tracker.start(&TaskId::from("b"), None).await.unwrap();
    tracker.pause(&TaskId::from("b"));

    sleep(StdDuration::from_millis(2500)).await;
    assert!(tracker.scheduler().is_active());
    // Only the running timer is recomputed
    assert_eq!(tracker.scheduler().refresh_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tick_events_carry_anchor_based_snapshots() {
    let (tracker, clock) = signed_in().await;
    let mut rx = tracker.subscribe();
    let a = TaskId::from("a");
    tracker.start(&a, Some(Duration::minutes(5))).await.unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Event::TimerStarted { .. }));

    clock.advance_secs(61);
    sleep(StdDuration::from_millis(1100)).await;

    match rx.recv().await.unwrap() {
        Event::Tick { timers, .. } => {
            assert_eq!(timers.len(), 1);
            assert_eq!(timers[0].elapsed, "00:01:01");
            assert_eq!(timers[0].remaining_secs, Some(239));
        }
        other => panic!("Expected Tick, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconciliation_wakes_driver() {
    let gateway = MemoryGateway::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    gateway.seed_open_entry(NewTimeEntry {
        task_id: TaskId::from("a"),
        user_id: UserId::from("alice"),
        started_at: Utc::now() - Duration::seconds(30),
        estimated_target: None,
    });
    let tracker = TimeTracker::new(gateway, clock, StdDuration::from_secs(1));

    tracker.sign_in(UserId::from("alice")).await.unwrap();
    assert!(tracker.scheduler().is_active());
    sleep(StdDuration::from_millis(1500)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_stops_driver() {
    let (tracker, _) = signed_in().await;
    tracker.start(&TaskId::from("a"), None).await.unwrap();
    assert_eq!(tracker.sign_out(), 1);
    assert!(!tracker.scheduler().is_active());

    sleep(StdDuration::from_secs(3)).await;
    assert_eq!(tracker.scheduler().refresh_count(), 0);
}
