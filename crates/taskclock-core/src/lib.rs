//! # taskclock Core Library
//!
//! A multi-task time-tracking engine. A user runs several independent work
//! timers at once (one per task), pauses and resumes them without losing
//! accuracy, gets a live-updating view, and has in-memory timers reconciled
//! with a durable log of time entries across process restarts.
//!
//! ## Architecture
//!
//! - **Timer Registry**: wall-clock anchored state machines, one per task.
//!   Elapsed time is always recomputed from anchors, never summed from ticks
//! - **Tick Scheduler**: one shared periodic driver that runs only while at
//!   least one timer is running
//! - **Persistence Gateway**: async trait over the time-entry store, with
//!   SQLite and in-memory implementations
//! - **Reconciler**: rebuilds running timers from open entries at sign-in
//!
//! ## Key Components
//!
//! - [`TimeTracker`]: the service tying the pieces together
//! - [`TimerRegistry`]: pure, synchronous timer bookkeeping
//! - [`PersistenceGateway`]: storage seam; [`SqliteGateway`], [`MemoryGateway`]
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod gateway;
pub mod reconcile;
pub mod scheduler;
pub mod storage;
pub mod timer;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, PersistenceError, ValidationError};
pub use events::Event;
pub use gateway::{
    EntryId, GatewayCall, GatewayOp, MemoryGateway, NewTimeEntry, OpenTimeEntry,
    PersistenceGateway, SqliteGateway, TaskStatus, TimeEntry, UserId,
};
pub use reconcile::{ReconciliationSummary, Reconciler, RestoredTimer, SkippedEntry};
pub use scheduler::TickScheduler;
pub use storage::Config;
pub use timer::{TaskId, TimerPhase, TimerRegistry, TimerSnapshot, TimerState};
pub use tracker::TimeTracker;
