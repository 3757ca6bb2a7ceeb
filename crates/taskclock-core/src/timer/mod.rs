pub mod display;
mod registry;
mod state;

pub use display::{format_hms, remaining, whole_secs};
pub use registry::TimerRegistry;
pub use state::{PendingOp, TaskId, TimerPhase, TimerSnapshot, TimerState};

use std::sync::{Arc, Mutex, MutexGuard};

/// Registry shared between the tracker and the tick driver.
pub type SharedRegistry = Arc<Mutex<TimerRegistry>>;

/// Lock the registry. A poisoned lock still holds consistent state because
/// every registry command completes before returning.
pub(crate) fn lock(registry: &Mutex<TimerRegistry>) -> MutexGuard<'_, TimerRegistry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}
