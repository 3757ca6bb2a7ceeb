//! In-process gateway with call recording and failure injection.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

use super::{
    EntryId, NewTimeEntry, OpenTimeEntry, PersistenceGateway, TaskStatus, TimeEntry, UserId,
};
use crate::error::{CoreError, PersistenceError, Result};
use crate::timer::{whole_secs, TaskId};

/// Gateway operations, for targeting injected failures and holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateTimeEntry,
    FinalizeTimeEntry,
    ListOpenTimeEntries,
    UpdateTaskStatus,
}

/// A recorded gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreateTimeEntry {
        task_id: TaskId,
        user_id: UserId,
        started_at: DateTime<Utc>,
    },
    FinalizeTimeEntry {
        entry_id: EntryId,
        ended_at: DateTime<Utc>,
    },
    ListOpenTimeEntries {
        user_id: UserId,
    },
    UpdateTaskStatus {
        task_id: TaskId,
        status: TaskStatus,
    },
}

impl GatewayCall {
    pub fn op(&self) -> GatewayOp {
        match self {
            GatewayCall::CreateTimeEntry { .. } => GatewayOp::CreateTimeEntry,
            GatewayCall::FinalizeTimeEntry { .. } => GatewayOp::FinalizeTimeEntry,
            GatewayCall::ListOpenTimeEntries { .. } => GatewayOp::ListOpenTimeEntries,
            GatewayCall::UpdateTaskStatus { .. } => GatewayOp::UpdateTaskStatus,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    entries: BTreeMap<EntryId, TimeEntry>,
    statuses: HashMap<TaskId, TaskStatus>,
    calls: Vec<GatewayCall>,
    failing: HashSet<GatewayOp>,
    holds: HashMap<GatewayOp, Arc<Semaphore>>,
}

/// Gateway backed by a map in memory.
///
/// Every call is recorded, any operation can be made to fail, and any
/// operation can be held open until released, which is how tests put a
/// start or stop "in flight".
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Test controls ────────────────────────────────────────────────

    /// Make every future `op` call fail with an unavailable store.
    pub fn fail(&self, op: GatewayOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: GatewayOp) {
        self.lock().failing.remove(&op);
    }

    /// Suspend future `op` calls until [`MemoryGateway::release`].
    pub fn hold(&self, op: GatewayOp) {
        self.lock()
            .holds
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Let held `op` calls through and stop holding new ones.
    pub fn release(&self, op: GatewayOp) {
        if let Some(gate) = self.lock().holds.remove(&op) {
            gate.close();
        }
    }

    /// Insert an open entry as if written by an earlier process.
    pub fn seed_open_entry(&self, entry: NewTimeEntry) -> EntryId {
        let mut state = self.lock();
        insert_entry(&mut state, entry)
    }

    /// Delete an entry out from under the engine.
    pub fn remove_entry(&self, id: EntryId) -> Option<TimeEntry> {
        self.lock().entries.remove(&id)
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, op: GatewayOp) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    pub fn entry(&self, id: EntryId) -> Option<TimeEntry> {
        self.lock().entries.get(&id).cloned()
    }

    pub fn entries(&self) -> Vec<TimeEntry> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn task_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.lock().statuses.get(task_id).copied()
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Record the call, wait out any hold, then check for injected failure.
    async fn enter(&self, call: GatewayCall) -> Result<()> {
        let op = call.op();
        let gate = {
            let mut state = self.lock();
            state.calls.push(call);
            state.holds.get(&op).cloned()
        };
        if let Some(gate) = gate {
            // Closing the gate is the release signal.
            let _ = gate.acquire().await;
        }
        if self.lock().failing.contains(&op) {
            return Err(PersistenceError::Unavailable(format!("injected failure for {op:?}")).into());
        }
        Ok(())
    }
}

fn insert_entry(state: &mut MemoryState, entry: NewTimeEntry) -> EntryId {
    state.next_id += 1;
    let id = EntryId(state.next_id);
    state.entries.insert(
        id,
        TimeEntry {
            id,
            task_id: entry.task_id,
            user_id: entry.user_id,
            started_at: entry.started_at,
            ended_at: None,
            estimated_secs: entry.estimated_target.map(whole_secs),
        },
    );
    id
}

impl PersistenceGateway for MemoryGateway {
    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<EntryId> {
        self.enter(GatewayCall::CreateTimeEntry {
            task_id: entry.task_id.clone(),
            user_id: entry.user_id.clone(),
            started_at: entry.started_at,
        })
        .await?;
        Ok(insert_entry(&mut self.lock(), entry))
    }

    async fn finalize_time_entry(&self, entry_id: EntryId, ended_at: DateTime<Utc>) -> Result<()> {
        self.enter(GatewayCall::FinalizeTimeEntry { entry_id, ended_at })
            .await?;
        let mut state = self.lock();
        match state.entries.get_mut(&entry_id) {
            Some(entry) if entry.is_open() => {
                entry.ended_at = Some(ended_at);
                Ok(())
            }
            _ => Err(CoreError::NotFound { entry_id }),
        }
    }

    async fn list_open_time_entries(&self, user_id: &UserId) -> Result<Vec<OpenTimeEntry>> {
        self.enter(GatewayCall::ListOpenTimeEntries {
            user_id: user_id.clone(),
        })
        .await?;
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|e| e.is_open() && &e.user_id == user_id)
            .map(TimeEntry::to_open)
            .collect())
    }

    async fn update_task_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<()> {
        self.enter(GatewayCall::UpdateTaskStatus {
            task_id: task_id.clone(),
            status,
        })
        .await?;
        self.lock().statuses.insert(task_id.clone(), status);
        Ok(())
    }
}
