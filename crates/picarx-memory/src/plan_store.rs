//! [`PlanStore`] – the `SessionId → Plan` map shared by router and judge.
//!
//! Each session owns one slot guarded by an `RwLock`: mutations of the same
//! session are serialized (single writer), while status reads proceed
//! concurrently whenever no mutation is in flight.  Different sessions never
//! contend beyond the brief lookup of their slot.
//!
//! Slots are loaded lazily from the [`SessionStore`] backend and every
//! successful mutation is written through before it becomes visible.  A
//! mutation that fails (in the closure or in the backend) leaves the stored
//! plan untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use picarx_types::{PicarError, Plan, SessionId};
use tracing::{info, warn};

use crate::session_store::{InMemorySessionStore, SessionStore};

type Slot = Arc<RwLock<Option<Plan>>>;

pub struct PlanStore {
    backend: Box<dyn SessionStore>,
    slots: Mutex<HashMap<SessionId, Slot>>,
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PlanStore {
    pub fn new(backend: Box<dyn SessionStore>) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemorySessionStore::new()))
    }

    /// The active plan of `session`, if any.
    pub fn get(&self, session: &SessionId) -> Result<Option<Plan>, PicarError> {
        let slot = self.slot(session)?;
        let plan = read(&slot).clone();
        Ok(plan)
    }

    /// Store `plan` as the active plan of `session`.
    ///
    /// # Errors
    ///
    /// [`PicarError::PlanRejected`] when the current plan is in progress or
    /// completed; only pending and failed plans may be overwritten.
    pub fn install(&self, session: &SessionId, plan: Plan) -> Result<Plan, PicarError> {
        let slot = self.slot(session)?;
        let mut current = write(&slot);
        if let Some(existing) = current.as_ref()
            && !existing.is_replaceable()
        {
            return Err(PicarError::PlanRejected(format!(
                "session {session} already has a {} plan '{}'",
                existing.status.as_str(),
                existing.task
            )));
        }
        self.backend.save(session, &plan)?;
        info!(session = %session, task = %plan.task, steps = plan.total_steps, "plan installed");
        *current = Some(plan.clone());
        Ok(plan)
    }

    /// Apply `mutate` to the active plan of `session` under the session's
    /// write lock and persist the result.
    ///
    /// # Errors
    ///
    /// [`PicarError::NoActivePlan`] when the session has no plan, or
    /// whatever `mutate` returns.
    pub fn update<T>(
        &self,
        session: &SessionId,
        mutate: impl FnOnce(&mut Plan) -> Result<T, PicarError>,
    ) -> Result<T, PicarError> {
        let slot = self.slot(session)?;
        let mut current = write(&slot);
        let Some(plan) = current.as_ref() else {
            return Err(PicarError::NoActivePlan(session.to_string()));
        };
        let mut draft = plan.clone();
        let out = mutate(&mut draft)?;
        self.backend.save(session, &draft)?;
        *current = Some(draft);
        Ok(out)
    }

    /// Drop the active plan of `session`, whatever its status.
    pub fn clear(&self, session: &SessionId) -> Result<(), PicarError> {
        let slot = self.slot(session)?;
        let mut current = write(&slot);
        self.backend.remove(session)?;
        if let Some(plan) = current.take() {
            info!(session = %session, task = %plan.task, "plan cleared");
        }
        Ok(())
    }

    fn slot(&self, session: &SessionId) -> Result<Slot, PicarError> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("plan store slot map poisoned; recovering");
            poisoned.into_inner()
        });
        if let Some(slot) = slots.get(session) {
            return Ok(Arc::clone(slot));
        }
        let loaded = self.backend.load(session)?;
        let slot = Arc::new(RwLock::new(loaded));
        slots.insert(session.clone(), Arc::clone(&slot));
        Ok(slot)
    }
}

fn read(slot: &RwLock<Option<Plan>>) -> RwLockReadGuard<'_, Option<Plan>> {
    slot.read().unwrap_or_else(|poisoned| {
        warn!("plan slot poisoned; recovering");
        poisoned.into_inner()
    })
}

fn write(slot: &RwLock<Option<Plan>>) -> RwLockWriteGuard<'_, Option<Plan>> {
    slot.write().unwrap_or_else(|poisoned| {
        warn!("plan slot poisoned; recovering");
        poisoned.into_inner()
    })
}
