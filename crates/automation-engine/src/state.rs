//! Authoritative actuator state
//!
//! One entry per actuator id. Writes are atomic per key and stamped while
//! the key's shard is locked, so the latest write always carries the
//! latest timestamp (last-write-wins by write time). Writers that also
//! drive hardware hold the actuator's dispatch lock across gateway call and
//! commit, which keeps hardware order and recorded order identical.

use crate::model::ActuatorState;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hydro_core::{Actuator, ActuatorId, StateSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Concurrent map of actuator id to state
#[derive(Default)]
pub struct StateManager {
    entries: DashMap<ActuatorId, ActuatorState>,
    dispatch_locks: DashMap<ActuatorId, Arc<Mutex<()>>>,
}

impl StateManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally record a state
    pub fn set_state(&self, id: ActuatorId, value: bool, source: StateSource) -> ActuatorState {
        let now = Utc::now();
        let state = match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let updated_at = now.max(occupied.get().updated_at);
                let state = ActuatorState {
                    state: value,
                    source,
                    updated_at,
                };
                occupied.insert(state);
                state
            }
            Entry::Vacant(vacant) => {
                let state = ActuatorState {
                    state: value,
                    source,
                    updated_at: now,
                };
                vacant.insert(state);
                state
            }
        };

        tracing::debug!("Actuator {} set to {} ({})", id, value, source);
        state
    }

    /// Current entry, initialized to the actuator's default on first access
    pub fn get_state(&self, actuator: &Actuator) -> ActuatorState {
        *self.entries.entry(actuator.id).or_insert_with(|| ActuatorState {
            state: actuator.default_state,
            source: StateSource::Automation,
            updated_at: Utc::now(),
        })
    }

    /// Current entry without initializing
    #[must_use]
    pub fn get(&self, id: ActuatorId) -> Option<ActuatorState> {
        self.entries.get(&id).map(|r| *r.value())
    }

    /// Read-only copy of every entry
    #[must_use]
    pub fn snapshot(&self) -> HashMap<ActuatorId, ActuatorState> {
        self.entries
            .iter()
            .map(|r| (*r.key(), *r.value()))
            .collect()
    }

    /// Drop an actuator's entry after it was deleted from the directory
    ///
    /// The dispatch lock is kept so a dispatch racing the removal still
    /// serializes with later writers on the same id.
    pub fn remove(&self, id: ActuatorId) -> Option<ActuatorState> {
        self.entries.remove(&id).map(|(_, state)| state)
    }

    /// Acquire the actuator's dispatch lock
    pub async fn lock(&self, id: ActuatorId) -> OwnedMutexGuard<()> {
        let lock = self.dispatch_locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
