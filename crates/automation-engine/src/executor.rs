//! Dispatches actuator commands and commits resulting state

use crate::engine::AutomationEvent;
use crate::error::AutomationError;
use crate::model::{ActuatorDecision, ActuatorState, DispatchOutcome};
use crate::state::StateManager;
use chrono::Utc;
use hydro_core::{ActionLogEntry, Actuator, ActuatorGateway, Alert, SnapshotStore, StateSource};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Executor for actuator commands
///
/// Every dispatch holds the actuator's lock from the state read through the
/// gateway call to the commit.
pub struct ActuatorExecutor {
    state: Arc<StateManager>,
    gateway: Arc<dyn ActuatorGateway>,
    store: Arc<dyn SnapshotStore>,
    manual_hold: chrono::Duration,
    event_tx: broadcast::Sender<AutomationEvent>,
}

impl ActuatorExecutor {
    /// Create a new executor
    pub fn new(
        state: Arc<StateManager>,
        gateway: Arc<dyn ActuatorGateway>,
        store: Arc<dyn SnapshotStore>,
        manual_hold: chrono::Duration,
        event_tx: broadcast::Sender<AutomationEvent>,
    ) -> Self {
        Self {
            state,
            gateway,
            store,
            manual_hold,
            event_tx,
        }
    }

    /// Apply a rules-engine decision
    pub async fn apply_decision(
        &self,
        actuator: &Actuator,
        decision: &ActuatorDecision,
    ) -> DispatchOutcome {
        let _guard = self.state.lock(actuator.id).await;

        let current = self.state.get_state(actuator);
        if current.state == decision.desired_state {
            return DispatchOutcome::Unchanged;
        }

        let safety = decision.reason.is_safety();
        if !safety && self.is_held_by_manual(&current) {
            tracing::debug!(
                "Actuator {} held at {} by manual override since {}",
                actuator.id,
                current.state,
                current.updated_at
            );
            return DispatchOutcome::HeldByManual;
        }

        if safety {
            tracing::warn!(
                "Safety override: forcing {} ({}) OFF: {}",
                actuator.display_name(),
                actuator.id,
                decision.reason
            );
        }

        match self
            .gateway
            .set_actuator(actuator.id, decision.desired_state)
            .await
        {
            Ok(()) => {
                let reason = decision.reason.to_string();
                let committed = self
                    .commit(actuator, decision.desired_state, StateSource::Automation, &reason)
                    .await;
                tracing::info!(
                    "[Automation] {} ({}) -> {}: {}",
                    actuator.display_name(),
                    actuator.id,
                    on_off(decision.desired_state),
                    reason
                );
                DispatchOutcome::Switched(committed)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to switch {} ({}) {}: {}",
                    actuator.display_name(),
                    actuator.id,
                    on_off(decision.desired_state),
                    e
                );
                DispatchOutcome::Failed(Alert::actuator_degraded(
                    actuator.device_id,
                    actuator.id,
                    decision.desired_state,
                    &e.to_string(),
                ))
            }
        }
    }

    /// Apply an operator command, bypassing the rules engine
    pub async fn apply_manual(
        &self,
        actuator: &Actuator,
        desired_on: bool,
        reason: &str,
    ) -> Result<ActuatorState, AutomationError> {
        let _guard = self.state.lock(actuator.id).await;

        self.gateway
            .set_actuator(actuator.id, desired_on)
            .await
            .map_err(|e| AutomationError::DispatchFailed {
                actuator_id: actuator.id,
                reason: e.to_string(),
            })?;

        let committed = self
            .commit(actuator, desired_on, StateSource::Manual, reason)
            .await;
        tracing::info!(
            "[Manual] {} ({}) -> {}: {}",
            actuator.display_name(),
            actuator.id,
            on_off(desired_on),
            reason
        );
        Ok(committed)
    }

    fn is_held_by_manual(&self, current: &ActuatorState) -> bool {
        current.source == StateSource::Manual
            && Utc::now() - current.updated_at < self.manual_hold
    }

    /// Record the new state, the action log entry and the change event
    async fn commit(
        &self,
        actuator: &Actuator,
        value: bool,
        source: StateSource,
        reason: &str,
    ) -> ActuatorState {
        let committed = self.state.set_state(actuator.id, value, source);

        let entry = ActionLogEntry::new(
            actuator.id,
            actuator.device_id,
            value,
            source,
            reason,
            committed.updated_at,
        );
        if let Err(e) = self.store.save_action_log(&entry).await {
            tracing::warn!("Failed to save action log for actuator {}: {}", actuator.id, e);
        }

        let _ = self.event_tx.send(AutomationEvent::StateChanged {
            device_id: actuator.device_id,
            actuator_id: actuator.id,
            state: committed,
        });
        committed
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}
