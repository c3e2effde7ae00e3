//! In-process collaborators: pushed readings, simulated outputs, log alerts

use crate::alert::{Alert, Severity};
use crate::device::{ActuatorId, DeviceId};
use crate::error::CoreError;
use crate::ports::{ActuatorGateway, AlertSink, SensorSource};
use crate::sensor::SensorSnapshot;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

/// Latest snapshot per device, fed by stations pushing readings
#[derive(Default)]
pub struct LatestReadings {
    readings: DashMap<DeviceId, SensorSnapshot>,
}

impl LatestReadings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot; older snapshots than the stored one are dropped
    pub fn record(&self, snapshot: SensorSnapshot) -> bool {
        let mut accepted = true;
        self.readings
            .entry(snapshot.device_id)
            .and_modify(|current| {
                if snapshot.timestamp >= current.timestamp {
                    *current = snapshot.clone();
                } else {
                    accepted = false;
                }
            })
            .or_insert_with(|| snapshot.clone());

        if !accepted {
            tracing::debug!(
                "Dropping out-of-order reading for device {} at {}",
                snapshot.device_id,
                snapshot.timestamp
            );
        }
        accepted
    }

    /// Peek at the stored snapshot
    #[must_use]
    pub fn get(&self, device_id: DeviceId) -> Option<SensorSnapshot> {
        self.readings.get(&device_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl SensorSource for LatestReadings {
    async fn read_latest(&self, device_id: DeviceId) -> Result<Option<SensorSnapshot>, CoreError> {
        Ok(self.get(device_id))
    }
}

/// Gateway that records outputs in memory instead of driving GPIOs
#[derive(Default)]
pub struct SimulatedGateway {
    outputs: DashMap<ActuatorId, bool>,
    faulty: DashSet<ActuatorId>,
}

impl SimulatedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last output driven for an actuator
    #[must_use]
    pub fn output(&self, actuator_id: ActuatorId) -> Option<bool> {
        self.outputs.get(&actuator_id).map(|r| *r.value())
    }

    /// Mark an actuator as failing (or healthy again)
    pub fn set_faulty(&self, actuator_id: ActuatorId, faulty: bool) {
        if faulty {
            self.faulty.insert(actuator_id);
        } else {
            self.faulty.remove(&actuator_id);
        }
    }
}

#[async_trait]
impl ActuatorGateway for SimulatedGateway {
    async fn set_actuator(
        &self,
        actuator_id: ActuatorId,
        desired_on: bool,
    ) -> Result<(), CoreError> {
        if self.faulty.contains(&actuator_id) {
            return Err(CoreError::Gateway {
                actuator_id,
                reason: "simulated fault".to_string(),
            });
        }

        self.outputs.insert(actuator_id, desired_on);
        tracing::info!(
            "Simulated actuator {} turned {}",
            actuator_id,
            if desired_on { "ON" } else { "OFF" }
        );
        Ok(())
    }
}

/// Alert sink writing alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn publish(&self, alert: Alert) {
        match alert.severity {
            Severity::Info => {
                tracing::info!(target: "alerts", "[device {}] {}", alert.device_id, alert.message)
            }
            Severity::Warning => {
                tracing::warn!(target: "alerts", "[device {}] {}", alert.device_id, alert.message)
            }
            Severity::Critical => {
                tracing::error!(target: "alerts", "[device {}] {}", alert.device_id, alert.message)
            }
        }
    }
}
