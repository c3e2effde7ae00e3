//! Collaborator traits consumed and driven by the automation engine
//!
//! Implementations must be `Send + Sync`; the engine holds them as
//! `Arc<dyn Trait>` and calls them from concurrent per-device tasks.

use crate::alert::Alert;
use crate::device::{Actuator, ActuatorId, Device, DeviceId};
use crate::error::CoreError;
use crate::log::ActionLogEntry;
use crate::sensor::SensorSnapshot;
use async_trait::async_trait;

/// Source of the most recent readings for a device
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Latest snapshot, or `None` if the device has not reported
    async fn read_latest(&self, device_id: DeviceId) -> Result<Option<SensorSnapshot>, CoreError>;
}

/// Owner of device and actuator existence
///
/// Re-read at the start of every tick; the engine never caches it.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Devices with `active == true`
    async fn list_active_devices(&self) -> Result<Vec<Device>, CoreError>;

    /// Look up a single device, active or not
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, CoreError>;

    /// All actuators attached to a device
    async fn list_actuators(&self, device_id: DeviceId) -> Result<Vec<Actuator>, CoreError>;

    /// Look up a single actuator
    async fn find_actuator(&self, actuator_id: ActuatorId) -> Result<Option<Actuator>, CoreError>;
}

/// Persistence for snapshots and the action log
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &SensorSnapshot) -> Result<(), CoreError>;

    async fn save_action_log(&self, entry: &ActionLogEntry) -> Result<(), CoreError>;
}

/// Delivers ON/OFF commands to hardware or simulation
#[async_trait]
pub trait ActuatorGateway: Send + Sync {
    async fn set_actuator(&self, actuator_id: ActuatorId, desired_on: bool)
        -> Result<(), CoreError>;
}

/// Receives alerts produced by the loop
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: Alert);
}
