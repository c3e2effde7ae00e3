//! Error types for the automation engine

use hydro_core::{ActuatorId, CoreError, DeviceId};
use thiserror::Error;

/// Errors that can occur in the automation engine
///
/// Missing sensor metrics, unknown override keys, inactive devices and
/// safety overrides are not errors; they are logged and reported in the
/// evaluation or tick report instead.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// Device unknown to the directory
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Actuator unknown to the directory
    #[error("Actuator not found: {0}")]
    ActuatorNotFound(ActuatorId),

    /// Gateway rejected a command; state left unchanged
    #[error("Dispatch to actuator {actuator_id} failed: {reason}")]
    DispatchFailed {
        actuator_id: ActuatorId,
        reason: String,
    },

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collaborator error (directory, sensor source, storage)
    #[error("Collaborator error: {0}")]
    Core(#[from] CoreError),

    /// IO error (config loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
