//! Error types for the hydro domain layer

use crate::device::ActuatorId;
use thiserror::Error;

/// Errors raised by collaborators (directory, storage, gateway)
#[derive(Error, Debug)]
pub enum CoreError {
    /// Hardware or simulation rejected a command
    #[error("Gateway dispatch failed for actuator {actuator_id}: {reason}")]
    Gateway {
        actuator_id: ActuatorId,
        reason: String,
    },

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
