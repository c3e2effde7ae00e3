//! Actuator action log

use crate::device::{ActuatorId, DeviceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who caused a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Automation,
    Manual,
}

impl fmt::Display for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automation => f.write_str("automation"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// One committed actuator transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: uuid::Uuid,
    pub actuator_id: ActuatorId,
    pub device_id: DeviceId,
    pub state: bool,
    pub source: StateSource,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionLogEntry {
    /// Create a new entry stamped with a fresh id
    #[must_use]
    pub fn new(
        actuator_id: ActuatorId,
        device_id: DeviceId,
        state: bool,
        source: StateSource,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            actuator_id,
            device_id,
            state,
            source,
            reason: reason.into(),
            timestamp,
        }
    }
}

/// Criteria for reading back the action log; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionLogFilter {
    #[serde(default)]
    pub actuator_id: Option<ActuatorId>,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Inclusive lower bound
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl ActionLogFilter {
    #[must_use]
    pub fn matches(&self, entry: &ActionLogEntry) -> bool {
        self.actuator_id.map_or(true, |id| entry.actuator_id == id)
            && self.device_id.map_or(true, |id| entry.device_id == id)
            && self.start_time.map_or(true, |t| entry.timestamp >= t)
            && self.end_time.map_or(true, |t| entry.timestamp <= t)
    }
}
