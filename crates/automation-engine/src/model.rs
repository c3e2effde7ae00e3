//! Data models for the automation engine

use chrono::{DateTime, Utc};
use hydro_core::{ActuatorId, ActuatorType, Alert, DeviceId, Metric, SensorSnapshot, StateSource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the rules engine chose a state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    /// Reading below its minimum
    BelowMin { metric: Metric, value: f64, min: f64 },
    /// Reading above its maximum
    AboveMax { metric: Metric, value: f64, max: f64 },
    /// No comparator fired
    WithinRange { metric: Metric, value: f64 },
    /// Low-water interlock forced the actuator off
    SafetyInterlock { water_level: f64, critical: f64 },
}

impl DecisionReason {
    #[must_use]
    pub fn is_safety(&self) -> bool {
        matches!(self, Self::SafetyInterlock { .. })
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMin { metric, value, min } => write!(f, "{metric} {value} below min {min}"),
            Self::AboveMax { metric, value, max } => write!(f, "{metric} {value} above max {max}"),
            Self::WithinRange { metric, value } => write!(f, "{metric} {value} within range"),
            Self::SafetyInterlock {
                water_level,
                critical,
            } => write!(
                f,
                "safety interlock: water_level {water_level} below critical {critical}"
            ),
        }
    }
}

/// Desired state for one actuator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorDecision {
    pub actuator_id: ActuatorId,
    pub desired_state: bool,
    pub reason: DecisionReason,
}

/// Why an actuator got no decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    /// The snapshot lacks the metric the actuator depends on
    MissingSensorMetric { metric: Metric },
    /// The actuator's sensor key names no known metric
    UnknownSensorKey { key: String },
    /// The actuator type has no default metric and no sensor key
    NoMetricConfigured,
}

/// Output of one rules evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub decisions: Vec<ActuatorDecision>,
    pub alerts: Vec<Alert>,
    pub skipped: Vec<(ActuatorId, SkipReason)>,
}

impl Evaluation {
    /// Decision for an actuator, if any
    #[must_use]
    pub fn decision(&self, actuator_id: ActuatorId) -> Option<&ActuatorDecision> {
        self.decisions.iter().find(|d| d.actuator_id == actuator_id)
    }
}

/// Authoritative state entry for an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub state: bool,
    pub source: StateSource,
    pub updated_at: DateTime<Utc>,
}

/// Actuator entry in a device status
#[derive(Debug, Clone, Serialize)]
pub struct ActuatorStatus {
    pub actuator_id: ActuatorId,
    #[serde(rename = "type")]
    pub kind: ActuatorType,
    pub name: String,
    pub active: bool,
    #[serde(flatten)]
    pub state: ActuatorState,
}

/// Status of one device as reported to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub name: String,
    pub active: bool,
    pub last_reading: Option<SensorSnapshot>,
    pub actuator_states: Vec<ActuatorStatus>,
    pub automation_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// What happened to one decision during dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Recorded state already matches
    Unchanged,
    /// A recent manual write is being honoured
    HeldByManual,
    /// Gateway accepted and the new state was committed
    Switched(ActuatorState),
    /// Gateway failed; state untouched
    Failed(Alert),
}

/// Summary of one device tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub device_id: DeviceId,
    pub decisions: usize,
    pub switched: Vec<ActuatorId>,
    pub held: Vec<ActuatorId>,
    pub failed: Vec<ActuatorId>,
    pub alerts: usize,
    /// Set when the tick did not evaluate (inactive device, no snapshot)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Result of an emergency stop
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmergencyStopReport {
    pub device_id: DeviceId,
    pub stopped: Vec<ActuatorId>,
    pub failed: Vec<(ActuatorId, String)>,
}
