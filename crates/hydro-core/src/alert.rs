//! Alerts raised by the automation loop

use crate::device::{ActuatorId, DeviceId};
use crate::sensor::Metric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Machine-readable alert code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCode {
    /// Water level below the critical bound; water circuit forced off
    WaterLevelCritical,
    /// EC/PPM reading outside its range on a nutrient-dosed device
    NutrientOutOfRange,
    /// Gateway rejected a command; retried next tick
    ActuatorDegraded,
}

/// An alert for the alert sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub code: AlertCode,
    pub message: String,
    pub device_id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actuator_id: Option<ActuatorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Critical low-water alert for a device
    #[must_use]
    pub fn water_level_critical(
        device_id: DeviceId,
        level: f64,
        critical: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity: Severity::Critical,
            code: AlertCode::WaterLevelCritical,
            message: format!(
                "Water level {level:.1}% is below critical {critical:.1}%, water circuit forced off"
            ),
            device_id,
            actuator_id: None,
            metric: Some(Metric::WaterLevel),
            value: Some(level),
            timestamp,
        }
    }

    /// Nutrient reading out of range
    #[must_use]
    pub fn nutrient_out_of_range(
        device_id: DeviceId,
        metric: Metric,
        value: f64,
        min: f64,
        max: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            code: AlertCode::NutrientOutOfRange,
            message: format!("{metric} reading {value} outside [{min}, {max}]"),
            device_id,
            actuator_id: None,
            metric: Some(metric),
            value: Some(value),
            timestamp,
        }
    }

    /// Actuator command could not be delivered
    #[must_use]
    pub fn actuator_degraded(
        device_id: DeviceId,
        actuator_id: ActuatorId,
        desired_on: bool,
        reason: &str,
    ) -> Self {
        let state = if desired_on { "ON" } else { "OFF" };
        Self {
            severity: Severity::Warning,
            code: AlertCode::ActuatorDegraded,
            message: format!("Failed to switch actuator {actuator_id} {state}: {reason}"),
            device_id,
            actuator_id: Some(actuator_id),
            metric: None,
            value: None,
            timestamp: Utc::now(),
        }
    }
}
