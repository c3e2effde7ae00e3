//! Hydroponic device and actuator representation

use crate::sensor::Metric;
use crate::thresholds::ThresholdOverrides;
use serde::{Deserialize, Serialize};

/// Identifier of a controller station
pub type DeviceId = u64;

/// Identifier of a single actuator
pub type ActuatorId = u64;

/// Actuator kinds driven by the automation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorType {
    Pump,
    Light,
    Fan,
    WaterPump,
    Valve,
    NutrientPump,
}

/// How a metric reading is compared against its bounds to switch an actuator on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// ON when the reading is below the metric's minimum
    BelowMin,
    /// ON when the reading is above the metric's maximum
    AboveMax,
}

impl ActuatorType {
    /// All actuator types, in a stable order
    pub const ALL: [ActuatorType; 6] = [
        Self::Pump,
        Self::Light,
        Self::Fan,
        Self::WaterPump,
        Self::Valve,
        Self::NutrientPump,
    ];

    /// Metrics consulted when the actuator has no explicit sensor key
    #[must_use]
    pub fn default_metrics(self) -> &'static [Metric] {
        match self {
            Self::Pump | Self::Valve => &[Metric::Moisture],
            Self::WaterPump => &[Metric::WaterLevel],
            Self::Light => &[Metric::Light],
            Self::Fan => &[Metric::Temperature, Metric::Humidity],
            Self::NutrientPump => &[],
        }
    }

    /// Comparator used for this actuator type
    #[must_use]
    pub fn comparator(self) -> Comparator {
        match self {
            Self::Fan => Comparator::AboveMax,
            Self::Pump | Self::Valve | Self::WaterPump | Self::Light | Self::NutrientPump => {
                Comparator::BelowMin
            }
        }
    }

    /// Whether the low-water safety interlock applies to this type
    #[must_use]
    pub fn is_water_circuit(self) -> bool {
        matches!(self, Self::Pump | Self::Valve | Self::WaterPump)
    }

    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pump => "Irrigation pump",
            Self::Light => "Grow light",
            Self::Fan => "Ventilation fan",
            Self::WaterPump => "Water refill pump",
            Self::Valve => "Valve",
            Self::NutrientPump => "Nutrient pump",
        }
    }
}

/// A growing station (controller) known to the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Directory identifier
    pub id: DeviceId,
    /// User-assigned name (e.g., "Greenhouse A")
    #[serde(default)]
    pub name: Option<String>,
    /// Inactive devices are never evaluated
    #[serde(default = "default_true")]
    pub active: bool,
    /// Sparse per-device threshold patch
    #[serde(default)]
    pub thresholds: Option<ThresholdOverrides>,
}

impl Device {
    /// Create an active device without overrides
    #[must_use]
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            name: None,
            active: true,
            thresholds: None,
        }
    }

    /// Get a display name (friendly name or id)
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("device-{}", self.id))
    }
}

/// A switchable output attached to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actuator {
    /// Directory identifier
    pub id: ActuatorId,
    /// Owning device
    pub device_id: DeviceId,
    /// Actuator kind
    #[serde(rename = "type")]
    pub kind: ActuatorType,
    /// Optional name like "Grow Light 1"
    #[serde(default)]
    pub name: Option<String>,
    /// Metric override (e.g., "ec" for a nutrient pump)
    #[serde(default)]
    pub sensor_key: Option<String>,
    /// State assumed before the first observation
    #[serde(default)]
    pub default_state: bool,
    /// Inactive actuators are not evaluated
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Actuator {
    /// Create an active actuator with no sensor key and default state OFF
    #[must_use]
    pub fn new(id: ActuatorId, device_id: DeviceId, kind: ActuatorType) -> Self {
        Self {
            id,
            device_id,
            kind,
            name: None,
            sensor_key: None,
            default_state: false,
            active: true,
        }
    }

    /// Builder-style sensor key
    #[must_use]
    pub fn with_sensor_key(mut self, key: impl Into<String>) -> Self {
        self.sensor_key = Some(key.into());
        self
    }

    /// Get a display name (friendly name or type label)
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} #{}", self.kind.label(), self.id))
    }
}

fn default_true() -> bool {
    true
}
