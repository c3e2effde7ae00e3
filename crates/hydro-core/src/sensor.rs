//! Sensor readings reported by a station

use crate::device::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metrics a station may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    Light,
    Moisture,
    WaterLevel,
    Ec,
    Ppm,
}

impl Metric {
    /// All recognized metrics
    pub const ALL: [Metric; 7] = [
        Self::Temperature,
        Self::Humidity,
        Self::Light,
        Self::Moisture,
        Self::WaterLevel,
        Self::Ec,
        Self::Ppm,
    ];

    /// Canonical key as used in payloads and threshold overrides
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Light => "light",
            Self::Moisture => "moisture",
            Self::WaterLevel => "water_level",
            Self::Ec => "ec",
            Self::Ppm => "ppm",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = String;

    /// Parse a metric key, accepting the `_level` / `tds` spellings stations use
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "light" | "lux" => Ok(Self::Light),
            "moisture" => Ok(Self::Moisture),
            "water_level" => Ok(Self::WaterLevel),
            "ec" | "ec_level" => Ok(Self::Ec),
            "ppm" | "ppm_level" | "tds" => Ok(Self::Ppm),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// Latest readings for one device; absent metrics were not reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moisture: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppm: Option<f64>,
}

impl SensorSnapshot {
    /// Create an empty snapshot stamped now
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            timestamp: Utc::now(),
            temperature: None,
            humidity: None,
            light: None,
            moisture: None,
            water_level: None,
            ec: None,
            ppm: None,
        }
    }

    /// Reading for a metric, if reported
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Light => self.light,
            Metric::Moisture => self.moisture,
            Metric::WaterLevel => self.water_level,
            Metric::Ec => self.ec,
            Metric::Ppm => self.ppm,
        }
    }

    /// Set a reading
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Light => &mut self.light,
            Metric::Moisture => &mut self.moisture,
            Metric::WaterLevel => &mut self.water_level,
            Metric::Ec => &mut self.ec,
            Metric::Ppm => &mut self.ppm,
        };
        *slot = value;
    }

    /// Builder-style reading
    #[must_use]
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, Some(value));
        self
    }

    /// Metrics present in this snapshot
    pub fn reported(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|m| self.get(m).map(|v| (m, v)))
    }
}
