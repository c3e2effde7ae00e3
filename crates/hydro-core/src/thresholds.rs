//! Threshold model and resolution of device overrides against global defaults

use crate::sensor::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse per-device patch, keyed `<metric>_min`, `<metric>_max` or `water_level_critical`
pub type ThresholdOverrides = BTreeMap<String, f64>;

/// Key used for the safety interlock bound
pub const WATER_LEVEL_CRITICAL_KEY: &str = "water_level_critical";

/// Inclusive operating range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether a reading lies outside the range
    #[must_use]
    pub fn is_out_of_range(&self, value: f64) -> bool {
        value < self.min || value > self.max
    }
}

/// Fully populated thresholds; also the shape of the global defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectiveThresholds {
    pub temperature: Bounds,
    pub humidity: Bounds,
    pub light: Bounds,
    pub moisture: Bounds,
    pub water_level: Bounds,
    pub ec: Bounds,
    pub ppm: Bounds,
    /// Below this level every water-circuit actuator is forced off
    pub water_level_critical: f64,
}

impl Default for EffectiveThresholds {
    fn default() -> Self {
        Self {
            temperature: Bounds::new(18.0, 28.0),
            humidity: Bounds::new(40.0, 70.0),
            light: Bounds::new(300.0, 100_000.0),
            moisture: Bounds::new(30.0, 80.0),
            water_level: Bounds::new(20.0, 100.0),
            ec: Bounds::new(1.0, 2.5),
            ppm: Bounds::new(560.0, 1400.0),
            water_level_critical: 10.0,
        }
    }
}

impl EffectiveThresholds {
    /// Bounds for a metric
    #[must_use]
    pub fn bounds(&self, metric: Metric) -> Bounds {
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

    fn bounds_mut(&mut self, metric: Metric) -> &mut Bounds {
        match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Light => &mut self.light,
            Metric::Moisture => &mut self.moisture,
            Metric::WaterLevel => &mut self.water_level,
            Metric::Ec => &mut self.ec,
            Metric::Ppm => &mut self.ppm,
        }
    }

    /// Merge a device patch over these (global) thresholds.
    ///
    /// Declared keys replace the global bound, everything else falls back.
    /// Unrecognized keys and non-finite values are logged and ignored.
    #[must_use]
    pub fn resolve(&self, overrides: Option<&ThresholdOverrides>) -> EffectiveThresholds {
        let mut effective = self.clone();
        let Some(overrides) = overrides else {
            return effective;
        };

        for (key, value) in overrides {
            if !value.is_finite() {
                tracing::warn!("Ignoring non-finite threshold override {}={}", key, value);
                continue;
            }
            if !effective.apply(key, *value) {
                tracing::warn!("Ignoring unknown threshold override key '{}'", key);
            }
        }
        effective
    }

    /// Apply one override; returns false when the key is not recognized
    fn apply(&mut self, key: &str, value: f64) -> bool {
        if key == WATER_LEVEL_CRITICAL_KEY {
            self.water_level_critical = value;
            return true;
        }

        if let Some(metric) = key.strip_suffix("_min").and_then(|m| m.parse::<Metric>().ok()) {
            self.bounds_mut(metric).min = value;
            return true;
        }
        if let Some(metric) = key.strip_suffix("_max").and_then(|m| m.parse::<Metric>().ok()) {
            self.bounds_mut(metric).max = value;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, f64)]) -> ThresholdOverrides {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_no_override_returns_global() {
        let global = EffectiveThresholds::default();
        assert_eq!(global.resolve(None), global);
    }

    #[test]
    fn test_declared_keys_replace_others_fall_back() {
        let global = EffectiveThresholds::default();
        let patch = overrides(&[("moisture_min", 45.0), ("temperature_max", 31.0)]);
        let effective = global.resolve(Some(&patch));

        assert_eq!(effective.moisture, Bounds::new(45.0, global.moisture.max));
        assert_eq!(effective.temperature, Bounds::new(global.temperature.min, 31.0));
        assert_eq!(effective.humidity, global.humidity);
        assert_eq!(effective.water_level_critical, global.water_level_critical);
    }

    #[test]
    fn test_critical_water_level_override() {
        let patch = overrides(&[("water_level_critical", 15.0)]);
        let effective = EffectiveThresholds::default().resolve(Some(&patch));
        assert_eq!(effective.water_level_critical, 15.0);
    }

    #[test]
    fn test_unknown_and_non_finite_keys_are_ignored() {
        let global = EffectiveThresholds::default();
        let patch = overrides(&[
            ("co2_max", 900.0),
            ("moisture", 10.0),
            ("light_min", f64::NAN),
        ]);
        assert_eq!(global.resolve(Some(&patch)), global);
    }

    #[test]
    fn test_partial_global_config() {
        let parsed: EffectiveThresholds =
            serde_json::from_str(r#"{"moisture": {"min": 25.0, "max": 90.0}}"#).unwrap();
        assert_eq!(parsed.moisture, Bounds::new(25.0, 90.0));
        assert_eq!(parsed.light, EffectiveThresholds::default().light);
    }
}
