//! Engine configuration loaded from JSON

use crate::error::AutomationError;
use hydro_core::EffectiveThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Automation engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between ticks for each device
    pub tick_interval_secs: u64,
    /// Seconds a manual override is protected from automation re-assertion
    pub manual_hold_secs: u64,
    /// Start the scheduler as soon as the engine starts
    pub autostart: bool,
    /// Global threshold defaults; devices patch these sparsely
    pub thresholds: EffectiveThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            manual_hold_secs: 300,
            autostart: true,
            thresholds: EffectiveThresholds::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Manual hold window; saturates for values `validate` rejects
    #[must_use]
    pub fn manual_hold(&self) -> chrono::Duration {
        self.try_manual_hold().unwrap_or(chrono::Duration::MAX)
    }

    fn try_manual_hold(&self) -> Option<chrono::Duration> {
        i64::try_from(self.manual_hold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.tick_interval_secs == 0 {
            return Err(AutomationError::InvalidConfig(
                "tick_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.try_manual_hold().is_none() {
            return Err(AutomationError::InvalidConfig(format!(
                "manual_hold_secs {} is out of range",
                self.manual_hold_secs
            )));
        }
        if self.thresholds.water_level_critical > self.thresholds.water_level.max {
            return Err(AutomationError::InvalidConfig(format!(
                "water_level_critical {} exceeds water_level max {}",
                self.thresholds.water_level_critical, self.thresholds.water_level.max
            )));
        }
        Ok(())
    }
}

/// Load the engine configuration; a missing file yields the defaults
pub async fn load_config(path: &Path) -> Result<EngineConfig, AutomationError> {
    let config = match fs::read_to_string(path).await {
        Ok(contents) => {
            let config: EngineConfig = serde_json::from_str(&contents)?;
            tracing::info!("Loaded engine config from {:?}", path);
            config
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file found at {:?}, using defaults", path);
            EngineConfig::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.validate()?;
    Ok(config)
}
