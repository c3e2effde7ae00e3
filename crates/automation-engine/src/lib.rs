//! Automation engine for Hydro Assistant
//!
//! Evaluates sensor snapshots against resolved thresholds, dispatches the
//! resulting actuator commands and keeps the authoritative actuator state.
//! A scheduler drives one tick per active device on a fixed interval.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod rules;
pub mod scheduler;
pub mod state;

pub use config::{load_config, EngineConfig};
pub use engine::{AutomationEngine, AutomationEvent, Collaborators};
pub use error::AutomationError;
pub use model::*;
pub use rules::evaluate;
pub use scheduler::{DeviceTicker, Scheduler};
pub use state::StateManager;
