//! Hydroponic station domain layer
//!
//! This crate provides the device, actuator and sensor model shared by the
//! automation engine, the threshold resolver, the collaborator traits the
//! engine consumes, and file-backed / simulated implementations of them.

pub mod alert;
pub mod device;
pub mod error;
pub mod log;
pub mod persistence;
pub mod ports;
pub mod sensor;
pub mod simulation;
pub mod thresholds;

pub use alert::{Alert, AlertCode, Severity};
pub use device::{Actuator, ActuatorId, ActuatorType, Device, DeviceId};
pub use error::CoreError;
pub use log::{ActionLogEntry, ActionLogFilter, StateSource};
pub use ports::{ActuatorGateway, AlertSink, DeviceDirectory, SensorSource, SnapshotStore};
pub use sensor::{Metric, SensorSnapshot};
pub use thresholds::{Bounds, EffectiveThresholds, ThresholdOverrides};
