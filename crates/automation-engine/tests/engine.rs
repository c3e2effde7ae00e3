use async_trait::async_trait;
use automation_engine::{
    AutomationEngine, AutomationError, AutomationEvent, Collaborators, EngineConfig,
};
use hydro_core::simulation::{LatestReadings, SimulatedGateway};
use hydro_core::{
    ActionLogEntry, Actuator, ActuatorId, ActuatorType, Alert, AlertCode, AlertSink, CoreError,
    Device, DeviceDirectory, DeviceId, Metric, SensorSnapshot, SnapshotStore, StateSource,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MemoryDirectory {
    devices: Vec<Device>,
    actuators: Vec<Actuator>,
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn list_active_devices(&self) -> Result<Vec<Device>, CoreError> {
        Ok(self.devices.iter().filter(|d| d.active).cloned().collect())
    }

    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, CoreError> {
        Ok(self.devices.iter().find(|d| d.id == device_id).cloned())
    }

    async fn list_actuators(&self, device_id: DeviceId) -> Result<Vec<Actuator>, CoreError> {
        Ok(self
            .actuators
            .iter()
            .filter(|a| a.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn find_actuator(&self, id: ActuatorId) -> Result<Option<Actuator>, CoreError> {
        Ok(self.actuators.iter().find(|a| a.id == id).cloned())
    }
}

#[derive(Default)]
struct MemoryStore {
    snapshots: Mutex<Vec<SensorSnapshot>>,
    actions: Mutex<Vec<ActionLogEntry>>,
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save_snapshot(&self, snapshot: &SensorSnapshot) -> Result<(), CoreError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn save_action_log(&self, entry: &ActionLogEntry) -> Result<(), CoreError> {
        self.actions.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CollectingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlerts {
    fn codes(&self) -> Vec<AlertCode> {
        self.alerts.lock().unwrap().iter().map(|a| a.code).collect()
    }
}

#[async_trait]
impl AlertSink for CollectingAlerts {
    async fn publish(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

struct Harness {
    engine: Arc<AutomationEngine>,
    readings: Arc<LatestReadings>,
    gateway: Arc<SimulatedGateway>,
    store: Arc<MemoryStore>,
    alerts: Arc<CollectingAlerts>,
}

impl Harness {
    fn new(directory: MemoryDirectory, config: EngineConfig) -> Self {
        let readings = Arc::new(LatestReadings::new());
        let gateway = Arc::new(SimulatedGateway::new());
        let store = Arc::new(MemoryStore::default());
        let alerts = Arc::new(CollectingAlerts::default());

        let engine = AutomationEngine::new(
            config,
            Collaborators {
                sensors: readings.clone(),
                directory: Arc::new(directory),
                store: store.clone(),
                gateway: gateway.clone(),
                alerts: alerts.clone(),
            },
        )
        .unwrap();

        Self {
            engine: Arc::new(engine),
            readings,
            gateway,
            store,
            alerts,
        }
    }

    fn push(&self, snapshot: SensorSnapshot) {
        assert!(self.readings.record(snapshot));
    }
}

fn config(manual_hold_secs: u64) -> EngineConfig {
    EngineConfig {
        manual_hold_secs,
        autostart: false,
        ..EngineConfig::default()
    }
}

/// Device 1 with a pump (id 10) and a light (id 11); device 2 with a fan (id 20)
fn two_stations() -> MemoryDirectory {
    MemoryDirectory {
        devices: vec![Device::new(1), Device::new(2)],
        actuators: vec![
            Actuator::new(10, 1, ActuatorType::Pump),
            Actuator::new(11, 1, ActuatorType::Light),
            Actuator::new(20, 2, ActuatorType::Fan),
        ],
    }
}

#[tokio::test]
async fn test_tick_switches_pump_and_records_everything() {
    let h = Harness::new(two_stations(), config(300));
    let mut events = h.engine.subscribe();
    h.push(
        SensorSnapshot::new(1)
            .with(Metric::Moisture, 20.0)
            .with(Metric::WaterLevel, 80.0)
            .with(Metric::Light, 500.0),
    );

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert_eq!(report.decisions, 2);
    assert_eq!(report.switched, vec![10]);
    assert!(report.failed.is_empty());
    assert_eq!(h.gateway.output(10), Some(true));
    assert_eq!(h.gateway.output(11), None);

    let pump = h.engine.state().get(10).unwrap();
    assert!(pump.state);
    assert_eq!(pump.source, StateSource::Automation);

    assert_eq!(h.store.snapshots.lock().unwrap().len(), 1);
    let actions = h.store.actions.lock().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].actuator_id, 10);
    assert!(actions[0].state);

    match events.recv().await.unwrap() {
        AutomationEvent::StateChanged {
            actuator_id, state, ..
        } => {
            assert_eq!(actuator_id, 10);
            assert!(state.state);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        AutomationEvent::TickCompleted { .. }
    ));
}

#[tokio::test]
async fn test_repeated_tick_does_not_redispatch() {
    let h = Harness::new(two_stations(), config(300));
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));

    h.engine.tick(&Device::new(1)).await.unwrap();
    let second = h.engine.tick(&Device::new(1)).await.unwrap();

    assert!(second.switched.is_empty());
    assert_eq!(h.store.actions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unchanged_reading_is_not_reevaluated() {
    let h = Harness::new(two_stations(), config(300));
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));

    h.engine.tick(&Device::new(1)).await.unwrap();
    let first_run = h.engine.get_status(1).await.unwrap().last_run_at;
    let mut events = h.engine.subscribe();

    let second = h.engine.tick(&Device::new(1)).await.unwrap();

    assert!(second.skipped.is_some());
    assert_eq!(second.decisions, 0);
    assert_eq!(h.store.snapshots.lock().unwrap().len(), 1);
    assert_eq!(h.engine.get_status(1).await.unwrap().last_run_at, first_run);
    assert!(matches!(
        events.recv().await.unwrap(),
        AutomationEvent::TickSkipped { device_id: 1, .. }
    ));

    // A fresh reading is evaluated again
    let mut fresh = SensorSnapshot::new(1).with(Metric::Moisture, 50.0);
    fresh.timestamp = first_run.unwrap() + chrono::Duration::seconds(1);
    h.push(fresh);
    let third = h.engine.tick(&Device::new(1)).await.unwrap();
    assert!(third.skipped.is_none());
    assert_eq!(third.switched, vec![10]);
    assert_eq!(h.store.snapshots.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_device_critical_override_forces_pump_off() {
    let mut directory = two_stations();
    directory.devices[0].thresholds =
        Some([("water_level_critical".to_string(), 25.0)].into_iter().collect());
    let device = directory.devices[0].clone();
    let h = Harness::new(directory, config(300));
    // 20 is fine against the global critical of 10 but not the device's 25
    h.engine.override_actuator(10, true).await.unwrap();
    h.push(
        SensorSnapshot::new(1)
            .with(Metric::Moisture, 15.0)
            .with(Metric::WaterLevel, 20.0),
    );

    let report = h.engine.tick(&device).await.unwrap();

    assert_eq!(report.switched, vec![10]);
    assert!(!h.engine.state().get(10).unwrap().state);
    assert_eq!(h.gateway.output(10), Some(false));
    assert_eq!(h.alerts.codes(), vec![AlertCode::WaterLevelCritical]);
}

#[tokio::test]
async fn test_gateway_failure_keeps_state_and_raises_degraded_alert() {
    let h = Harness::new(two_stations(), config(300));
    h.gateway.set_faulty(10, true);
    h.push(
        SensorSnapshot::new(1)
            .with(Metric::Moisture, 20.0)
            .with(Metric::Light, 100.0),
    );

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    // Failure on the pump does not stop the light
    assert_eq!(report.failed, vec![10]);
    assert_eq!(report.switched, vec![11]);
    assert!(!h.engine.state().get(10).unwrap().state);
    assert_eq!(h.gateway.output(11), Some(true));
    assert_eq!(h.alerts.codes(), vec![AlertCode::ActuatorDegraded]);

    let alert = h.alerts.alerts.lock().unwrap()[0].clone();
    assert_eq!(alert.actuator_id, Some(10));
}

#[tokio::test]
async fn test_missing_snapshot_skips_tick() {
    let h = Harness::new(two_stations(), config(300));
    let mut events = h.engine.subscribe();

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert!(report.skipped.is_some());
    assert_eq!(report.decisions, 0);
    assert!(matches!(
        events.recv().await.unwrap(),
        AutomationEvent::TickSkipped { device_id: 1, .. }
    ));
    let status = h.engine.get_status(1).await.unwrap();
    assert!(status.last_run_at.is_none());
    assert!(status.last_reading.is_none());
}

#[tokio::test]
async fn test_inactive_device_is_never_evaluated() {
    let h = Harness::new(two_stations(), config(300));
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));
    let mut device = Device::new(1);
    device.active = false;

    let report = h.engine.tick(&device).await.unwrap();

    assert!(report.skipped.is_some());
    assert!(h.gateway.output(10).is_none());
    assert!(h.store.snapshots.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_metric_retains_prior_state() {
    let h = Harness::new(two_stations(), config(300));
    h.engine.state().set_state(11, true, StateSource::Automation);
    // No light reading at all
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 50.0));

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert_eq!(report.decisions, 1);
    assert!(h.engine.state().get(11).unwrap().state);
    assert!(h.gateway.output(11).is_none());
}

#[tokio::test]
async fn test_manual_override_is_held_against_automation() {
    let h = Harness::new(two_stations(), config(300));
    h.engine.override_actuator(10, true).await.unwrap();
    // Moisture fine, rules want the pump OFF
    h.push(
        SensorSnapshot::new(1)
            .with(Metric::Moisture, 50.0)
            .with(Metric::WaterLevel, 80.0),
    );

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert_eq!(report.held, vec![10]);
    let pump = h.engine.state().get(10).unwrap();
    assert!(pump.state);
    assert_eq!(pump.source, StateSource::Manual);
    assert_eq!(h.gateway.output(10), Some(true));
}

#[tokio::test]
async fn test_safety_interlock_overrides_manual_hold() {
    let h = Harness::new(two_stations(), config(300));
    h.engine.override_actuator(10, true).await.unwrap();
    h.push(
        SensorSnapshot::new(1)
            .with(Metric::Moisture, 20.0)
            .with(Metric::WaterLevel, 5.0),
    );

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert_eq!(report.switched, vec![10]);
    let pump = h.engine.state().get(10).unwrap();
    assert!(!pump.state);
    assert_eq!(pump.source, StateSource::Automation);
    assert_eq!(h.gateway.output(10), Some(false));
    assert!(h.alerts.codes().contains(&AlertCode::WaterLevelCritical));
}

#[tokio::test]
async fn test_expired_manual_hold_lets_automation_reassert() {
    let h = Harness::new(two_stations(), config(0));
    h.engine.override_actuator(10, true).await.unwrap();
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 50.0));

    let report = h.engine.tick(&Device::new(1)).await.unwrap();

    assert_eq!(report.switched, vec![10]);
    assert!(!h.engine.state().get(10).unwrap().state);
}

#[tokio::test]
async fn test_override_unknown_actuator() {
    let h = Harness::new(two_stations(), config(300));
    let err = h.engine.override_actuator(99, true).await.unwrap_err();
    assert!(matches!(err, AutomationError::ActuatorNotFound(99)));
}

#[tokio::test]
async fn test_override_failure_leaves_state_untouched() {
    let h = Harness::new(two_stations(), config(300));
    h.gateway.set_faulty(11, true);

    let err = h.engine.override_actuator(11, true).await.unwrap_err();

    assert!(matches!(
        err,
        AutomationError::DispatchFailed { actuator_id: 11, .. }
    ));
    assert!(h.engine.state().get(11).is_none());
}

#[tokio::test]
async fn test_override_and_tick_on_different_actuators_both_land() {
    let h = Harness::new(two_stations(), config(300));
    h.push(SensorSnapshot::new(2).with(Metric::Temperature, 35.0));

    let fan_station = Device::new(2);
    let (manual, report) = tokio::join!(
        h.engine.override_actuator(11, true),
        h.engine.tick(&fan_station)
    );

    assert!(manual.unwrap().state);
    assert_eq!(report.unwrap().switched, vec![20]);
    assert_eq!(h.engine.state().get(11).unwrap().source, StateSource::Manual);
    assert_eq!(
        h.engine.state().get(20).unwrap().source,
        StateSource::Automation
    );
}

#[tokio::test]
async fn test_emergency_stop_turns_everything_off() {
    let h = Harness::new(two_stations(), config(300));
    h.engine.override_actuator(10, true).await.unwrap();
    h.engine.override_actuator(11, true).await.unwrap();
    h.gateway.set_faulty(11, true);

    let report = h.engine.emergency_stop(1).await.unwrap();

    assert_eq!(report.stopped, vec![10]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 11);
    assert_eq!(h.gateway.output(10), Some(false));
    // Failed stop leaves the recorded state alone
    assert!(h.engine.state().get(11).unwrap().state);
}

#[tokio::test]
async fn test_status_reports_states_and_last_run() {
    let h = Harness::new(two_stations(), config(300));
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));
    h.engine.tick(&Device::new(1)).await.unwrap();

    let status = h.engine.get_status(1).await.unwrap();

    assert_eq!(status.device_id, 1);
    assert_eq!(status.name, "device-1");
    assert!(status.active);
    assert!(status.last_run_at.is_some());
    assert_eq!(
        status.last_reading.unwrap().get(Metric::Moisture),
        Some(20.0)
    );
    assert!(!status.automation_active);
    assert_eq!(status.actuator_states.len(), 2);
    let pump = status
        .actuator_states
        .iter()
        .find(|a| a.actuator_id == 10)
        .unwrap();
    assert!(pump.state.state);
    // Light was never observed and reports its default
    let light = status
        .actuator_states
        .iter()
        .find(|a| a.actuator_id == 11)
        .unwrap();
    assert!(!light.state.state);
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let h = Harness::new(two_stations(), config(300));

    assert!(matches!(
        h.engine.get_status(999).await,
        Err(AutomationError::DeviceNotFound(999))
    ));
    assert!(matches!(
        h.engine.emergency_stop(999).await,
        Err(AutomationError::DeviceNotFound(999))
    ));
}

#[tokio::test]
async fn test_forget_actuator_drops_state() {
    let h = Harness::new(two_stations(), config(300));
    h.engine.override_actuator(10, true).await.unwrap();

    assert!(h.engine.forget_actuator(10).is_some());
    assert!(h.engine.state().get(10).is_none());
    assert!(h.engine.forget_actuator(10).is_none());
}

#[tokio::test]
async fn test_run_once_ticks_every_active_device() {
    let mut directory = two_stations();
    directory.devices[1].active = false;
    let h = Harness::new(directory, config(300));
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));
    h.push(SensorSnapshot::new(2).with(Metric::Temperature, 35.0));

    h.engine.run_once().await;

    assert_eq!(h.gateway.output(10), Some(true));
    assert!(h.gateway.output(20).is_none());
}

#[tokio::test]
async fn test_scheduler_lifecycle() {
    let h = Harness::new(
        two_stations(),
        EngineConfig {
            tick_interval_secs: 1,
            autostart: true,
            ..EngineConfig::default()
        },
    );
    h.push(SensorSnapshot::new(1).with(Metric::Moisture, 20.0));

    h.engine.start();
    assert!(h.engine.is_scheduler_running());
    assert!(!h.engine.start_scheduler());

    // First sweep fires immediately
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.gateway.output(10), Some(true));
    assert!(h.engine.get_status(1).await.unwrap().automation_active);

    h.engine.restart_scheduler().await;
    assert!(h.engine.is_scheduler_running());

    assert!(h.engine.stop_scheduler().await);
    assert!(!h.engine.is_scheduler_running());
    assert!(!h.engine.stop_scheduler().await);
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = AutomationEngine::new(
        EngineConfig {
            tick_interval_secs: 0,
            ..EngineConfig::default()
        },
        Collaborators {
            sensors: Arc::new(LatestReadings::new()),
            directory: Arc::new(MemoryDirectory::default()),
            store: Arc::new(MemoryStore::default()),
            gateway: Arc::new(SimulatedGateway::new()),
            alerts: Arc::new(CollectingAlerts::default()),
        },
    );
    assert!(matches!(result, Err(AutomationError::InvalidConfig(_))));
}
