//! Core automation engine

use crate::config::EngineConfig;
use crate::error::AutomationError;
use crate::executor::ActuatorExecutor;
use crate::model::{
    ActuatorState, ActuatorStatus, DeviceStatus, DispatchOutcome, EmergencyStopReport, TickReport,
};
use crate::rules;
use crate::scheduler::{DeviceTicker, Scheduler};
use crate::state::StateManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hydro_core::{
    ActuatorGateway, ActuatorId, AlertSink, Device, DeviceDirectory, DeviceId, SensorSnapshot,
    SensorSource, SnapshotStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted by the automation engine
#[derive(Debug, Clone)]
pub enum AutomationEvent {
    /// An actuator's recorded state changed
    StateChanged {
        device_id: DeviceId,
        actuator_id: ActuatorId,
        state: ActuatorState,
    },
    /// A device tick finished
    TickCompleted { report: TickReport },
    /// A device tick did not evaluate
    TickSkipped { device_id: DeviceId, reason: String },
    /// The recurring scheduler started
    SchedulerStarted,
    /// The recurring scheduler stopped
    SchedulerStopped,
}

/// External collaborators the engine is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub sensors: Arc<dyn SensorSource>,
    pub directory: Arc<dyn DeviceDirectory>,
    pub store: Arc<dyn SnapshotStore>,
    pub gateway: Arc<dyn ActuatorGateway>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Last observations for a device
#[derive(Debug, Clone, Default)]
struct DeviceRuntime {
    last_reading: Option<SensorSnapshot>,
    last_run_at: Option<DateTime<Utc>>,
}

/// The main automation engine
pub struct AutomationEngine {
    config: EngineConfig,
    sensors: Arc<dyn SensorSource>,
    directory: Arc<dyn DeviceDirectory>,
    store: Arc<dyn SnapshotStore>,
    alerts: Arc<dyn AlertSink>,
    /// Authoritative actuator state
    state: Arc<StateManager>,
    /// Gateway dispatch and commit
    executor: ActuatorExecutor,
    /// Recurring tick driver
    scheduler: Arc<Scheduler>,
    /// Per-device last reading and run time
    runtime: DashMap<DeviceId, DeviceRuntime>,
    /// Event broadcaster
    event_tx: broadcast::Sender<AutomationEvent>,
}

impl AutomationEngine {
    /// Create a new automation engine
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, AutomationError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(256);
        let state = Arc::new(StateManager::new());
        let executor = ActuatorExecutor::new(
            Arc::clone(&state),
            collaborators.gateway,
            Arc::clone(&collaborators.store),
            config.manual_hold(),
            event_tx.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(config.tick_interval()));

        Ok(Self {
            config,
            sensors: collaborators.sensors,
            directory: collaborators.directory,
            store: collaborators.store,
            alerts: collaborators.alerts,
            state,
            executor,
            scheduler,
            runtime: DashMap::new(),
            event_tx,
        })
    }

    /// Start the engine (scheduler too when autostart is set)
    pub fn start(self: &Arc<Self>) {
        if self.config.autostart {
            self.start_scheduler();
        } else {
            tracing::info!("Automation scheduler not started (autostart disabled)");
        }
    }

    /// Subscribe to automation events
    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the state manager
    #[must_use]
    pub fn state(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    /// Start the recurring scheduler; false if already running
    pub fn start_scheduler(self: &Arc<Self>) -> bool {
        let ticker: Arc<dyn DeviceTicker> = Arc::clone(self) as Arc<dyn DeviceTicker>;
        let started = self.scheduler.start(ticker);
        if started {
            let _ = self.event_tx.send(AutomationEvent::SchedulerStarted);
        }
        started
    }

    /// Stop the scheduler, letting in-flight ticks finish dispatching
    pub async fn stop_scheduler(&self) -> bool {
        let stopped = self.scheduler.stop().await;
        if stopped {
            let _ = self.event_tx.send(AutomationEvent::SchedulerStopped);
        }
        stopped
    }

    /// Stop then start the scheduler
    pub async fn restart_scheduler(self: &Arc<Self>) {
        self.stop_scheduler().await;
        self.start_scheduler();
        tracing::info!("Scheduler restarted");
    }

    #[must_use]
    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one sweep over every active device now
    pub async fn run_once(self: &Arc<Self>) {
        let ticker: Arc<dyn DeviceTicker> = Arc::clone(self) as Arc<dyn DeviceTicker>;
        self.scheduler.run_once(ticker).await;
    }

    /// Execute one tick for a device
    pub async fn tick(&self, device: &Device) -> Result<TickReport, AutomationError> {
        let mut report = TickReport {
            device_id: device.id,
            ..TickReport::default()
        };

        if !device.active {
            tracing::debug!("Device {} inactive, skipping tick", device.display_name());
            report.skipped = Some("device inactive".to_string());
            return Ok(report);
        }

        let Some(snapshot) = self.sensors.read_latest(device.id).await? else {
            tracing::warn!(
                "No sensor snapshot for {}, skipping tick",
                device.display_name()
            );
            return Ok(self.skip(report, "no sensor snapshot"));
        };

        // Only act on readings newer than the last evaluated one
        let last_seen = self
            .runtime
            .get(&device.id)
            .and_then(|r| r.last_reading.as_ref().map(|s| s.timestamp));
        if last_seen.is_some_and(|seen| snapshot.timestamp <= seen) {
            tracing::debug!(
                "No new reading for {} since {}, skipping tick",
                device.display_name(),
                snapshot.timestamp
            );
            return Ok(self.skip(report, "no new sensor snapshot"));
        }

        if let Err(e) = self.store.save_snapshot(&snapshot).await {
            tracing::warn!("Failed to save snapshot for device {}: {}", device.id, e);
        }

        let actuators = self.directory.list_actuators(device.id).await?;
        let thresholds = self.config.thresholds.resolve(device.thresholds.as_ref());
        let evaluation = rules::evaluate(&snapshot, &thresholds, &actuators);
        report.decisions = evaluation.decisions.len();

        let by_id: HashMap<ActuatorId, _> = actuators.iter().map(|a| (a.id, a)).collect();
        let mut alerts = evaluation.alerts;

        for decision in &evaluation.decisions {
            let Some(actuator) = by_id.get(&decision.actuator_id) else {
                continue;
            };
            match self.executor.apply_decision(actuator, decision).await {
                DispatchOutcome::Unchanged => {}
                DispatchOutcome::HeldByManual => report.held.push(actuator.id),
                DispatchOutcome::Switched(_) => report.switched.push(actuator.id),
                DispatchOutcome::Failed(alert) => {
                    report.failed.push(actuator.id);
                    alerts.push(alert);
                }
            }
        }

        report.alerts = alerts.len();
        for alert in alerts {
            self.alerts.publish(alert).await;
        }

        self.runtime.insert(
            device.id,
            DeviceRuntime {
                last_reading: Some(snapshot),
                last_run_at: Some(Utc::now()),
            },
        );

        tracing::debug!(
            "Tick for {}: {} decisions, {} switched, {} held, {} failed",
            device.display_name(),
            report.decisions,
            report.switched.len(),
            report.held.len(),
            report.failed.len()
        );
        let _ = self.event_tx.send(AutomationEvent::TickCompleted {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Report a skipped tick
    fn skip(&self, mut report: TickReport, reason: &str) -> TickReport {
        let _ = self.event_tx.send(AutomationEvent::TickSkipped {
            device_id: report.device_id,
            reason: reason.to_string(),
        });
        report.skipped = Some(reason.to_string());
        report
    }

    async fn find_device(&self, device_id: DeviceId) -> Result<Device, AutomationError> {
        self.directory
            .find_device(device_id)
            .await?
            .ok_or(AutomationError::DeviceNotFound(device_id))
    }

    /// Status of one device for the API layer
    pub async fn get_status(&self, device_id: DeviceId) -> Result<DeviceStatus, AutomationError> {
        let device = self.find_device(device_id).await?;
        let actuators = self.directory.list_actuators(device_id).await?;
        let actuator_states = actuators
            .iter()
            .map(|actuator| ActuatorStatus {
                actuator_id: actuator.id,
                kind: actuator.kind,
                name: actuator.display_name(),
                active: actuator.active,
                state: self.state.get_state(actuator),
            })
            .collect();

        let runtime = self
            .runtime
            .get(&device_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();

        Ok(DeviceStatus {
            device_id,
            name: device.display_name(),
            active: device.active,
            last_reading: runtime.last_reading,
            actuator_states,
            automation_active: self.scheduler.is_running(),
            last_run_at: runtime.last_run_at,
        })
    }

    /// Manually switch an actuator, bypassing the rules engine
    pub async fn override_actuator(
        &self,
        actuator_id: ActuatorId,
        desired_on: bool,
    ) -> Result<ActuatorState, AutomationError> {
        let actuator = self
            .directory
            .find_actuator(actuator_id)
            .await?
            .ok_or(AutomationError::ActuatorNotFound(actuator_id))?;

        self.executor
            .apply_manual(&actuator, desired_on, "manual override")
            .await
    }

    /// Turn every actuator of a device off as manual writes
    pub async fn emergency_stop(
        &self,
        device_id: DeviceId,
    ) -> Result<EmergencyStopReport, AutomationError> {
        let device = self.find_device(device_id).await?;
        tracing::warn!(
            "EMERGENCY STOP for {} - turning off all actuators",
            device.display_name()
        );

        let actuators = self.directory.list_actuators(device_id).await?;
        let mut report = EmergencyStopReport {
            device_id,
            ..EmergencyStopReport::default()
        };

        for actuator in &actuators {
            match self
                .executor
                .apply_manual(actuator, false, "emergency stop")
                .await
            {
                Ok(_) => report.stopped.push(actuator.id),
                Err(e) => {
                    tracing::warn!("Failed to stop actuator {}: {}", actuator.id, e);
                    report.failed.push((actuator.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Drop state for an actuator deleted from the directory
    pub fn forget_actuator(&self, actuator_id: ActuatorId) -> Option<ActuatorState> {
        let removed = self.state.remove(actuator_id);
        if removed.is_some() {
            tracing::info!("Forgot state for deleted actuator {}", actuator_id);
        }
        removed
    }
}

#[async_trait]
impl DeviceTicker for AutomationEngine {
    async fn due_devices(&self) -> Vec<Device> {
        match self.directory.list_active_devices().await {
            Ok(devices) => devices.into_iter().filter(|d| d.active).collect(),
            Err(e) => {
                tracing::error!("Failed to list active devices: {}", e);
                Vec::new()
            }
        }
    }

    async fn tick(&self, device: Device) {
        if let Err(e) = AutomationEngine::tick(self, &device).await {
            tracing::error!("Tick for device {} failed: {}", device.id, e);
        }
    }
}
