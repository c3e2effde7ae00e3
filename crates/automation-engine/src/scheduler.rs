//! Recurring per-device tick driver
//!
//! Every interval the scheduler sweeps the active devices and spawns one
//! tick task per device. A device whose previous tick is still running is
//! skipped for that sweep, so ticks for one device never overlap while
//! ticks for different devices run in parallel.
//!
//! Stopping cancels the sweep loop and then waits for in-flight ticks,
//! which are never cancelled mid-dispatch.

use async_trait::async_trait;
use dashmap::DashMap;
use hydro_core::{Device, DeviceId};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Work the scheduler drives
#[async_trait]
pub trait DeviceTicker: Send + Sync + 'static {
    /// Devices to tick in this sweep
    async fn due_devices(&self) -> Vec<Device>;

    /// Run one tick for a device
    async fn tick(&self, device: Device);
}

/// Handles of a running sweep loop
struct RunHandle {
    token: CancellationToken,
    tracker: TaskTracker,
    sweep: JoinHandle<()>,
}

/// Scheduler for recurring device ticks
pub struct Scheduler {
    interval: Duration,
    /// Per-device serialization keys
    device_locks: DashMap<DeviceId, Arc<Mutex<()>>>,
    running: StdMutex<Option<RunHandle>>,
}

impl Scheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            device_locks: DashMap::new(),
            running: StdMutex::new(None),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the sweep loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// Start the sweep loop; returns false if it was already running
    pub fn start(self: &Arc<Self>, ticker: Arc<dyn DeviceTicker>) -> bool {
        let Ok(mut running) = self.running.lock() else {
            tracing::error!("Scheduler state poisoned, refusing to start");
            return false;
        };
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        // Weak so dropping the last handle cancels the loop
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;
        let sweep = {
            let token = token.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            let Some(scheduler) = scheduler.upgrade() else {
                                break;
                            };
                            scheduler.sweep(&ticker, &tracker, &token).await;
                        }
                    }
                }
                tracing::debug!("Scheduler sweep loop exited");
            })
        };

        *running = Some(RunHandle {
            token,
            tracker,
            sweep,
        });
        tracing::info!("Scheduled device ticks every {:?}", self.interval);
        true
    }

    /// Stop the sweep loop and wait for in-flight ticks to finish
    pub async fn stop(&self) -> bool {
        let handle = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(RunHandle {
            token,
            tracker,
            sweep,
        }) = handle
        else {
            return false;
        };

        token.cancel();
        if let Err(e) = sweep.await {
            tracing::warn!("Scheduler sweep task ended abnormally: {}", e);
        }
        tracker.close();
        let in_flight = tracker.len();
        if in_flight > 0 {
            tracing::info!("Waiting for {} in-flight ticks to finish", in_flight);
        }
        tracker.wait().await;

        tracing::info!("Scheduler stopped");
        true
    }

    /// Run a single sweep immediately and wait for it to complete
    pub async fn run_once(&self, ticker: Arc<dyn DeviceTicker>) {
        let tracker = TaskTracker::new();
        self.sweep(&ticker, &tracker, &CancellationToken::new())
            .await;
        tracker.close();
        tracker.wait().await;
    }

    /// Spawn one tick per due device that is not already ticking
    async fn sweep(
        &self,
        ticker: &Arc<dyn DeviceTicker>,
        tracker: &TaskTracker,
        token: &CancellationToken,
    ) {
        let devices = ticker.due_devices().await;
        tracing::debug!("Sweeping {} devices", devices.len());

        for device in devices {
            if token.is_cancelled() {
                break;
            }
            if !device.active {
                continue;
            }

            let lock = self.device_lock(device.id);
            let Ok(guard) = lock.try_lock_owned() else {
                tracing::debug!(
                    "Previous tick for device {} still running, skipping",
                    device.id
                );
                continue;
            };

            let ticker = Arc::clone(ticker);
            tracker.spawn(async move {
                let _guard = guard;
                ticker.tick(device).await;
            });
        }
    }

    fn device_lock(&self, device_id: DeviceId) -> Arc<Mutex<()>> {
        self.device_locks.entry(device_id).or_default().clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(handle) = running.take() {
                handle.token.cancel();
            }
        }
    }
}
