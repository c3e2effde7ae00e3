//! File-backed directory and history storage

use crate::device::{Actuator, ActuatorId, Device, DeviceId};
use crate::error::CoreError;
use crate::log::{ActionLogEntry, ActionLogFilter};
use crate::ports::{DeviceDirectory, SnapshotStore};
use crate::sensor::SensorSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// On-disk shape of the device directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub actuators: Vec<Actuator>,
}

/// Load the directory from a JSON file
pub async fn load_directory(path: &Path) -> DirectoryFile {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<DirectoryFile>(&contents) {
            Ok(directory) => {
                tracing::debug!(
                    "Loaded {} devices and {} actuators from {:?}",
                    directory.devices.len(),
                    directory.actuators.len(),
                    path
                );
                directory
            }
            Err(e) => {
                tracing::warn!("Failed to parse directory file {:?}: {}", path, e);
                DirectoryFile::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No directory file found at {:?}, treating as empty", path);
            DirectoryFile::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read directory file {:?}: {}", path, e);
            DirectoryFile::default()
        }
    }
}

/// Device directory re-read from disk on every call
pub struct JsonDirectory {
    path: PathBuf,
}

impl JsonDirectory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeviceDirectory for JsonDirectory {
    async fn list_active_devices(&self) -> Result<Vec<Device>, CoreError> {
        let directory = load_directory(&self.path).await;
        Ok(directory.devices.into_iter().filter(|d| d.active).collect())
    }

    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, CoreError> {
        let directory = load_directory(&self.path).await;
        Ok(directory.devices.into_iter().find(|d| d.id == device_id))
    }

    async fn list_actuators(&self, device_id: DeviceId) -> Result<Vec<Actuator>, CoreError> {
        let directory = load_directory(&self.path).await;
        Ok(directory
            .actuators
            .into_iter()
            .filter(|a| a.device_id == device_id)
            .collect())
    }

    async fn find_actuator(&self, actuator_id: ActuatorId) -> Result<Option<Actuator>, CoreError> {
        let directory = load_directory(&self.path).await;
        Ok(directory.actuators.into_iter().find(|a| a.id == actuator_id))
    }
}

/// Append-only JSON-lines history of snapshots and actuator actions
pub struct JsonLinesStore {
    snapshots_path: PathBuf,
    actions_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    /// Store writing `snapshots.jsonl` and `actions.jsonl` under `data_dir`
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            snapshots_path: data_dir.join("snapshots.jsonl"),
            actions_path: data_dir.join("actions.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    async fn append<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), CoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl JsonLinesStore {
    /// Action log entries matching a filter, oldest first
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub async fn action_logs(
        &self,
        filter: &ActionLogFilter,
    ) -> Result<Vec<ActionLogEntry>, CoreError> {
        let contents = {
            let _guard = self.write_lock.lock().await;
            match fs::read_to_string(&self.actions_path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let mut entries = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActionLogEntry>(line) {
                Ok(entry) if filter.matches(&entry) => entries.push(entry),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    "Skipping malformed action log line {} in {:?}: {}",
                    number + 1,
                    self.actions_path,
                    e
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl SnapshotStore for JsonLinesStore {
    async fn save_snapshot(&self, snapshot: &SensorSnapshot) -> Result<(), CoreError> {
        self.append(&self.snapshots_path, snapshot).await
    }

    async fn save_action_log(&self, entry: &ActionLogEntry) -> Result<(), CoreError> {
        self.append(&self.actions_path, entry).await
    }
}
