//! WebSocket handler for real-time updates

use automation_engine::{ActuatorState, AutomationEvent, TickReport};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use hydro_core::{ActuatorId, Alert, DeviceId};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    ActuatorChanged {
        device_id: DeviceId,
        actuator_id: ActuatorId,
        #[serde(flatten)]
        state: ActuatorState,
    },
    TickCompleted {
        report: TickReport,
    },
    TickSkipped {
        device_id: DeviceId,
        reason: String,
    },
    SchedulerChanged {
        running: bool,
    },
    Alert {
        alert: Alert,
    },
}

impl From<AutomationEvent> for WsEvent {
    fn from(event: AutomationEvent) -> Self {
        match event {
            AutomationEvent::StateChanged {
                device_id,
                actuator_id,
                state,
            } => WsEvent::ActuatorChanged {
                device_id,
                actuator_id,
                state,
            },
            AutomationEvent::TickCompleted { report } => WsEvent::TickCompleted { report },
            AutomationEvent::TickSkipped { device_id, reason } => {
                WsEvent::TickSkipped { device_id, reason }
            }
            AutomationEvent::SchedulerStarted => WsEvent::SchedulerChanged { running: true },
            AutomationEvent::SchedulerStopped => WsEvent::SchedulerChanged { running: false },
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    if send_event(&mut sender, &WsEvent::Connected).await.is_err() {
        return;
    }

    let mut event_rx = state.engine.subscribe();
    let mut alert_rx = state.alerts.subscribe();

    // Forward engine events and alerts until either side goes away
    let send_task = tokio::spawn(async move {
        loop {
            let ws_event = tokio::select! {
                event = event_rx.recv() => match event {
                    Ok(event) => WsEvent::from(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                alert = alert_rx.recv() => match alert {
                    Ok(alert) => WsEvent::Alert { alert },
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };

            if send_event(&mut sender, &ws_event).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}

async fn send_event<S>(sender: &mut S, event: &WsEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(event).map_err(|e| {
        tracing::warn!("Failed to serialize WebSocket event: {}", e);
    })?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
