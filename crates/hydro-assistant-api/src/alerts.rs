//! Alert fan-out to the log and WebSocket clients

use async_trait::async_trait;
use hydro_core::simulation::LogAlertSink;
use hydro_core::{Alert, AlertSink};
use tokio::sync::broadcast;

/// Logs every alert and rebroadcasts it to subscribers
pub struct BroadcastAlertSink {
    log: LogAlertSink,
    tx: broadcast::Sender<Alert>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            log: LogAlertSink,
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl AlertSink for BroadcastAlertSink {
    async fn publish(&self, alert: Alert) {
        // No subscribers is fine
        let _ = self.tx.send(alert.clone());
        self.log.publish(alert).await;
    }
}
