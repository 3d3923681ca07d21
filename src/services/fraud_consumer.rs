use std::sync::Arc;

use redis::aio::ConnectionManager;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::models::events::{event_type, FraudAlert, TOPIC_AUDIT_LOGS};
use crate::services::event_bus::read_stream;
use crate::services::fraud_service::FraudAlertService;

const BLOCK_MS: u64 = 500;

/// Filters the audit stream down to fraud signals and forwards them to the
/// broadcaster. Starts at the stream tail: clients that reconnect after a
/// missed alert use the polling fallback instead of a replay.
pub struct FraudConsumer {
    client: redis::Client,
    fraud: Arc<FraudAlertService>,
}

impl FraudConsumer {
    pub fn new(client: redis::Client, fraud: Arc<FraudAlertService>) -> Self {
        Self { client, fraud }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("fraud consumer listening on '{}'", TOPIC_AUDIT_LOGS);

        let mut last_id = "$".to_string();

        'outer: while !shutdown.is_cancelled() {
            let mut conn = match ConnectionManager::new(self.client.clone()).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("fraud consumer cannot reach redis: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'outer,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => continue 'outer,
                    }
                }
            };

            while !shutdown.is_cancelled() {
                match read_stream(&mut conn, TOPIC_AUDIT_LOGS, &last_id, BLOCK_MS).await {
                    Ok(entries) => {
                        for (id, payload) in entries {
                            last_id = id;
                            self.handle(&payload);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("fraud consumer read failed: {}", e);
                        continue 'outer;
                    }
                }
            }
        }

        tracing::info!("fraud consumer stopped");
    }

    fn handle(&self, payload: &str) {
        let Ok(root) = serde_json::from_str::<Value>(payload) else {
            return;
        };

        let is_fraud = root
            .get("EventType")
            .and_then(|v| v.as_str())
            .map(|t| t == event_type::FRAUD_DETECTED)
            .unwrap_or(false);
        if !is_fraud {
            return;
        }

        let alert = FraudAlert::from_value(&root);
        let delivered = self.fraud.broadcast(&alert);
        tracing::info!(
            "fraud alert for {} broadcast to {} sessions",
            alert.user_id,
            delivered
        );
    }
}
