use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::events::FraudAlert;

/// Registry of open real-time sessions and the fan-out over them. Sessions
/// are ephemeral: registered on upgrade, removed on close or read error.
pub struct FraudAlertService {
    sessions: DashMap<Uuid, UnboundedSender<Message>>,
}

impl Default for FraudAlertService {
    fn default() -> Self {
        Self::new()
    }
}

impl FraudAlertService {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register(&self, sender: UnboundedSender<Message>) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.sessions.insert(connection_id, sender);
        tracing::debug!(
            "fraud session {} connected ({} open)",
            connection_id,
            self.sessions.len()
        );
        connection_id
    }

    pub fn deregister(&self, connection_id: &Uuid) {
        if self.sessions.remove(connection_id).is_some() {
            tracing::debug!(
                "fraud session {} disconnected ({} open)",
                connection_id,
                self.sessions.len()
            );
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Deliver one alert to every open session. Serialized once; a failed
    /// send on one session never affects the others. Returns how many
    /// sessions accepted the message.
    pub fn broadcast(&self, alert: &FraudAlert) -> usize {
        let json = match serde_json::to_string(alert) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize fraud alert: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for session in self.sessions.iter() {
            if session.value().send(Message::Text(json.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn alert() -> FraudAlert {
        FraudAlert {
            event_type: "FRAUD_DETECTED".to_string(),
            user_id: "u1".to_string(),
            details: "Suspicious IBAN detected".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_open_session() {
        let service = FraudAlertService::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        service.register(tx1);
        service.register(tx2);
        service.register(tx3);

        assert_eq!(service.broadcast(&alert()), 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let Some(Message::Text(json)) = rx.recv().await else {
                panic!("expected a text frame");
            };
            let parsed: FraudAlert = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.event_type, "FRAUD_DETECTED");
            assert_eq!(parsed.user_id, "u1");
        }
    }

    #[tokio::test]
    async fn dead_session_does_not_block_the_rest() {
        let service = FraudAlertService::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        service.register(tx1);
        service.register(tx2);
        service.register(tx3);

        // One session dies without deregistering.
        drop(rx2);

        assert_eq!(service.broadcast(&alert()), 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx3.recv().await.is_some());
    }

    #[tokio::test]
    async fn deregistered_session_receives_nothing() {
        let service = FraudAlertService::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let id1 = service.register(tx1);
        assert_eq!(service.session_count(), 1);

        service.deregister(&id1);
        assert_eq!(service.session_count(), 0);
        assert_eq!(service.broadcast(&alert()), 0);
        assert!(rx1.try_recv().is_err());
    }
}
