use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::models::events::{DomainEvent, TOPIC_AUDIT_LOGS};
use crate::models::pending_update::PendingUpdate;
use crate::services::event_bus::EventSink;

/// Background task expiring stale staging records. Each pass publishes one
/// abandoned-update event per record it actually removed.
pub struct TransactionSweeper {
    db: Database,
    events: Arc<dyn EventSink>,
    interval: Duration,
    expiration: chrono::Duration,
}

impl TransactionSweeper {
    pub fn new(
        db: Database,
        events: Arc<dyn EventSink>,
        interval_seconds: u64,
        expiration_minutes: i64,
    ) -> Self {
        Self {
            db,
            events,
            interval: Duration::from_secs(interval_seconds),
            expiration: chrono::Duration::minutes(expiration_minutes),
        }
    }

    fn pending(&self) -> Collection<PendingUpdate> {
        self.db.collection("pending_updates")
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            "transaction sweeper running every {:?}, expiring after {} min",
            self.interval,
            self.expiration.num_minutes()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep_expired().await {
                tracing::warn!("sweep pass failed: {}", e);
            }
        }

        tracing::info!("transaction sweeper stopped");
    }

    async fn sweep_expired(&self) -> Result<()> {
        let cutoff = Utc::now() - self.expiration;
        let filter = doc! {
            "createdAt": { "$lt": mongodb::bson::DateTime::from_chrono(cutoff) }
        };

        let stale: Vec<PendingUpdate> =
            self.pending().find(filter).await?.try_collect().await?;

        if !stale.is_empty() {
            tracing::info!("found {} stale transactions", stale.len());
        }

        for txn in stale {
            let Some(id) = txn.id else { continue };

            // Atomic claim keyed by id: a record finalized between the scan
            // and this delete is gone, and must not produce an event.
            let claimed = self
                .pending()
                .find_one_and_delete(doc! { "_id": id })
                .await?;

            if let Some(txn) = claimed {
                let event = DomainEvent::update_abandoned(
                    &txn.user_id,
                    &txn.transaction_id,
                    txn.created_at.to_chrono(),
                );
                if let Err(e) = self.events.publish(TOPIC_AUDIT_LOGS, &event).await {
                    tracing::warn!("failed to publish abandoned-update event: {}", e);
                }
            }
        }

        Ok(())
    }
}
