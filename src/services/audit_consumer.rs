use chrono::{DateTime, Utc};
use mongodb::{Collection, Database};
use redis::aio::ConnectionManager;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::models::audit::AuditRecord;
use crate::models::events::{event_type, TOPIC_AUDIT_LOGS};
use crate::services::event_bus::read_stream;

const BLOCK_MS: u64 = 500;

/// Standing consumer of the audit stream. Classifies each envelope into a
/// human-readable record and appends it to `audit_history`. Malformed
/// payloads are skipped, duplicates are persisted as-is.
pub struct AuditConsumer {
    client: redis::Client,
    db: Database,
}

impl AuditConsumer {
    pub fn new(client: redis::Client, db: Database) -> Self {
        Self { client, db }
    }

    fn audit(&self) -> Collection<AuditRecord> {
        self.db.collection("audit_history")
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("audit consumer listening on '{}'", TOPIC_AUDIT_LOGS);

        // Replay from the start of the stream, like a fresh earliest-offset
        // consumer. The cursor survives reconnects within this process.
        let mut last_id = "0".to_string();

        'outer: while !shutdown.is_cancelled() {
            let mut conn = match ConnectionManager::new(self.client.clone()).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("audit consumer cannot reach redis: {}", e);
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
                            if let Err(e) = self.process(&payload).await {
                                tracing::warn!("skipping audit event: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("audit consumer read failed: {}", e);
                        continue 'outer;
                    }
                }
            }
        }

        tracing::info!("audit consumer stopped");
    }

    async fn process(&self, payload: &str) -> Result<()> {
        let root: Value = serde_json::from_str(payload)?;

        let event_type = root
            .get("EventType")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN");
        let user_id = root
            .get("UserId")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let timestamp = root
            .get("Timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let record = AuditRecord {
            id: None,
            user_id: user_id.to_string(),
            action: event_type.to_string(),
            details: classify(event_type, &root),
            timestamp: mongodb::bson::DateTime::from_chrono(timestamp),
        };

        self.audit().insert_one(&record).await?;
        tracing::debug!("saved audit log for {}: {}", record.user_id, record.action);
        Ok(())
    }
}

/// Fixed table turning an event type into the human-readable details line.
/// Unknown types still get a record so nothing silently disappears.
pub fn classify(event_type: &str, event: &Value) -> String {
    let field = |key: &str| event.get(key).and_then(|v| v.as_str());

    match event_type {
        event_type::IBAN_UPDATED => {
            format!("Changed IBAN to {}", field("NewIban").unwrap_or("Unknown"))
        }
        event_type::IBAN_UPDATE_FAILED => field("Details")
            .unwrap_or("Update failed/expired")
            .to_string(),
        event_type::USER_LOGIN => "User logged into the system.".to_string(),
        event_type::PAYROLL_EXPORT => "Exported full payroll history (Excel).".to_string(),
        event_type::PAYSLIP_DOWNLOAD => {
            format!("Downloaded payslip: {}", field("Reference").unwrap_or("N/A"))
        }
        event_type::FRAUD_DETECTED => field("Details")
            .unwrap_or("Suspicious activity detected.")
            .to_string(),
        event_type::OTP_SUCCESS => "OTP verified successfully.".to_string(),
        event_type::OTP_FAILED_NOT_FOUND => {
            "OTP validation failed: no active challenge.".to_string()
        }
        event_type::OTP_FAILED_EXPIRED => "OTP validation failed: code expired.".to_string(),
        event_type::OTP_FAILED_INVALID_CODE => {
            "OTP validation failed: invalid code.".to_string()
        }
        _ => "UNKNOWN".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn iban_updated_includes_the_new_value() {
        let event = json!({ "EventType": "IBAN_UPDATED", "NewIban": "RO49AAAA1B31007593840000" });
        assert_eq!(
            classify("IBAN_UPDATED", &event),
            "Changed IBAN to RO49AAAA1B31007593840000"
        );
        assert_eq!(classify("IBAN_UPDATED", &json!({})), "Changed IBAN to Unknown");
    }

    #[test]
    fn abandoned_update_prefers_the_event_details() {
        let event = json!({ "Details": "Transaction expired or abandoned by user." });
        assert_eq!(
            classify("IBAN_UPDATE_FAILED", &event),
            "Transaction expired or abandoned by user."
        );
        assert_eq!(classify("IBAN_UPDATE_FAILED", &json!({})), "Update failed/expired");
    }

    #[test]
    fn fixed_entries_and_unknown_fallback() {
        assert_eq!(classify("USER_LOGIN", &json!({})), "User logged into the system.");
        assert_eq!(
            classify("PAYSLIP_DOWNLOAD", &json!({ "Reference": "PS-2024-07" })),
            "Downloaded payslip: PS-2024-07"
        );
        assert_eq!(
            classify("FAILED_INVALID_CODE", &json!({})),
            "OTP validation failed: invalid code."
        );
        assert_eq!(classify("SOMETHING_ELSE", &json!({})), "UNKNOWN");
    }
}
