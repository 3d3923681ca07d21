use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stream carrying the durable audit trail. Consumed by the audit recorder
/// and the fraud broadcaster.
pub const TOPIC_AUDIT_LOGS: &str = "audit-logs";

/// Stream carrying generated OTP codes for out-of-band delivery. Consumed by
/// the external notification service.
pub const TOPIC_OTP_NOTIFICATIONS: &str = "otp-notifications";

pub mod event_type {
    pub const OTP_GENERATED: &str = "OtpGenerated";
    pub const OTP_SUCCESS: &str = "SUCCESS";
    pub const OTP_FAILED_NOT_FOUND: &str = "FAILED_NOT_FOUND";
    pub const OTP_FAILED_EXPIRED: &str = "FAILED_EXPIRED";
    pub const OTP_FAILED_INVALID_CODE: &str = "FAILED_INVALID_CODE";
    pub const IBAN_UPDATED: &str = "IBAN_UPDATED";
    pub const IBAN_UPDATE_FAILED: &str = "IBAN_UPDATE_FAILED";
    pub const USER_LOGIN: &str = "USER_LOGIN";
    pub const PAYROLL_EXPORT: &str = "PAYROLL_EXPORT";
    pub const PAYSLIP_DOWNLOAD: &str = "PAYSLIP_DOWNLOAD";
    pub const FRAUD_DETECTED: &str = "FRAUD_DETECTED";
}

/// Envelope published to the event streams. Field names are PascalCase on
/// the wire; optional fields are omitted entirely so consumers can stay
/// forwards-compatible and ignore what they don't know.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainEvent {
    pub event_type: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    fn base(event_type: &str, user_id: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            transaction_id: None,
            email: None,
            code: None,
            expiry: None,
            new_iban: None,
            details: None,
            reference: None,
            timestamp: Utc::now(),
        }
    }

    /// Code delivery event. The only place the raw code ever leaves the
    /// OTP store.
    pub fn otp_generated(
        user_id: &str,
        email: &str,
        transaction_id: &str,
        code: &str,
        expiry: DateTime<Utc>,
    ) -> Self {
        let mut ev = Self::base(event_type::OTP_GENERATED, user_id);
        ev.transaction_id = Some(transaction_id.to_string());
        ev.email = Some(email.to_string());
        ev.code = Some(code.to_string());
        ev.expiry = Some(expiry);
        ev
    }

    /// Validation outcome (`SUCCESS` / `FAILED_*`).
    pub fn otp_validated(user_id: &str, transaction_id: &str, status: &str) -> Self {
        let mut ev = Self::base(status, user_id);
        ev.transaction_id = Some(transaction_id.to_string());
        ev
    }

    pub fn iban_updated(user_id: &str, transaction_id: &str, new_iban: &str) -> Self {
        let mut ev = Self::base(event_type::IBAN_UPDATED, user_id);
        ev.transaction_id = Some(transaction_id.to_string());
        ev.new_iban = Some(new_iban.to_string());
        ev
    }

    /// Abandoned-update signal published by the sweeper. Carries the
    /// original creation time, not the sweep time.
    pub fn update_abandoned(user_id: &str, transaction_id: &str, created_at: DateTime<Utc>) -> Self {
        let mut ev = Self::base(event_type::IBAN_UPDATE_FAILED, user_id);
        ev.transaction_id = Some(transaction_id.to_string());
        ev.details = Some("Transaction expired or abandoned by user.".to_string());
        ev.timestamp = created_at;
        ev
    }

    /// Client-reported event (payslip downloads, exports, ...).
    pub fn client_event(user_id: &str, action: &str, reference: Option<&str>) -> Self {
        let mut ev = Self::base(action, user_id);
        ev.reference = reference.map(|r| r.to_string());
        ev
    }
}

/// Message pushed to connected WebSocket sessions when a fraud signal is
/// observed on the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FraudAlert {
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    /// Lenient extraction from a raw envelope. Missing fields get defaults
    /// rather than failing the consumer loop.
    pub fn from_value(root: &Value) -> Self {
        let text = |key: &str| {
            root.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let timestamp = root
            .get("Timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            event_type: text("EventType"),
            user_id: text("UserId"),
            details: text("Details"),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_pascal_case_and_omits_empty_fields() {
        let ev = DomainEvent::otp_validated("u1", "txn-1", event_type::OTP_SUCCESS);
        let value: Value = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();

        assert_eq!(value["EventType"], "SUCCESS");
        assert_eq!(value["UserId"], "u1");
        assert_eq!(value["TransactionId"], "txn-1");
        assert!(value.get("Code").is_none());
        assert!(value.get("NewIban").is_none());
        assert!(value.get("Timestamp").is_some());
    }

    #[test]
    fn otp_generated_carries_the_code() {
        let ev = DomainEvent::otp_generated("u1", "u1@example.com", "txn-1", "123456", Utc::now());
        let value: Value = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();

        assert_eq!(value["EventType"], "OtpGenerated");
        assert_eq!(value["Code"], "123456");
        assert_eq!(value["Email"], "u1@example.com");
    }

    #[test]
    fn fraud_alert_parses_leniently() {
        let alert = FraudAlert::from_value(&json!({
            "EventType": "FRAUD_DETECTED",
            "UserId": "u1",
            "SomethingNew": 42,
        }));

        assert_eq!(alert.event_type, "FRAUD_DETECTED");
        assert_eq!(alert.user_id, "u1");
        assert_eq!(alert.details, "");
    }
}
