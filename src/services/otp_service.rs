use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::{distributions::Uniform, Rng};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, Result};
use crate::models::events::{event_type, DomainEvent, TOPIC_AUDIT_LOGS, TOPIC_OTP_NOTIFICATIONS};
use crate::models::otp::OtpEntry;
use crate::services::challenge::{ChallengeIssued, StepUpChallenge};
use crate::services::event_bus::EventSink;

const DEFAULT_PURPOSE: &str = "transaction_approval";

/// Transient OTP store and state machine. Entries are keyed by
/// `(userId, transactionId)` and live only in process memory; a restart
/// invalidates every outstanding challenge.
pub struct OtpService {
    entries: DashMap<String, OtpEntry>,
    events: Arc<dyn EventSink>,
    expiry_seconds: i64,
    code_length: usize,
}

fn build_key(user_id: &str, transaction_id: &str) -> String {
    format!("{}:{}", user_id, transaction_id)
}

/// Uniform per-digit sampling; `Uniform` rejects out-of-range draws
/// internally, so no digit is favored.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let digit = Uniform::from(0..10u8);
    (0..length).map(|_| char::from(b'0' + rng.sample(digit))).collect()
}

impl OtpService {
    pub fn new(events: Arc<dyn EventSink>, expiry_seconds: i64, code_length: usize) -> Self {
        Self {
            entries: DashMap::new(),
            events,
            expiry_seconds,
            code_length,
        }
    }

    pub async fn issue(
        &self,
        user_id: &str,
        email: Option<&str>,
        transaction_id: &str,
        purpose: Option<&str>,
    ) -> Result<ChallengeIssued> {
        self.issue_at(user_id, email, transaction_id, purpose, Utc::now())
            .await
    }

    pub async fn validate(&self, user_id: &str, transaction_id: &str, code: &str) -> Result<()> {
        self.validate_at(user_id, transaction_id, code, Utc::now())
            .await
    }

    pub(crate) async fn issue_at(
        &self,
        user_id: &str,
        email: Option<&str>,
        transaction_id: &str,
        purpose: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ChallengeIssued> {
        if user_id.trim().is_empty() {
            return Err(AppError::invalid_data("UserId is required."));
        }
        if transaction_id.trim().is_empty() {
            return Err(AppError::invalid_data("TransactionId is required."));
        }
        let purpose = match purpose {
            Some(p) if !p.trim().is_empty() => p,
            _ => DEFAULT_PURPOSE,
        };

        let code = generate_code(self.code_length);
        let expires_at = now + Duration::seconds(self.expiry_seconds);

        let entry = OtpEntry {
            code: code.clone(),
            expires_at,
            purpose: purpose.to_string(),
        };

        // Overwrite semantics: any previous code for this key is dead now.
        self.entries.insert(build_key(user_id, transaction_id), entry);

        let sent_by_email = match email {
            Some(email) if !email.trim().is_empty() => {
                // The notification stream is the delivery path for the code;
                // unlike audit events, a failure here must reach the caller.
                let event =
                    DomainEvent::otp_generated(user_id, email, transaction_id, &code, expires_at);
                self.events.publish(TOPIC_OTP_NOTIFICATIONS, &event).await?;
                true
            }
            _ => false,
        };

        Ok(ChallengeIssued {
            transaction_id: transaction_id.to_string(),
            expires_in_seconds: self.expiry_seconds,
            expires_at,
            sent_by_email,
        })
    }

    pub(crate) async fn validate_at(
        &self,
        user_id: &str,
        transaction_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = build_key(user_id, transaction_id);

        let entry = match self.entries.get(&key).map(|e| e.value().clone()) {
            Some(entry) => entry,
            None => {
                self.audit(user_id, transaction_id, event_type::OTP_FAILED_NOT_FOUND)
                    .await;
                return Err(AppError::not_found("OTP not found or expired."));
            }
        };

        if now > entry.expires_at {
            // Lazy cleanup; the predicate re-checks in case a fresh entry
            // replaced this one in the meantime.
            self.entries.remove_if(&key, |_, e| now > e.expires_at);
            self.audit(user_id, transaction_id, event_type::OTP_FAILED_EXPIRED)
                .await;
            return Err(AppError::OtpExpired);
        }

        if !code_matches(&entry.code, code) {
            // Entry stays; the user may retry until expiry. No attempt
            // counter, no lockout.
            self.audit(user_id, transaction_id, event_type::OTP_FAILED_INVALID_CODE)
                .await;
            return Err(AppError::OtpInvalid);
        }

        // Single use: only one of any concurrent matching validations can
        // take the entry out of the map.
        if self
            .entries
            .remove_if(&key, |_, e| code_matches(&e.code, code))
            .is_none()
        {
            self.audit(user_id, transaction_id, event_type::OTP_FAILED_NOT_FOUND)
                .await;
            return Err(AppError::not_found("OTP not found or expired."));
        }

        self.audit(user_id, transaction_id, event_type::OTP_SUCCESS)
            .await;
        Ok(())
    }

    /// Audit emission must never fail a validation outcome.
    async fn audit(&self, user_id: &str, transaction_id: &str, status: &str) {
        let event = DomainEvent::otp_validated(user_id, transaction_id, status);
        if let Err(e) = self.events.publish(TOPIC_AUDIT_LOGS, &event).await {
            tracing::warn!("failed to publish {} audit event: {}", status, e);
        }
    }
}

fn code_matches(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[async_trait]
impl StepUpChallenge for OtpService {
    async fn issue(
        &self,
        user_id: &str,
        email: Option<&str>,
        transaction_id: &str,
        purpose: &str,
    ) -> Result<ChallengeIssued> {
        OtpService::issue(self, user_id, email, transaction_id, Some(purpose)).await
    }

    async fn verify(&self, user_id: &str, transaction_id: &str, code: &str) -> Result<()> {
        self.validate(user_id, transaction_id, code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every publish instead of touching Redis.
    struct RecordingSink {
        events: Mutex<Vec<(String, DomainEvent)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn event_types(&self, topic: &str) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, e)| e.event_type.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((topic.to_string(), event.clone()));
            Ok(())
        }
    }

    fn service(sink: &Arc<RecordingSink>) -> OtpService {
        OtpService::new(sink.clone(), 120, 6)
    }

    #[test]
    fn generated_codes_are_fixed_length_digits() {
        for _ in 0..50 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(generate_code(8).len(), 8);
    }

    #[tokio::test]
    async fn issue_requires_user_and_transaction() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        assert!(matches!(
            otp.issue("", None, "txn", None).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            otp.issue("u1", None, "  ", None).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn correct_code_validates_exactly_once() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        let issued = otp.issue("u1", None, "txn-1", Some("iban_update")).await.unwrap();
        assert!(!issued.sent_by_email);

        let code = otp.entries.get("u1:txn-1").unwrap().code.clone();
        assert!(otp.validate("u1", "txn-1", &code).await.is_ok());

        // Consumed on success; the same code is now unknown.
        assert!(matches!(
            otp.validate("u1", "txn-1", &code).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(
            sink.event_types(TOPIC_AUDIT_LOGS),
            vec!["SUCCESS", "FAILED_NOT_FOUND"]
        );
    }

    #[tokio::test]
    async fn expired_entry_is_rejected_and_removed() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        let now = Utc::now();
        otp.issue_at("u1", None, "txn-1", None, now).await.unwrap();
        let code = otp.entries.get("u1:txn-1").unwrap().code.clone();

        // 130s later: past the 120s window, even with the right code.
        let later = now + Duration::seconds(130);
        assert!(matches!(
            otp.validate_at("u1", "txn-1", &code, later).await,
            Err(AppError::OtpExpired)
        ));

        // The expired entry was cleaned up on that access.
        assert!(otp.entries.get("u1:txn-1").is_none());
        assert!(matches!(
            otp.validate_at("u1", "txn-1", &code, later).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(
            sink.event_types(TOPIC_AUDIT_LOGS),
            vec!["FAILED_EXPIRED", "FAILED_NOT_FOUND"]
        );
    }

    #[tokio::test]
    async fn wrong_code_leaves_entry_retryable() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        otp.issue("u1", None, "txn-1", None).await.unwrap();
        let code = otp.entries.get("u1:txn-1").unwrap().code.clone();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(matches!(
                otp.validate("u1", "txn-1", wrong).await,
                Err(AppError::OtpInvalid)
            ));
        }

        // Still valid after three misses.
        assert!(otp.validate("u1", "txn-1", &code).await.is_ok());

        assert_eq!(
            sink.event_types(TOPIC_AUDIT_LOGS),
            vec![
                "FAILED_INVALID_CODE",
                "FAILED_INVALID_CODE",
                "FAILED_INVALID_CODE",
                "SUCCESS"
            ]
        );
    }

    #[tokio::test]
    async fn reissue_overwrites_previous_code() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        otp.issue("u1", None, "txn-1", None).await.unwrap();
        let first = otp.entries.get("u1:txn-1").unwrap().code.clone();

        otp.issue("u1", None, "txn-1", None).await.unwrap();
        let second = otp.entries.get("u1:txn-1").unwrap().code.clone();

        if first != second {
            assert!(matches!(
                otp.validate("u1", "txn-1", &first).await,
                Err(AppError::OtpInvalid)
            ));
        }
        assert!(otp.validate("u1", "txn-1", &second).await.is_ok());
    }

    #[tokio::test]
    async fn issue_with_email_publishes_code_for_delivery() {
        let sink = RecordingSink::new();
        let otp = service(&sink);

        let issued = otp
            .issue("u1", Some("u1@example.com"), "txn-1", None)
            .await
            .unwrap();
        assert!(issued.sent_by_email);
        assert_eq!(issued.expires_in_seconds, 120);

        let events = sink.events.lock().unwrap();
        let (topic, event) = &events[0];
        assert_eq!(topic, TOPIC_OTP_NOTIFICATIONS);
        assert_eq!(event.event_type, "OtpGenerated");
        assert_eq!(event.code, Some(otp.entries.get("u1:txn-1").unwrap().code.clone()));
        // Nothing ever goes to the audit stream on issue.
        assert!(events.iter().all(|(t, _)| t != TOPIC_AUDIT_LOGS));
    }
}
