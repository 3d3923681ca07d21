use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;

/// Metadata returned when a challenge is issued. Never contains the code
/// itself; the code travels only on the notification stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssued {
    pub transaction_id: String,
    pub expires_in_seconds: i64,
    pub expires_at: DateTime<Utc>,
    pub sent_by_email: bool,
}

/// Port through which the pending-change ledger requests step-up
/// verification. Lets the ledger be tested against a fake and keeps it
/// ignorant of whether the challenger is in-process or a remote service.
#[async_trait]
pub trait StepUpChallenge: Send + Sync {
    /// Issue (or re-issue, overwriting) a challenge for the given key.
    async fn issue(
        &self,
        user_id: &str,
        email: Option<&str>,
        transaction_id: &str,
        purpose: &str,
    ) -> Result<ChallengeIssued>;

    /// Verify a submitted code. Failures map to the error taxonomy:
    /// `NotFound`, `OtpExpired`, `OtpInvalid`.
    async fn verify(&self, user_id: &str, transaction_id: &str, code: &str) -> Result<()>;
}
