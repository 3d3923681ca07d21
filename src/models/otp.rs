use chrono::{DateTime, Utc};

/// A live OTP challenge. Held only in process memory, keyed by
/// `(userId, transactionId)`; never persisted.
#[derive(Debug, Clone)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub purpose: String,
}
