use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::events::{DomainEvent, TOPIC_AUDIT_LOGS};
use crate::models::pending_update::PendingUpdate;
use crate::models::user::User;
use crate::services::challenge::{ChallengeIssued, StepUpChallenge};
use crate::services::event_bus::EventSink;

const IBAN_UPDATE_PURPOSE: &str = "iban_update";

/// Staging ledger for IBAN changes. A change is held in `pending_updates`
/// until the step-up challenge completes or the sweeper expires it; the
/// authoritative `users` record is only touched on a verified finalize.
pub struct ProfileService {
    db: Database,
    challenge: Arc<dyn StepUpChallenge>,
    events: Arc<dyn EventSink>,
}

impl ProfileService {
    pub fn new(db: Database, challenge: Arc<dyn StepUpChallenge>, events: Arc<dyn EventSink>) -> Self {
        Self { db, challenge, events }
    }

    fn pending(&self) -> Collection<PendingUpdate> {
        self.db.collection("pending_updates")
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    /// Stage a change and issue the challenge for it. The staging record is
    /// written before the challenge is requested, so a failed issue leaves
    /// an orphan for the sweeper rather than a lost user request.
    pub async fn initiate_iban_update(
        &self,
        user_id: &str,
        email: Option<&str>,
        new_iban: &str,
    ) -> Result<ChallengeIssued> {
        let new_iban = new_iban.trim();
        if new_iban.is_empty() {
            return Err(AppError::invalid_data("IBAN is required."));
        }

        let transaction_id = Uuid::new_v4().to_string();

        let pending = PendingUpdate {
            id: None,
            transaction_id: transaction_id.clone(),
            user_id: user_id.to_string(),
            new_iban: new_iban.to_string(),
            created_at: mongodb::bson::DateTime::from_chrono(Utc::now()),
        };
        self.pending().insert_one(&pending).await?;

        self.challenge
            .issue(user_id, email, &transaction_id, IBAN_UPDATE_PURPOSE)
            .await
    }

    /// Apply a staged change after verifying the submitted code. Validator
    /// failures propagate unchanged and leave the record intact so the user
    /// can retry until expiry.
    pub async fn finalize_iban_update(
        &self,
        user_id: &str,
        transaction_id: &str,
        code: &str,
    ) -> Result<String> {
        let filter = doc! { "transactionId": transaction_id, "userId": user_id };

        if self.pending().find_one(filter.clone()).await?.is_none() {
            return Err(AppError::not_found("No pending update for this transaction."));
        }

        self.challenge.verify(user_id, transaction_id, code).await?;

        // Claim the record atomically before applying. If the sweeper got
        // here first the change is gone and must not be applied.
        let pending = self
            .pending()
            .find_one_and_delete(filter)
            .await?
            .ok_or_else(|| AppError::not_found("No pending update for this transaction."))?;

        let result = self
            .users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "iban": &pending.new_iban } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::not_found("User not found for IBAN update."));
        }

        let event = DomainEvent::iban_updated(user_id, transaction_id, &pending.new_iban);
        if let Err(e) = self.events.publish(TOPIC_AUDIT_LOGS, &event).await {
            tracing::warn!("failed to publish IBAN_UPDATED event: {}", e);
        }

        Ok(pending.new_iban)
    }

    /// Re-issue the challenge for an existing staged change. The overwrite
    /// in the OTP store invalidates the previous code and resets the window.
    pub async fn resend_otp(
        &self,
        user_id: &str,
        email: Option<&str>,
        transaction_id: &str,
    ) -> Result<ChallengeIssued> {
        let filter = doc! { "transactionId": transaction_id, "userId": user_id };
        if self.pending().find_one(filter).await?.is_none() {
            return Err(AppError::not_found("No pending update for this transaction."));
        }

        self.challenge
            .issue(user_id, email, transaction_id, IBAN_UPDATE_PURPOSE)
            .await
    }
}
