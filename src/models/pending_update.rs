use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Staged IBAN change awaiting step-up verification. Created on initiate,
/// deleted on finalize success or by the sweeper; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub transaction_id: String,
    pub user_id: String,
    pub new_iban: String,
    pub created_at: DateTime,
}
