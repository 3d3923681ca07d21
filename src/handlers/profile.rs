use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::user::Claims;
use crate::state::AppState;

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUpdateRequest {
    #[validate(length(min = 1, message = "IBAN is required."))]
    pub new_iban: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUpdateRequest {
    #[validate(length(min = 1, message = "TransactionId is required."))]
    pub transaction_id: String,
    #[validate(length(min = 1, message = "OTP code is required."))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResendOtpRequest {
    #[validate(length(min = 1, message = "TransactionId is required."))]
    pub transaction_id: String,
}

// POST /api/profile/initiate-update
pub async fn initiate_update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InitiateUpdateRequest>,
) -> Result<Json<Value>> {
    req.validate()
        .map_err(|e| AppError::invalid_data(format!("Validation error: {}", e)))?;

    let issued = state
        .profile_service
        .initiate_iban_update(&claims.sub, claims.email.as_deref(), &req.new_iban)
        .await?;

    Ok(Json(json!({ "transactionId": issued.transaction_id })))
}

// POST /api/profile/finalize-update
pub async fn finalize_update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FinalizeUpdateRequest>,
) -> Result<Json<Value>> {
    req.validate()
        .map_err(|e| AppError::invalid_data(format!("Validation error: {}", e)))?;

    state
        .profile_service
        .finalize_iban_update(&claims.sub, &req.transaction_id, &req.code)
        .await?;

    Ok(Json(json!({ "message": "IBAN updated successfully." })))
}

// POST /api/profile/resend-otp
pub async fn resend_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<Json<Value>> {
    req.validate()
        .map_err(|e| AppError::invalid_data(format!("Validation error: {}", e)))?;

    state
        .profile_service
        .resend_otp(&claims.sub, claims.email.as_deref(), &req.transaction_id)
        .await?;

    Ok(Json(json!({ "message": "OTP resent." })))
}
