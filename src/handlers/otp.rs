use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{AppError, Result};
use crate::models::user::Claims;
use crate::services::challenge::ChallengeIssued;
use crate::state::AppState;

// Request DTOs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub transaction_id: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    pub transaction_id: Option<String>,
    pub code: Option<String>,
}

// POST /api/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OtpRequest>,
) -> Result<Json<ChallengeIssued>> {
    let transaction_id = req
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::invalid_data("TransactionId is required."))?;

    let issued = state
        .otp_service
        .issue(
            &claims.sub,
            claims.email.as_deref(),
            transaction_id,
            req.purpose.as_deref(),
        )
        .await?;

    Ok(Json(issued))
}

// POST /api/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OtpVerifyRequest>,
) -> Result<Json<Value>> {
    let transaction_id = req
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::invalid_data("TransactionId and Code are required."))?;
    let code = req
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::invalid_data("TransactionId and Code are required."))?;

    state
        .otp_service
        .validate(&claims.sub, transaction_id, code)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "OTP verified successfully.",
    })))
}
