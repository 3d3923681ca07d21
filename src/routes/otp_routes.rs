use axum::{routing::post, Router};

use crate::handlers::otp;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Generate a challenge for an authenticated user and transaction
        .route("/request", post(otp::request_otp))
        // Verify the submitted code
        .route("/verify", post(otp::verify_otp))
}
