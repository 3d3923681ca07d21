use axum::{routing::post, Router};

use crate::handlers::profile;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Stage an IBAN change and send the step-up challenge
        .route("/initiate-update", post(profile::initiate_update))
        // Apply a staged change after verifying the code
        .route("/finalize-update", post(profile::finalize_update))
        // Re-issue the challenge for an existing staged change
        .route("/resend-otp", post(profile::resend_otp))
}
