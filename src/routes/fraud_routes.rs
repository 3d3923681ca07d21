use axum::{routing::get, Router};

use crate::handlers::fraud_ws;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Real-time fraud alert channel, one per authenticated session
        .route("/fraud", get(fraud_ws::fraud_ws))
}
