use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::audit;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Filtered, paginated audit trail for the caller
        .route("/", get(audit::get_audit_logs))
        // Client-reported domain events (downloads, exports)
        .route("/log", post(audit::log_client_event))
        // Polling fallback for missed fraud broadcasts
        .route("/recent-fraud", get(audit::recent_fraud))
}
