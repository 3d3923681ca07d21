use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use mongodb::bson::doc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use config::AppConfig;
use database::connection::get_db_client;
use services::audit_consumer::AuditConsumer;
use services::challenge::StepUpChallenge;
use services::event_bus::{EventSink, RedisEventBus};
use services::fraud_consumer::FraudConsumer;
use services::fraud_service::FraudAlertService;
use services::otp_service::OtpService;
use services::profile_service::ProfileService;
use services::sweeper::TransactionSweeper;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Arc::new(AppConfig::from_env());
    let db = get_db_client(&config.database_url, &config.database_name).await;

    let events: Arc<dyn EventSink> = match RedisEventBus::connect(&config.redis_url).await {
        Ok(bus) => {
            tracing::info!("✅ Event bus connected at {}", config.redis_url);
            Arc::new(bus)
        }
        Err(e) => {
            tracing::error!("❌ Failed to connect event bus: {}", e);
            panic!("Failed to connect event bus: {}", e);
        }
    };

    let otp_service = Arc::new(OtpService::new(
        events.clone(),
        config.otp_expiry_seconds,
        config.otp_code_length,
    ));
    let profile_service = Arc::new(ProfileService::new(
        db.clone(),
        otp_service.clone() as Arc<dyn StepUpChallenge>,
        events.clone(),
    ));
    let fraud_service = Arc::new(FraudAlertService::new());

    let app_state = AppState {
        db: db.clone(),
        config: config.clone(),
        otp_service,
        profile_service,
        fraud_service: fraud_service.clone(),
        events: events.clone(),
    };

    // Background tasks: sweeper plus the two stream consumers. They talk to
    // the request path only through the shared stores and the event stream.
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("REDIS_URL must be a valid URL");
    let shutdown = CancellationToken::new();

    let sweeper = TransactionSweeper::new(
        db.clone(),
        events.clone(),
        config.sweep_interval_seconds,
        config.pending_expiration_minutes,
    );
    let audit_consumer = AuditConsumer::new(redis_client.clone(), db.clone());
    let fraud_consumer = FraudConsumer::new(redis_client, fraud_service.clone());

    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));
    let audit_task = tokio::spawn(audit_consumer.run(shutdown.clone()));
    let fraud_task = tokio::spawn(fraud_consumer.run(shutdown.clone()));

    let app = build_router(app_state);
    start_server(app, &config.host, config.port).await;

    // Server is down; stop the background tasks and wait for them to drain.
    shutdown.cancel();
    let _ = tokio::join!(sweeper_task, audit_task, fraud_task);
    tracing::info!("shutdown complete");
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let protected = Router::new()
        .nest("/api/otp", routes::otp_routes::routes())
        .nest("/api/profile", routes::profile_routes::routes())
        .nest("/api/audit", routes::audit_routes::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .merge(protected)
        .nest("/ws", routes::fraud_routes::routes())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, host: &str, port: u16) {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("HOST/PORT must form a valid socket address");

    tracing::info!("🚀 Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

async fn root_handler() -> &'static str {
    "🔐 Step-Up Verification API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "otp": true,
        "fraudSessions": state.fraud_service.session_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
