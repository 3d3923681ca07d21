use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::errors::AppError;
use crate::middleware::auth::decode_claims;
use crate::services::fraud_service::FraudAlertService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

// GET /ws/fraud?token=<jwt>
//
// Browsers cannot attach an Authorization header to the upgrade request,
// so the bearer token travels as a query parameter here.
pub async fn fraud_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> Response {
    let claims = query
        .token
        .as_deref()
        .and_then(|token| decode_claims(token, &state.config.jwt_secret).ok());

    let Some(claims) = claims else {
        return AppError::Unauthorized.into_response();
    };

    let fraud = state.fraud_service.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, fraud, claims.sub))
}

async fn handle_socket(socket: WebSocket, fraud: Arc<FraudAlertService>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = fraud.register(tx);
    tracing::info!("fraud session opened for {} (id: {})", user_id, connection_id);

    // Forward broadcast messages from the registry channel to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Nothing but a close handshake is expected from the client.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("fraud session {} read error: {}", connection_id, e);
                break;
            }
        }
    }

    fraud.deregister(&connection_id);
    send_task.abort();
    tracing::info!("fraud session closed for {} (id: {})", user_id, connection_id);
}
