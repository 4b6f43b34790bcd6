// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use crate::error::RelayError;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_DISCONNECTION};
use crate::relay::RelayStats;
use crate::validation;
use crate::websocket::WebSocketHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::{json, Value};
use sketch_common::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.settings.client_origin.as_deref());

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/sessions/{project_id}", get(session_handler))
        .route("/api/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    match client_origin {
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(origin) => layer.allow_origin(origin),
            Err(e) => {
                warn!(origin, error = %e, "ignoring invalid client origin");
                layer
            },
        },
        None => layer.allow_origin(Any),
    }
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message_bytes = state.settings.relay.max_message_bytes;
    let handler = WebSocketHandler::new(state);
    let span = info_span!("ws", connection = %handler.connection_id());

    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_connection(socket, handler).instrument(span))
}

async fn handle_connection(socket: WebSocket, handler: WebSocketHandler) {
    let (mut tx, mut rx) = socket.split();
    let outbound_buffer = handler.outbound_buffer();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Arc<ServerEvent>>(outbound_buffer);

    if let Err(e) = handler.register(outbound_tx).await {
        error!(error = %e, "failed to register connection");
        let _ = tx.send(Message::Close(None)).await;
        return;
    }

    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);
    info!("connection opened");

    // Writer: drains this connection's outbound queue onto the socket
    let mut send_task = tokio::spawn(
        async move {
            while let Some(event) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&*event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(
                            kind = %event.kind(),
                            project = %event.project_id(),
                            error = %e,
                            "failed to serialize event"
                        );
                        continue;
                    },
                };
                if tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    // Reader: one inbound frame at a time, in arrival order
    loop {
        tokio::select! {
            frame = rx.next() => match frame {
                Some(Ok(Message::Text(text))) => match handler.handle_text(text.as_str()).await {
                    Ok(dispatched) => trace!(?dispatched, "handled event"),
                    Err(RelayError::CoordinatorClosed) => {
                        error!("relay coordinator stopped, closing connection");
                        break;
                    },
                    Err(e) => handler.report_rejected(&e),
                },
                Some(Ok(Message::Binary(_))) => {
                    warn!("binary frames are not supported, ignoring");
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                // Also raised for frames over `max_message_bytes`; the
                // connection is dropped and reaped like any other transport loss
                Some(Err(e)) => {
                    debug!(error = %e, "transport error, closing connection");
                    break;
                },
            },
            _ = &mut send_task => {
                debug!("writer finished, peer unreachable");
                break;
            },
        }
    }

    handler.close().await;
    send_task.abort();

    counter!(WS_DISCONNECTION).increment(1);
    gauge!(WS_ACTIVE).decrement(1.0);
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Live member count of one project session
async fn session_handler(
    Path(project_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, RelayError> {
    validation::validate_project_id(&project_id)?;
    let member_count = state.relay.member_count(&project_id).await?;
    Ok(Json(json!({
        "projectId": project_id,
        "memberCount": member_count,
    })))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<RelayStats>, RelayError> {
    Ok(Json(state.relay.stats().await?))
}
