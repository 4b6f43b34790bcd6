// ============================
// crates/backend-lib/tests/common/mod.rs
// ============================
//! Shared helpers for relay integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sketch_common::ServerEvent;
use sketch_relay_lib::{access::ProjectAccess, config::Settings, ws_router::create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a relay on an ephemeral port
pub async fn setup_server() -> (SocketAddr, Arc<AppState>) {
    serve(Arc::new(AppState::new(Settings::default()))).await
}

/// Start a relay with a custom access check
pub async fn setup_server_with_access(access: Arc<dyn ProjectAccess>) -> (SocketAddr, Arc<AppState>) {
    serve(Arc::new(AppState::with_access(Settings::default(), access))).await
}

/// Start a relay with custom settings
pub async fn setup_server_with_settings(settings: Settings) -> (SocketAddr, Arc<AppState>) {
    serve(Arc::new(AppState::new(settings))).await
}

async fn serve(state: Arc<AppState>) -> (SocketAddr, Arc<AppState>) {
    let app = create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn connect(addr: SocketAddr) -> Client {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    stream
}

pub async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next server event, failing the test after `timeout_secs`
#[allow(clippy::match_wild_err_arm)]
pub async fn next_event(client: &mut Client, timeout_secs: u64, operation_name: &str) -> ServerEvent {
    loop {
        let message = match tokio::time::timeout(Duration::from_secs(timeout_secs), client.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => panic!("{operation_name} failed with error: {e:?}"),
            Ok(None) => panic!("{operation_name} returned None (connection closed?)"),
            Err(e) => panic!("{operation_name} timed out after {timeout_secs} seconds: {e:?}"),
        };
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert nothing arrives within `millis`
pub async fn assert_silent(client: &mut Client, millis: u64) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        tokio::time::timeout(Duration::from_millis(millis), client.next()).await
    {
        panic!("expected no event, got {text}");
    }
}
