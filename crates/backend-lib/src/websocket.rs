// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! Per-connection WebSocket handler.
//!
//! One `WebSocketHandler` exists per accepted socket. It owns the connection's
//! server-assigned identity, turns inbound text frames into validated
//! [`ClientEvent`]s, runs the access check in front of joins and forwards
//! everything to the relay coordinator.

use crate::error::RelayError;
use crate::metrics::{EVENT_DROPPED, WS_MALFORMED};
use crate::registry::Outbound;
use crate::relay::Dispatched;
use crate::validation;
use crate::AppState;
use metrics::counter;
use sketch_common::{ClientEvent, ConnectionId};
use std::sync::Arc;
use tracing::{error, info, warn};

/// WebSocket handler for one connection
pub struct WebSocketHandler {
    state: Arc<AppState>,
    connection: ConnectionId,
}

impl WebSocketHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            connection: ConnectionId::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Capacity for this connection's outbound queue
    pub fn outbound_buffer(&self) -> usize {
        self.state.settings.relay.outbound_buffer
    }

    /// Register this connection and the queue its writer drains
    pub async fn register(&self, outbound: Outbound) -> Result<(), RelayError> {
        self.state.relay.connect(self.connection, outbound).await
    }

    /// Handle one inbound text frame
    pub async fn handle_text(&self, text: &str) -> Result<Dispatched, RelayError> {
        let event = serde_json::from_str::<ClientEvent>(text).map_err(|e| {
            counter!(WS_MALFORMED).increment(1);
            RelayError::from(e)
        })?;
        self.handle_event(event).await
    }

    /// Validate an event and hand it to the relay
    pub async fn handle_event(&self, event: ClientEvent) -> Result<Dispatched, RelayError> {
        validation::validate_client_event(&event)?;

        if let ClientEvent::Join { project_id } = &event {
            self.state
                .access
                .authorize_join(self.connection, project_id)
                .await?;
        }

        self.state.relay.dispatch(self.connection, event).await
    }

    /// Log and count an event the relay refused
    pub fn report_rejected(&self, err: &RelayError) {
        if err.is_protocol_violation() {
            counter!(EVENT_DROPPED, "reason" => err.reason()).increment(1);
            warn!(
                connection = %self.connection,
                code = err.error_code(),
                error = %err,
                "dropped inbound event"
            );
        } else {
            error!(connection = %self.connection, error = %err, "relay failure");
        }
    }

    /// Remove this connection from the relay after the transport closed
    pub async fn close(&self) {
        match self.state.relay.disconnect(self.connection).await {
            Ok(sessions) => info!(connection = %self.connection, sessions, "connection closed"),
            Err(e) => error!(connection = %self.connection, error = %e, "failed to reap connection"),
        }
    }
}
