// ============================
// sketch-relay-lib/src/lib.rs
// ============================
//! Real-time collaboration relay for shared sketch canvases.
//!
//! Clients connect over WebSocket, join a project session and exchange
//! drawing, layer, tool and cursor events with the other members. The relay
//! keeps live presence counts and cleans up after abrupt disconnects; it never
//! interprets or stores canvas content.

pub mod access;
pub mod config;
pub mod error;
pub mod metrics;
pub mod presence;
pub mod reaper;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session_table;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use crate::access::{OpenAccess, ProjectAccess};
use crate::config::Settings;
use crate::relay::{spawn_relay, RelayHandle};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the relay coordinator
    pub relay: RelayHandle,
    /// External project access check run before each join
    pub access: Arc<dyn ProjectAccess>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create the application state, spawning the relay coordinator.
    /// Must be called from within a Tokio runtime.
    pub fn new(settings: Settings) -> Self {
        Self::with_access(settings, Arc::new(OpenAccess))
    }

    /// Create the application state with a custom access check
    pub fn with_access(settings: Settings, access: Arc<dyn ProjectAccess>) -> Self {
        let relay = spawn_relay(settings.relay.command_buffer);
        Self {
            relay,
            access,
            settings: Arc::new(settings),
        }
    }
}
