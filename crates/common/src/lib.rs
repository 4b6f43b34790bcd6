// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between sketch clients and the collaboration relay.
//! This module defines the WebSocket protocol events and supporting types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier of a project; doubles as the collaboration session identifier.
pub type ProjectId = String;

/// Server-assigned identity of one live connection.
///
/// Minted at transport accept and never reused, so it is also the identity
/// stamped onto every relayed event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh connection identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The fixed set of event kinds the relay knows about
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Join,
    Leave,
    Draw,
    LayerUpdate,
    ToolChange,
    ClearCanvas,
    ApplyEffect,
    CursorMove,
    UserJoined,
    UserLeft,
    MemberCount,
}

impl EventKind {
    /// Wire name of the kind, also used as a metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Draw => "draw",
            EventKind::LayerUpdate => "layer-update",
            EventKind::ToolChange => "tool-change",
            EventKind::ClearCanvas => "clear-canvas",
            EventKind::ApplyEffect => "apply-effect",
            EventKind::CursorMove => "cursor-move",
            EventKind::UserJoined => "user-joined",
            EventKind::UserLeft => "user-left",
            EventKind::MemberCount => "member-count",
        }
    }

    /// Whether events of this kind travel peer to peer through the router
    pub fn is_relayed(&self) -> bool {
        matches!(
            self,
            EventKind::Draw
                | EventKind::LayerUpdate
                | EventKind::ToolChange
                | EventKind::ClearCanvas
                | EventKind::ApplyEffect
                | EventKind::CursorMove
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events sent from client to relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Start collaborating on a project
    Join { project_id: ProjectId },
    /// Stop collaborating on a project without closing the connection
    Leave { project_id: ProjectId },
    /// A stroke segment
    Draw {
        project_id: ProjectId,
        #[serde(default)]
        payload: Value,
    },
    /// Layer visibility, opacity or content change
    LayerUpdate {
        project_id: ProjectId,
        #[serde(default)]
        payload: Value,
    },
    /// The sender switched tools
    ToolChange {
        project_id: ProjectId,
        #[serde(default)]
        payload: Value,
    },
    ClearCanvas {
        project_id: ProjectId,
        #[serde(default)]
        payload: Value,
    },
    /// A generated style/effect was applied to the canvas
    ApplyEffect {
        project_id: ProjectId,
        #[serde(default)]
        payload: Value,
    },
    /// Pointer position in canvas coordinates
    CursorMove { project_id: ProjectId, x: f64, y: f64 },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Join { .. } => EventKind::Join,
            ClientEvent::Leave { .. } => EventKind::Leave,
            ClientEvent::Draw { .. } => EventKind::Draw,
            ClientEvent::LayerUpdate { .. } => EventKind::LayerUpdate,
            ClientEvent::ToolChange { .. } => EventKind::ToolChange,
            ClientEvent::ClearCanvas { .. } => EventKind::ClearCanvas,
            ClientEvent::ApplyEffect { .. } => EventKind::ApplyEffect,
            ClientEvent::CursorMove { .. } => EventKind::CursorMove,
        }
    }

    /// Session this event is scoped to
    pub fn project_id(&self) -> &str {
        match self {
            ClientEvent::Join { project_id }
            | ClientEvent::Leave { project_id }
            | ClientEvent::Draw { project_id, .. }
            | ClientEvent::LayerUpdate { project_id, .. }
            | ClientEvent::ToolChange { project_id, .. }
            | ClientEvent::ClearCanvas { project_id, .. }
            | ClientEvent::ApplyEffect { project_id, .. }
            | ClientEvent::CursorMove { project_id, .. } => project_id,
        }
    }
}

/// Events sent from relay to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Another user joined the session
    UserJoined {
        project_id: ProjectId,
        user_id: ConnectionId,
        member_count: usize,
    },
    /// Another user left the session or disconnected
    UserLeft {
        project_id: ProjectId,
        user_id: ConnectionId,
        member_count: usize,
    },
    /// Live size of the session, sent once to a joiner
    MemberCount {
        project_id: ProjectId,
        member_count: usize,
    },
    Draw {
        project_id: ProjectId,
        user_id: ConnectionId,
        payload: Value,
    },
    LayerUpdate {
        project_id: ProjectId,
        user_id: ConnectionId,
        payload: Value,
    },
    ToolChange {
        project_id: ProjectId,
        user_id: ConnectionId,
        payload: Value,
    },
    ClearCanvas {
        project_id: ProjectId,
        user_id: ConnectionId,
        payload: Value,
    },
    ApplyEffect {
        project_id: ProjectId,
        user_id: ConnectionId,
        payload: Value,
    },
    CursorMove {
        project_id: ProjectId,
        user_id: ConnectionId,
        x: f64,
        y: f64,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::UserJoined { .. } => EventKind::UserJoined,
            ServerEvent::UserLeft { .. } => EventKind::UserLeft,
            ServerEvent::MemberCount { .. } => EventKind::MemberCount,
            ServerEvent::Draw { .. } => EventKind::Draw,
            ServerEvent::LayerUpdate { .. } => EventKind::LayerUpdate,
            ServerEvent::ToolChange { .. } => EventKind::ToolChange,
            ServerEvent::ClearCanvas { .. } => EventKind::ClearCanvas,
            ServerEvent::ApplyEffect { .. } => EventKind::ApplyEffect,
            ServerEvent::CursorMove { .. } => EventKind::CursorMove,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            ServerEvent::UserJoined { project_id, .. }
            | ServerEvent::UserLeft { project_id, .. }
            | ServerEvent::MemberCount { project_id, .. }
            | ServerEvent::Draw { project_id, .. }
            | ServerEvent::LayerUpdate { project_id, .. }
            | ServerEvent::ToolChange { project_id, .. }
            | ServerEvent::ClearCanvas { project_id, .. }
            | ServerEvent::ApplyEffect { project_id, .. }
            | ServerEvent::CursorMove { project_id, .. } => project_id,
        }
    }

    /// Member count carried by presence events
    pub fn member_count(&self) -> Option<usize> {
        match self {
            ServerEvent::UserJoined { member_count, .. }
            | ServerEvent::UserLeft { member_count, .. }
            | ServerEvent::MemberCount { member_count, .. } => Some(*member_count),
            _ => None,
        }
    }
}
