// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Connection registry: live connections, their delivery queues and the
//! sessions each one currently belongs to.
use crate::error::RelayError;
use sketch_common::{ConnectionId, ProjectId, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Delivery queue drained by a connection's writer task
pub type Outbound = mpsc::Sender<Arc<ServerEvent>>;

struct ConnectionEntry {
    outbound: Outbound,
    sessions: HashSet<ProjectId>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection with no session memberships.
    /// Registering the same identity twice means the connection lifecycle is broken.
    pub fn register(&mut self, connection: ConnectionId, outbound: Outbound) -> Result<(), RelayError> {
        if self.connections.contains_key(&connection) {
            return Err(RelayError::AlreadyRegistered(connection));
        }

        self.connections.insert(
            connection,
            ConnectionEntry {
                outbound,
                sessions: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Forget a connection, returning every session it still belonged to.
    /// An unknown connection yields an empty set: it is already gone.
    pub fn unregister(&mut self, connection: ConnectionId) -> HashSet<ProjectId> {
        match self.connections.remove(&connection) {
            Some(entry) => entry.sessions,
            None => {
                debug!(%connection, "unregister for connection already gone");
                HashSet::new()
            },
        }
    }

    pub fn record_join(&mut self, connection: ConnectionId, project_id: &str) -> Result<(), RelayError> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or(RelayError::UnknownConnection(connection))?;
        entry.sessions.insert(project_id.to_string());
        Ok(())
    }

    /// Returns whether the membership was recorded
    pub fn record_leave(&mut self, connection: ConnectionId, project_id: &str) -> bool {
        self.connections
            .get_mut(&connection)
            .is_some_and(|entry| entry.sessions.remove(project_id))
    }

    pub fn is_registered(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn is_member(&self, connection: ConnectionId, project_id: &str) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|entry| entry.sessions.contains(project_id))
    }

    pub fn outbound(&self, connection: ConnectionId) -> Option<&Outbound> {
        self.connections.get(&connection).map(|entry| &entry.outbound)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
